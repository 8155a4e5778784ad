//! Injectable counters for ranking-model cache outcomes.
//!
//! Process-scoped state handed to the cache layer at construction, with
//! explicit snapshot/reset hooks so tests can observe and clear it.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    miss_absent: AtomicU64,
    miss_version: AtomicU64,
    miss_expired: AtomicU64,
    miss_undertrained: AtomicU64,
    miss_invalid: AtomicU64,
    store_errors: AtomicU64,
    write_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub miss_absent: u64,
    pub miss_version: u64,
    pub miss_expired: u64,
    pub miss_undertrained: u64,
    pub miss_invalid: u64,
    pub store_errors: u64,
    pub write_failures: u64,
}

impl CacheMetricsSnapshot {
    pub fn total_misses(&self) -> u64 {
        self.miss_absent
            + self.miss_version
            + self.miss_expired
            + self.miss_undertrained
            + self.miss_invalid
            + self.store_errors
    }
}

impl CacheMetrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss_absent(&self) {
        self.miss_absent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss_version(&self) {
        self.miss_version.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss_expired(&self) {
        self.miss_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss_undertrained(&self) {
        self.miss_undertrained.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss_invalid(&self) {
        self.miss_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            miss_absent: self.miss_absent.load(Ordering::Relaxed),
            miss_version: self.miss_version.load(Ordering::Relaxed),
            miss_expired: self.miss_expired.load(Ordering::Relaxed),
            miss_undertrained: self.miss_undertrained.load(Ordering::Relaxed),
            miss_invalid: self.miss_invalid.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.miss_absent.store(0, Ordering::Relaxed);
        self.miss_version.store(0, Ordering::Relaxed);
        self.miss_expired.store(0, Ordering::Relaxed);
        self.miss_undertrained.store(0, Ordering::Relaxed);
        self.miss_invalid.store(0, Ordering::Relaxed);
        self.store_errors.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
    }
}
