//! Per-user ranking model cache.
//!
//! One JSON document per user, written whole on every update:
//!   feed:ranking-model:{user_id} → serialized network + training metadata
//!
//! `get` collapses every failure class to a miss so callers never branch
//! on cache health; the distinct outcomes stay observable through the
//! injected [`CacheMetrics`]. `set` is best-effort: a failed write is
//! logged and swallowed, never failing the ranking request that produced
//! the model. There is no cross-user coordination; concurrent get/train/
//! set cycles for one user may race and the last writer wins.

use crate::error::Result;
use crate::metrics::CacheMetrics;
use crate::services::trainer::{validate_shape, FeedForwardNetwork, SerializedModel, TrainedModel};
use crate::stores::ModelStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Bumped whenever the serialized model layout or the feature contract
/// changes; entries written under any other version are misses.
pub const MODEL_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone)]
pub struct ModelCacheConfig {
    /// Entry lifetime in seconds, enforced both by store expiry and by
    /// the stored timestamp.
    pub ttl_secs: u64,
    /// Entries trained on fewer examples than this are not trustworthy.
    pub min_training_examples: u32,
    /// Upper bound on the serialized document size.
    pub max_serialized_bytes: usize,
}

impl Default for ModelCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 3600,
            min_training_examples: 100,
            max_serialized_bytes: 1024 * 1024,
        }
    }
}

/// The cached document: format version, opaque serialized model, and the
/// training metadata the validity rules run against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRankingModel {
    pub version: u32,
    pub model: SerializedModel,
    pub updated_at: i64,
    pub training_examples: u32,
    pub last_error: f64,
    pub last_iterations: u32,
}

pub struct RankingModelCache {
    store: Arc<dyn ModelStore>,
    metrics: Arc<CacheMetrics>,
    config: ModelCacheConfig,
}

impl RankingModelCache {
    pub fn new(
        store: Arc<dyn ModelStore>,
        metrics: Arc<CacheMetrics>,
        config: ModelCacheConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            config,
        }
    }

    fn key(user_id: Uuid) -> String {
        format!("feed:ranking-model:{}", user_id)
    }

    /// Fetch the user's model. Any lookup error, version mismatch, TTL
    /// expiry, undertrained entry or structural failure is a miss.
    pub async fn get(&self, user_id: Uuid) -> Option<FeedForwardNetwork> {
        let key = Self::key(user_id);

        let raw = match self.store.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("model cache read failed for {}: {}", key, e);
                self.metrics.record_store_error();
                return None;
            }
        };

        let Some(json) = raw else {
            debug!("model cache miss (absent) for {}", key);
            self.metrics.record_miss_absent();
            return None;
        };

        if json.len() > self.config.max_serialized_bytes {
            warn!(
                "model cache entry for {} exceeds {} bytes, rejecting",
                key, self.config.max_serialized_bytes
            );
            self.metrics.record_miss_invalid();
            return None;
        }

        let entry: CachedRankingModel = match serde_json::from_str(&json) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("model cache entry for {} undecodable: {}", key, e);
                self.metrics.record_miss_invalid();
                return None;
            }
        };

        if entry.version != MODEL_FORMAT_VERSION {
            debug!(
                "model cache miss (version {} != {}) for {}",
                entry.version, MODEL_FORMAT_VERSION, key
            );
            self.metrics.record_miss_version();
            return None;
        }

        let age_secs = Utc::now().timestamp() - entry.updated_at;
        if age_secs < 0 || age_secs as u64 > self.config.ttl_secs {
            debug!("model cache miss (expired, age {}s) for {}", age_secs, key);
            self.metrics.record_miss_expired();
            return None;
        }

        if entry.training_examples < self.config.min_training_examples {
            debug!(
                "model cache miss (trained on {} < {} examples) for {}",
                entry.training_examples, self.config.min_training_examples, key
            );
            self.metrics.record_miss_undertrained();
            return None;
        }

        if !validate_shape(&entry.model) {
            warn!("model cache entry for {} failed shape validation", key);
            self.metrics.record_miss_invalid();
            return None;
        }

        match FeedForwardNetwork::from_serialized(&entry.model) {
            Ok(network) => {
                debug!("model cache hit for {}", key);
                self.metrics.record_hit();
                Some(network)
            }
            Err(e) => {
                warn!("model cache entry for {} unusable: {}", key, e);
                self.metrics.record_miss_invalid();
                None
            }
        }
    }

    /// Persist a freshly trained model. Best-effort: validation or store
    /// failures are logged and swallowed so a failed write never fails
    /// the ranking request.
    pub async fn set(&self, user_id: Uuid, trained: &TrainedModel) {
        let key = Self::key(user_id);
        let model = trained.network.to_serialized();

        if !validate_shape(&model) {
            warn!("refusing to cache malformed model for {}", key);
            self.metrics.record_write_failure();
            return;
        }

        let entry = CachedRankingModel {
            version: MODEL_FORMAT_VERSION,
            model,
            updated_at: Utc::now().timestamp(),
            training_examples: trained.example_count as u32,
            last_error: trained.report.error,
            last_iterations: trained.report.iterations,
        };

        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!("model serialization failed for {}: {}", key, e);
                self.metrics.record_write_failure();
                return;
            }
        };

        if json.len() > self.config.max_serialized_bytes {
            warn!(
                "serialized model for {} is {} bytes (cap {}), not caching",
                key,
                json.len(),
                self.config.max_serialized_bytes
            );
            self.metrics.record_write_failure();
            return;
        }

        if let Err(e) = self.store.set_ex(&key, &json, self.config.ttl_secs).await {
            warn!("model cache write failed for {}: {}", key, e);
            self.metrics.record_write_failure();
            return;
        }

        debug!(
            "cached model for {} ({} examples, error {:.4})",
            key, trained.example_count, trained.report.error
        );
    }

    /// Drop the user's cached model. Idempotent; store faults are logged
    /// and swallowed like every other cache fault.
    pub async fn clear(&self, user_id: Uuid) {
        let key = Self::key(user_id);
        if let Err(e) = self.store.del(&key).await {
            warn!("model cache delete failed for {}: {}", key, e);
            self.metrics.record_store_error();
        }
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::trainer::TrainingReport;
    use crate::stores::MockModelStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trained(example_count: usize) -> TrainedModel {
        let mut rng = StdRng::seed_from_u64(1);
        TrainedModel {
            network: FeedForwardNetwork::new(&mut rng),
            report: TrainingReport {
                error: 0.004,
                iterations: 120,
            },
            example_count,
        }
    }

    fn entry_json(version: u32, updated_at: i64, training_examples: u32) -> String {
        let mut rng = StdRng::seed_from_u64(2);
        let entry = CachedRankingModel {
            version,
            model: FeedForwardNetwork::new(&mut rng).to_serialized(),
            updated_at,
            training_examples,
            last_error: 0.004,
            last_iterations: 100,
        };
        serde_json::to_string(&entry).unwrap()
    }

    fn cache_with(store: MockModelStore) -> RankingModelCache {
        RankingModelCache::new(
            Arc::new(store),
            Arc::new(CacheMetrics::default()),
            ModelCacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_get_miss_on_absent_entry() {
        let mut store = MockModelStore::new();
        store.expect_get().returning(|_| Ok(None));

        let cache = cache_with(store);
        assert!(cache.get(Uuid::new_v4()).await.is_none());
        assert_eq!(cache.metrics().snapshot().miss_absent, 1);
    }

    #[tokio::test]
    async fn test_get_miss_on_store_error() {
        let mut store = MockModelStore::new();
        store
            .expect_get()
            .returning(|_| Err(AppError::Cache("timeout".to_string())));

        let cache = cache_with(store);
        assert!(cache.get(Uuid::new_v4()).await.is_none());
        assert_eq!(cache.metrics().snapshot().store_errors, 1);
    }

    #[tokio::test]
    async fn test_get_miss_on_version_mismatch() {
        let now = Utc::now().timestamp();
        let stale = entry_json(MODEL_FORMAT_VERSION - 1, now, 500);
        let mut store = MockModelStore::new();
        store.expect_get().returning(move |_| Ok(Some(stale.clone())));

        let cache = cache_with(store);
        assert!(cache.get(Uuid::new_v4()).await.is_none());
        assert_eq!(cache.metrics().snapshot().miss_version, 1);
    }

    #[tokio::test]
    async fn test_get_miss_on_expired_entry() {
        let yesterday = Utc::now().timestamp() - 25 * 3600;
        let expired = entry_json(MODEL_FORMAT_VERSION, yesterday, 500);
        let mut store = MockModelStore::new();
        store
            .expect_get()
            .returning(move |_| Ok(Some(expired.clone())));

        let cache = cache_with(store);
        assert!(cache.get(Uuid::new_v4()).await.is_none());
        assert_eq!(cache.metrics().snapshot().miss_expired, 1);
    }

    #[tokio::test]
    async fn test_training_example_validity_boundary() {
        let now = Utc::now().timestamp();

        let under = entry_json(MODEL_FORMAT_VERSION, now, 99);
        let mut store = MockModelStore::new();
        store.expect_get().returning(move |_| Ok(Some(under.clone())));
        let cache = cache_with(store);
        assert!(cache.get(Uuid::new_v4()).await.is_none());
        assert_eq!(cache.metrics().snapshot().miss_undertrained, 1);

        let exact = entry_json(MODEL_FORMAT_VERSION, now, 100);
        let mut store = MockModelStore::new();
        store.expect_get().returning(move |_| Ok(Some(exact.clone())));
        let cache = cache_with(store);
        assert!(cache.get(Uuid::new_v4()).await.is_some());
        assert_eq!(cache.metrics().snapshot().hits, 1);
    }

    #[tokio::test]
    async fn test_get_miss_on_undecodable_entry() {
        let mut store = MockModelStore::new();
        store
            .expect_get()
            .returning(|_| Ok(Some("not json".to_string())));

        let cache = cache_with(store);
        assert!(cache.get(Uuid::new_v4()).await.is_none());
        assert_eq!(cache.metrics().snapshot().miss_invalid, 1);
    }

    #[tokio::test]
    async fn test_get_miss_on_malformed_shape() {
        let now = Utc::now().timestamp();
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = FeedForwardNetwork::new(&mut rng).to_serialized();
        model.layers[0].weights[0].pop();
        let entry = CachedRankingModel {
            version: MODEL_FORMAT_VERSION,
            model,
            updated_at: now,
            training_examples: 500,
            last_error: 0.004,
            last_iterations: 100,
        };
        let json = serde_json::to_string(&entry).unwrap();

        let mut store = MockModelStore::new();
        store.expect_get().returning(move |_| Ok(Some(json.clone())));

        let cache = cache_with(store);
        assert!(cache.get(Uuid::new_v4()).await.is_none());
        assert_eq!(cache.metrics().snapshot().miss_invalid, 1);
    }

    #[tokio::test]
    async fn test_set_writes_whole_entry_with_ttl() {
        let mut store = MockModelStore::new();
        store
            .expect_set_ex()
            .withf(|key, value, ttl| {
                let entry: CachedRankingModel = serde_json::from_str(value).unwrap();
                key.starts_with("feed:ranking-model:")
                    && *ttl == 24 * 3600
                    && entry.version == MODEL_FORMAT_VERSION
                    && entry.training_examples == 150
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let cache = cache_with(store);
        cache.set(Uuid::new_v4(), &trained(150)).await;
        assert_eq!(cache.metrics().snapshot().write_failures, 0);
    }

    #[tokio::test]
    async fn test_set_swallows_store_failure() {
        let mut store = MockModelStore::new();
        store
            .expect_set_ex()
            .returning(|_, _, _| Err(AppError::Cache("write refused".to_string())));

        let cache = cache_with(store);
        // Must not panic or propagate
        cache.set(Uuid::new_v4(), &trained(150)).await;
        assert_eq!(cache.metrics().snapshot().write_failures, 1);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let mut store = MockModelStore::new();
        store.expect_del().times(2).returning(|_| Ok(()));

        let cache = cache_with(store);
        let user = Uuid::new_v4();
        cache.clear(user).await;
        cache.clear(user).await;
    }

    #[tokio::test]
    async fn test_roundtrip_through_serialized_entry() {
        let model = trained(200);
        let entry = CachedRankingModel {
            version: MODEL_FORMAT_VERSION,
            model: model.network.to_serialized(),
            updated_at: Utc::now().timestamp(),
            training_examples: 200,
            last_error: model.report.error,
            last_iterations: model.report.iterations,
        };
        let json = serde_json::to_string(&entry).unwrap();

        let mut store = MockModelStore::new();
        store.expect_get().returning(move |_| Ok(Some(json.clone())));

        let cache = cache_with(store);
        let restored = cache.get(Uuid::new_v4()).await.expect("valid entry");
        let input = [0.4; crate::services::features::FEATURE_DIM];
        assert_eq!(restored.predict(&input), model.network.predict(&input));
    }
}
