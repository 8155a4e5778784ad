//! External collaborator boundaries.
//!
//! The engine talks to the relational store, the cache store, the
//! proximity service and the feature-flag source exclusively through the
//! traits in this module, so every one of them can be replaced by a test
//! double. The production implementations live in the submodules.

pub mod postgres;
pub mod proximity;
pub mod redis_store;

pub use postgres::PostgresEngagementStore;
pub use proximity::HttpProximityLookup;
pub use redis_store::RedisModelStore;

use crate::error::Result;
use crate::models::{CandidatePost, TimeWindow, TimelineQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use std::collections::HashSet;
use uuid::Uuid;

/// The user's own engagements within a window, as full post views so they
/// can double as training positives.
#[derive(Debug, Clone, Default)]
pub struct EngagementHistory {
    pub reacted: Vec<CandidatePost>,
    pub replied: Vec<CandidatePost>,
    pub renoted: Vec<CandidatePost>,
}

impl EngagementHistory {
    pub fn reacted_ids(&self) -> HashSet<Uuid> {
        self.reacted.iter().map(|p| p.id).collect()
    }

    pub fn replied_ids(&self) -> HashSet<Uuid> {
        self.replied.iter().map(|p| p.id).collect()
    }

    pub fn renoted_ids(&self) -> HashSet<Uuid> {
        self.renoted.iter().map(|p| p.id).collect()
    }
}

/// Post/user/engagement queries against the relational store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Direct-timeline pool: posts from followed accounts, the user's own
    /// posts and public local posts, filtered by the standard
    /// visibility/mute/block rules and the query's content filters,
    /// newest first.
    async fn timeline_posts(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        query: &TimelineQuery,
        limit: usize,
    ) -> Result<Vec<CandidatePost>>;

    async fn following_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>>;

    async fn user_school(&self, user_id: Uuid) -> Result<Option<String>>;

    async fn engagement_history(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<EngagementHistory>;

    /// Recent posts authored by any of the given accounts.
    async fn posts_by_authors(
        &self,
        author_ids: &HashSet<Uuid>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CandidatePost>>;

    /// Posts the user's followed accounts reacted to, replied to or
    /// renoted within the window.
    async fn posts_engaged_by_followed(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CandidatePost>>;

    /// Random sample of public local posts in the window, excluding the
    /// given ids.
    async fn public_local_posts(
        &self,
        since: DateTime<Utc>,
        limit: usize,
        exclude: &HashSet<Uuid>,
    ) -> Result<Vec<CandidatePost>>;

    /// Random public posts authored by second-degree connections
    /// (accounts followed by the user's followees, minus direct follows
    /// and the user).
    async fn second_degree_public_posts(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CandidatePost>>;

    /// Creation time of one post, for cursor window resolution.
    async fn post_created_at(&self, post_id: Uuid) -> Result<Option<DateTime<Utc>>>;
}

/// Key-value store with per-key expiry backing the ranking model cache.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
}

/// School proximity service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProximityLookup: Send + Sync {
    async fn nearby_schools(&self, school_id: &str) -> Result<Vec<String>>;
}

/// Instance-wide feature flags.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn proximity_boost_enabled(&self) -> bool;
}

/// Config-backed flags, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct StaticFeatureFlags {
    pub proximity_boost: bool,
}

#[async_trait]
impl FeatureFlags for StaticFeatureFlags {
    async fn proximity_boost_enabled(&self) -> bool {
        self.proximity_boost
    }
}
