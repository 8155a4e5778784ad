//! Candidate aggregation layer.
//!
//! Gathers the three per-request pools and merges them into one deduped
//! candidate list:
//!   1. direct timeline (graph + own + public local, windowed)
//!   2. model-scored recommendations
//!   3. probabilistic second-degree sample
//!
//! Pool 1 faults fail the request. Pool 2 and 3 faults are caught here
//! and degrade to an empty pool with a warning, so the direct timeline
//! always survives a broken recommendation path.

mod recommendation_recall;
mod second_degree_recall;
mod timeline_recall;

pub use recommendation_recall::RecommendationRecall;
pub use second_degree_recall::SecondDegreeRecall;
pub use timeline_recall::TimelineRecall;

use crate::cache::RankingModelCache;
use crate::error::Result;
use crate::models::{CandidatePost, PoolStats, TimelineQuery, UserContext};
use crate::services::trainer::ModelTrainer;
use crate::stores::EngagementStore;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RecallConfig {
    /// Fraction of the page limit the recommendation pool may fill.
    pub recommendation_ratio: f64,
    /// Unseen candidates pulled for model scoring.
    pub recommendation_pool_size: usize,
    /// Fraction of the page limit the second-degree pool may fill.
    pub second_degree_ratio: f64,
    /// Per-request probability of sampling the second-degree pool.
    pub second_degree_probability: f64,
    /// The direct timeline is over-fetched by this factor.
    pub timeline_overfetch: usize,
    /// Shared engagement/candidate window width.
    pub window_days: i64,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            recommendation_ratio: 0.4,
            recommendation_pool_size: 2000,
            second_degree_ratio: 0.15,
            second_degree_probability: 0.15,
            timeline_overfetch: 2,
            window_days: 7,
        }
    }
}

/// The three pools of one request, before merging.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub timeline: Vec<CandidatePost>,
    pub recommended: Vec<CandidatePost>,
    pub second_degree: Vec<CandidatePost>,
}

impl CandidateSet {
    /// Merge preserving pool order and first occurrence per post id.
    pub fn merge_deduped(self) -> Vec<CandidatePost> {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut merged = Vec::new();
        for post in self
            .timeline
            .into_iter()
            .chain(self.recommended)
            .chain(self.second_degree)
        {
            if seen.insert(post.id) {
                merged.push(post);
            }
        }
        merged
    }
}

pub struct CandidateAggregator {
    timeline: TimelineRecall,
    recommendation: RecommendationRecall,
    second_degree: SecondDegreeRecall,
    config: RecallConfig,
}

impl CandidateAggregator {
    pub fn new(
        store: Arc<dyn EngagementStore>,
        cache: Arc<RankingModelCache>,
        trainer: ModelTrainer,
        config: RecallConfig,
    ) -> Self {
        Self {
            timeline: TimelineRecall::new(store.clone()),
            recommendation: RecommendationRecall::new(
                store.clone(),
                cache,
                trainer,
                config.recommendation_pool_size,
                config.window_days,
            ),
            second_degree: SecondDegreeRecall::new(store, config.second_degree_probability),
            config,
        }
    }

    /// Gather all three pools. The reference timestamp handed to pools 2
    /// and 3 is the oldest pool-1 post's creation time, keeping the pools
    /// chronologically comparable; an empty pool 1 falls back to the
    /// request timestamp.
    pub async fn gather<R: Rng>(
        &self,
        ctx: &UserContext,
        query: &TimelineQuery,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<(CandidateSet, PoolStats)> {
        let fetch_limit = query.limit.saturating_mul(self.config.timeline_overfetch);
        let timeline = self
            .timeline
            .recall(ctx.user_id, query, now, fetch_limit)
            .await?;

        let reference_ts = timeline
            .iter()
            .map(|p| p.created_at)
            .min()
            .unwrap_or(now);

        let mut exclude: HashSet<Uuid> = timeline.iter().map(|p| p.id).collect();
        exclude.extend(&ctx.reacted);
        exclude.extend(&ctx.replied);
        exclude.extend(&ctx.renoted);

        let recommendation_target =
            (query.limit as f64 * self.config.recommendation_ratio).floor() as usize;
        let recommended = match self
            .recommendation
            .recall(ctx, reference_ts, recommendation_target, &exclude)
            .await
        {
            Ok(scored) => scored.into_iter().map(|s| s.post).collect(),
            Err(e) => {
                warn!(user_id = %ctx.user_id, "recommendation pool failed: {}", e);
                Vec::new()
            }
        };

        let second_degree_target =
            (query.limit as f64 * self.config.second_degree_ratio).floor() as usize;
        let second_degree = match self
            .second_degree
            .recall(ctx.user_id, second_degree_target, rng)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                warn!(user_id = %ctx.user_id, "second-degree pool failed: {}", e);
                Vec::new()
            }
        };

        let stats = PoolStats {
            timeline_count: timeline.len(),
            recommended_count: recommended.len(),
            second_degree_count: second_degree.len(),
            ..Default::default()
        };

        Ok((
            CandidateSet {
                timeline,
                recommended,
                second_degree,
            },
            stats,
        ))
    }
}
