//! Model-scored recommendation pool.
//!
//! Scores unseen public local candidates with the user's cached model,
//! training one on demand when the cache misses. Cache faults degrade to
//! a miss inside [`RankingModelCache`]; training faults propagate so the
//! aggregator can drop this pool without touching the direct timeline.

use crate::cache::RankingModelCache;
use crate::error::Result;
use crate::models::{ScoredCandidate, UserContext};
use crate::services::features::{self, BatchStats};
use crate::services::trainer::{FeedForwardNetwork, ModelTrainer};
use crate::stores::EngagementStore;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct RecommendationRecall {
    store: Arc<dyn EngagementStore>,
    cache: Arc<RankingModelCache>,
    trainer: ModelTrainer,
    /// Maximum number of unseen candidates pulled for scoring.
    candidate_pool_size: usize,
    /// Candidate sampling window, matching the training window.
    window_days: i64,
}

impl RecommendationRecall {
    pub fn new(
        store: Arc<dyn EngagementStore>,
        cache: Arc<RankingModelCache>,
        trainer: ModelTrainer,
        candidate_pool_size: usize,
        window_days: i64,
    ) -> Self {
        Self {
            store,
            cache,
            trainer,
            candidate_pool_size,
            window_days,
        }
    }

    /// Up to `target` candidates, highest score first. Returns empty when
    /// the user has no model and nothing to train one from.
    pub async fn recall(
        &self,
        ctx: &UserContext,
        reference_ts: DateTime<Utc>,
        target: usize,
        exclude: &HashSet<Uuid>,
    ) -> Result<Vec<ScoredCandidate>> {
        if target == 0 {
            return Ok(Vec::new());
        }

        let Some(network) = self.obtain_model(ctx, reference_ts).await? else {
            return Ok(Vec::new());
        };

        let since = reference_ts - Duration::days(self.window_days);
        let candidates = self
            .store
            .public_local_posts(since, self.candidate_pool_size, exclude)
            .await?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let stats = BatchStats::from_posts(&candidates);
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|post| {
                let vector = features::extract(&post, ctx, &stats, reference_ts);
                ScoredCandidate {
                    score: network.predict(&vector),
                    post,
                }
            })
            .collect();

        // Descending score, post id as the deterministic tie-break.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.post.id.cmp(&b.post.id))
        });
        scored.truncate(target);

        debug!(
            user_id = %ctx.user_id,
            returned = scored.len(),
            "recommendation pool scored"
        );
        Ok(scored)
    }

    /// Cached model, or a freshly trained one persisted best-effort.
    /// Concurrent misses for the same user may both train; the cache
    /// write is a whole-entry replacement so the race is benign.
    async fn obtain_model(
        &self,
        ctx: &UserContext,
        reference_ts: DateTime<Utc>,
    ) -> Result<Option<FeedForwardNetwork>> {
        if let Some(network) = self.cache.get(ctx.user_id).await {
            return Ok(Some(network));
        }

        match self.trainer.train_for_user(ctx, reference_ts).await? {
            Some(trained) => {
                self.cache.set(ctx.user_id, &trained).await;
                Ok(Some(trained.network))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::metrics::CacheMetrics;
    use crate::models::{CandidatePost, Visibility};
    use crate::services::trainer::{TrainerConfig, TrainingConfig};
    use crate::stores::{EngagementHistory, MockEngagementStore, MockModelStore};

    fn post(reactions: u32) -> CandidatePost {
        CandidatePost {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            author_school_id: None,
            created_at: Utc::now(),
            text_len: 120,
            reaction_count: reactions,
            reply_count: 0,
            renote_count: 0,
            visibility: Visibility::Public,
            is_local: true,
        }
    }

    fn cache_with(store: MockModelStore) -> Arc<RankingModelCache> {
        Arc::new(RankingModelCache::new(
            Arc::new(store),
            Arc::new(CacheMetrics::default()),
            Default::default(),
        ))
    }

    fn fast_trainer(store: Arc<dyn EngagementStore>) -> ModelTrainer {
        ModelTrainer::new(
            store,
            TrainerConfig {
                training: TrainingConfig {
                    max_iterations: 20,
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_empty_positive_set_yields_empty_pool() {
        let mut engagement = MockEngagementStore::new();
        engagement
            .expect_engagement_history()
            .returning(|_, _| Ok(EngagementHistory::default()));
        // No model, no training set: the candidate pool must not be fetched.
        engagement.expect_public_local_posts().never();

        let mut model_store = MockModelStore::new();
        model_store.expect_get().returning(|_| Ok(None));

        let store: Arc<dyn EngagementStore> = Arc::new(engagement);
        let recall = RecommendationRecall::new(
            store.clone(),
            cache_with(model_store),
            fast_trainer(store),
            2000,
            7,
        );

        let ctx = UserContext {
            user_id: Uuid::new_v4(),
            ..Default::default()
        };
        let scored = recall
            .recall(&ctx, Utc::now(), 4, &HashSet::new())
            .await
            .unwrap();
        assert!(scored.is_empty());
    }

    #[tokio::test]
    async fn test_trains_on_miss_and_scores_candidates() {
        let engaged_id = Uuid::new_v4();
        let mut engagement = MockEngagementStore::new();
        engagement.expect_engagement_history().returning(move |_, _| {
            Ok(EngagementHistory {
                reacted: vec![post(5)],
                replied: vec![],
                renoted: vec![],
            })
        });
        engagement
            .expect_public_local_posts()
            .returning(|_, limit, _| {
                // First call is the negative sample (1000), second is the
                // scoring candidate pool (2000).
                let n: u32 = if limit == 1000 { 3 } else { 6 };
                Ok((0..n).map(post).collect())
            });

        let mut model_store = MockModelStore::new();
        model_store.expect_get().returning(|_| Ok(None));
        model_store.expect_set_ex().times(1).returning(|_, _, _| Ok(()));

        let store: Arc<dyn EngagementStore> = Arc::new(engagement);
        let recall = RecommendationRecall::new(
            store.clone(),
            cache_with(model_store),
            fast_trainer(store),
            2000,
            7,
        );

        let mut ctx = UserContext {
            user_id: Uuid::new_v4(),
            ..Default::default()
        };
        ctx.reacted.insert(engaged_id);

        let scored = recall
            .recall(&ctx, Utc::now(), 4, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(scored.len(), 4);
        for pair in scored.windows(2) {
            assert!(pair[0].score >= pair[1].score, "descending score order");
        }
    }

    #[tokio::test]
    async fn test_training_fault_propagates() {
        let mut engagement = MockEngagementStore::new();
        engagement
            .expect_engagement_history()
            .returning(|_, _| Err(AppError::Database("gone".to_string())));

        let mut model_store = MockModelStore::new();
        model_store.expect_get().returning(|_| Ok(None));

        let store: Arc<dyn EngagementStore> = Arc::new(engagement);
        let recall = RecommendationRecall::new(
            store.clone(),
            cache_with(model_store),
            fast_trainer(store),
            2000,
            7,
        );

        let ctx = UserContext {
            user_id: Uuid::new_v4(),
            ..Default::default()
        };
        let result = recall.recall(&ctx, Utc::now(), 4, &HashSet::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_zero_target_short_circuits() {
        let engagement = MockEngagementStore::new();
        let model_store = MockModelStore::new();

        let store: Arc<dyn EngagementStore> = Arc::new(engagement);
        let recall = RecommendationRecall::new(
            store.clone(),
            cache_with(model_store),
            fast_trainer(store),
            2000,
            7,
        );

        let ctx = UserContext::default();
        let scored = recall
            .recall(&ctx, Utc::now(), 0, &HashSet::new())
            .await
            .unwrap();
        assert!(scored.is_empty());
    }
}
