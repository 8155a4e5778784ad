//! Final feed assembly.
//!
//! The engine facade callers talk to: validates the request, builds the
//! per-request user context, gathers the candidate pools, then composes
//! merge → dedupe → proximity boost → diversity cap → shuffle → truncate.
//! The shuffle hides the deterministic ordering of the previous stages
//! from users; tests pin it with a seeded RNG.

use crate::cache::RankingModelCache;
use crate::error::{AppError, Result};
use crate::models::{CandidatePost, TimelineQuery, UserContext};
use crate::services::diversity::AuthorDiversityLimiter;
use crate::services::proximity_boost::ProximityBooster;
use crate::services::recall::{CandidateAggregator, RecallConfig};
use crate::services::trainer::{ModelTrainer, TrainerConfig};
use crate::stores::{EngagementStore, FeatureFlags, ProximityLookup};
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_PAGE_SIZE: usize = 100;

pub struct PersonalizedFeedEngine {
    store: Arc<dyn EngagementStore>,
    proximity: Arc<dyn ProximityLookup>,
    cache: Arc<RankingModelCache>,
    aggregator: CandidateAggregator,
    booster: ProximityBooster,
    limiter: AuthorDiversityLimiter,
    window_days: i64,
}

impl PersonalizedFeedEngine {
    pub fn new(
        store: Arc<dyn EngagementStore>,
        cache: Arc<RankingModelCache>,
        proximity: Arc<dyn ProximityLookup>,
        flags: Arc<dyn FeatureFlags>,
        trainer_config: TrainerConfig,
        recall_config: RecallConfig,
    ) -> Self {
        let window_days = recall_config.window_days;
        let trainer = ModelTrainer::new(store.clone(), trainer_config);
        let aggregator =
            CandidateAggregator::new(store.clone(), cache.clone(), trainer, recall_config);

        Self {
            store,
            proximity,
            cache,
            aggregator,
            booster: ProximityBooster::new(flags),
            limiter: AuthorDiversityLimiter,
            window_days,
        }
    }

    /// The engine's single caller-facing operation. The only externally
    /// visible side effects are ranking-model cache writes.
    pub async fn get_personalized_feed(
        &self,
        user_id: Uuid,
        query: TimelineQuery,
    ) -> Result<Vec<CandidatePost>> {
        self.get_personalized_feed_with_rng(user_id, query, &mut rand::thread_rng())
            .await
    }

    /// Deterministic variant: the RNG drives the second-degree coin flip
    /// and the final shuffle.
    pub async fn get_personalized_feed_with_rng<R: Rng>(
        &self,
        user_id: Uuid,
        query: TimelineQuery,
        rng: &mut R,
    ) -> Result<Vec<CandidatePost>> {
        if query.limit == 0 || query.limit > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let now = Utc::now();
        let ctx = self.build_context(user_id, now).await;

        let (set, mut stats) = self.aggregator.gather(&ctx, &query, now, rng).await?;
        let merged = set.merge_deduped();
        stats.merged_count = merged.len();

        let boosted = self.booster.boost(&ctx, merged).await;
        let limited = self.limiter.limit(boosted, query.limit);
        let page = finalize(limited, query.limit, rng);
        stats.final_count = page.len();

        info!(
            %user_id,
            timeline = stats.timeline_count,
            recommended = stats.recommended_count,
            second_degree = stats.second_degree_count,
            merged = stats.merged_count,
            served = stats.final_count,
            "assembled personalized feed"
        );

        Ok(page)
    }

    /// Drop the user's cached ranking model (e.g. after an account reset).
    pub async fn clear_model(&self, user_id: Uuid) {
        self.cache.clear(user_id).await;
    }

    /// Resolve everything about the requesting user that the pipeline
    /// reads more than once: graph membership, engagement id-sets, school
    /// affiliation and the nearby-school set. Each signal degrades to its
    /// empty form on a store fault; only the direct-timeline query itself
    /// may fail the request.
    async fn build_context(&self, user_id: Uuid, now: DateTime<Utc>) -> UserContext {
        let since = now - Duration::days(self.window_days);

        let following = self
            .store
            .following_ids(user_id)
            .await
            .unwrap_or_else(|e| {
                warn!(%user_id, "follow graph unavailable: {}", e);
                HashSet::new()
            });

        let school_id = self.store.user_school(user_id).await.unwrap_or_else(|e| {
            warn!(%user_id, "school affiliation unavailable: {}", e);
            None
        });

        let history = self
            .store
            .engagement_history(user_id, since)
            .await
            .unwrap_or_else(|e| {
                warn!(%user_id, "engagement history unavailable: {}", e);
                Default::default()
            });

        let followed_engaged: HashSet<Uuid> = if following.is_empty() {
            HashSet::new()
        } else {
            match self.store.posts_engaged_by_followed(user_id, since, 1000).await {
                Ok(posts) => posts.into_iter().map(|p| p.id).collect(),
                Err(e) => {
                    warn!(%user_id, "followed-engagement lookup unavailable: {}", e);
                    HashSet::new()
                }
            }
        };

        let nearby_schools = match &school_id {
            Some(school) => match self.proximity.nearby_schools(school).await {
                Ok(nearby) => Some(nearby.into_iter().collect()),
                Err(e) => {
                    warn!(%user_id, "nearby-schools lookup failed: {}", e);
                    None
                }
            },
            None => Some(HashSet::new()),
        };

        UserContext {
            user_id,
            school_id,
            reacted: history.reacted_ids(),
            replied: history.replied_ids(),
            renoted: history.renoted_ids(),
            following,
            followed_engaged,
            nearby_schools,
        }
    }
}

/// Uniform shuffle then truncate to the requested page size.
pub fn finalize<R: Rng>(
    mut posts: Vec<CandidatePost>,
    limit: usize,
    rng: &mut R,
) -> Vec<CandidatePost> {
    posts.shuffle(rng);
    posts.truncate(limit);
    posts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn post() -> CandidatePost {
        CandidatePost {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            author_school_id: None,
            created_at: Utc::now(),
            text_len: 10,
            reaction_count: 0,
            reply_count: 0,
            renote_count: 0,
            visibility: Visibility::Public,
            is_local: true,
        }
    }

    #[test]
    fn test_finalize_truncates_to_limit() {
        let posts: Vec<CandidatePost> = (0..30).map(|_| post()).collect();
        let mut rng = StdRng::seed_from_u64(9);
        let page = finalize(posts, 10, &mut rng);
        assert_eq!(page.len(), 10);
    }

    #[test]
    fn test_finalize_keeps_the_same_set() {
        let posts: Vec<CandidatePost> = (0..10).map(|_| post()).collect();
        let expected: HashSet<Uuid> = posts.iter().map(|p| p.id).collect();

        let mut rng = StdRng::seed_from_u64(9);
        let page = finalize(posts, 10, &mut rng);
        let got: HashSet<Uuid> = page.iter().map(|p| p.id).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_finalize_is_deterministic_under_a_pinned_seed() {
        let posts: Vec<CandidatePost> = (0..10).map(|_| post()).collect();

        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = finalize(posts.clone(), 10, &mut rng_a);
        let b = finalize(posts, 10, &mut rng_b);

        let a_ids: Vec<Uuid> = a.iter().map(|p| p.id).collect();
        let b_ids: Vec<Uuid> = b.iter().map(|p| p.id).collect();
        assert_eq!(a_ids, b_ids);
    }
}
