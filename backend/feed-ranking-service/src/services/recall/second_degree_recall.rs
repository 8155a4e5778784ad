//! Probabilistic second-degree pool.
//!
//! Most requests skip this pool entirely; a 15% coin flip pulls a small
//! random sample of public posts from friends-of-friends to keep the
//! timeline from closing in on itself.

use crate::error::Result;
use crate::models::CandidatePost;
use crate::stores::EngagementStore;
use rand::Rng;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct SecondDegreeRecall {
    store: Arc<dyn EngagementStore>,
    /// Per-request probability of sampling this pool at all.
    probability: f64,
}

impl SecondDegreeRecall {
    pub fn new(store: Arc<dyn EngagementStore>, probability: f64) -> Self {
        Self { store, probability }
    }

    pub async fn recall<R: Rng>(
        &self,
        user_id: Uuid,
        target: usize,
        rng: &mut R,
    ) -> Result<Vec<CandidatePost>> {
        if target == 0 || !rng.gen_bool(self.probability) {
            return Ok(Vec::new());
        }

        let posts = self.store.second_degree_public_posts(user_id, target).await?;
        debug!(
            %user_id,
            returned = posts.len(),
            "second-degree pool sampled"
        );
        Ok(posts)
    }
}
