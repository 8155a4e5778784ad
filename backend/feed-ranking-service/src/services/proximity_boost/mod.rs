//! School-affinity boost.
//!
//! Re-orders the merged candidate list by proximity class (same school,
//! nearby school, everything else), newest first within a class. Gated by
//! the instance feature flag; a user without a school affiliation or a
//! failed nearby-schools lookup leaves the input order untouched.

use crate::models::{CandidatePost, UserContext};
use crate::stores::FeatureFlags;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct ProximityBooster {
    flags: Arc<dyn FeatureFlags>,
}

impl ProximityBooster {
    pub fn new(flags: Arc<dyn FeatureFlags>) -> Self {
        Self { flags }
    }

    pub async fn boost(
        &self,
        ctx: &UserContext,
        posts: Vec<CandidatePost>,
    ) -> Vec<CandidatePost> {
        if !self.flags.proximity_boost_enabled().await {
            return posts;
        }

        let Some(school) = &ctx.school_id else {
            return posts;
        };

        let Some(nearby) = &ctx.nearby_schools else {
            debug!(user_id = %ctx.user_id, "nearby-schools lookup unavailable, skipping boost");
            return posts;
        };

        let mut boosted = posts;
        boosted.sort_by(|a, b| {
            proximity_class(b, school, nearby)
                .cmp(&proximity_class(a, school, nearby))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        boosted
    }
}

/// 2 = same school, 1 = nearby school, 0 = everything else.
fn proximity_class(post: &CandidatePost, school: &str, nearby: &HashSet<String>) -> u8 {
    match &post.author_school_id {
        Some(s) if s == school => 2,
        Some(s) if nearby.contains(s) => 1,
        _ => 0,
    }
}
