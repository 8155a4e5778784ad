//! Feature extraction for candidate scoring.
//!
//! Builds the fixed 11-dimension feature vector consumed by the per-user
//! ranking model. Dimension order is a hard contract between training and
//! inference: a vector built here at training time must line up with the
//! vector built here at scoring time.

use crate::models::{CandidatePost, UserContext};
use crate::utils::{linear_decay, normalize_count};
use chrono::{DateTime, Utc};

/// Number of input features fed to the ranking model.
pub const FEATURE_DIM: usize = 11;

/// Text length is normalized against this many characters, clamped to 1.
const TEXT_LEN_NORM: f64 = 1000.0;

/// Recency decays linearly to zero over this window.
const RECENCY_WINDOW_SECS: i64 = 7 * 24 * 3600;

/// Proximity contribution for an author at a nearby (not same) school.
const NEARBY_SCHOOL_SCORE: f64 = 0.7;

pub type FeatureVector = [f64; FEATURE_DIM];

/// Batch-wide maxima used to normalize engagement counts. Computed once
/// per candidate batch and shared read-only across extractions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStats {
    pub max_reactions: u32,
    pub max_replies: u32,
    pub max_renotes: u32,
}

impl BatchStats {
    pub fn from_posts(posts: &[CandidatePost]) -> Self {
        let mut stats = Self::default();
        for post in posts {
            stats.observe(post);
        }
        stats
    }

    pub fn observe(&mut self, post: &CandidatePost) {
        self.max_reactions = self.max_reactions.max(post.reaction_count);
        self.max_replies = self.max_replies.max(post.reply_count);
        self.max_renotes = self.max_renotes.max(post.renote_count);
    }
}

/// Extract the feature vector for one candidate.
///
/// Pure and idempotent: identical inputs yield bit-identical output. The
/// reference timestamp is supplied by the caller so that every candidate
/// in one request is scored against the same clock.
pub fn extract(
    post: &CandidatePost,
    ctx: &UserContext,
    stats: &BatchStats,
    reference_ts: DateTime<Utc>,
) -> FeatureVector {
    let age_secs = (reference_ts - post.created_at).num_seconds();

    [
        (post.text_len as f64 / TEXT_LEN_NORM).clamp(0.0, 1.0),
        normalize_count(post.reaction_count, stats.max_reactions),
        normalize_count(post.reply_count, stats.max_replies),
        normalize_count(post.renote_count, stats.max_renotes),
        linear_decay(age_secs, RECENCY_WINDOW_SECS),
        flag(ctx.following.contains(&post.author_id)),
        flag(ctx.followed_engaged.contains(&post.id)),
        flag(ctx.reacted.contains(&post.id)),
        flag(ctx.replied.contains(&post.id)),
        flag(ctx.renoted.contains(&post.id)),
        school_proximity(post, ctx),
    ]
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// 1.0 for the same school, 0.7 for a nearby school, 0.0 otherwise.
/// A failed nearby-schools lookup (ctx.nearby_schools == None) counts as
/// an empty nearby set.
fn school_proximity(post: &CandidatePost, ctx: &UserContext) -> f64 {
    let (Some(user_school), Some(author_school)) = (&ctx.school_id, &post.author_school_id) else {
        return 0.0;
    };

    if user_school == author_school {
        return 1.0;
    }

    match &ctx.nearby_schools {
        Some(nearby) if nearby.contains(author_school) => NEARBY_SCHOOL_SCORE,
        _ => 0.0,
    }
}
