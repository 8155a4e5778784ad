use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Visibility class of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Home,
    Followers,
}

/// Read-only candidate view of a post, constructed fresh per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePost {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_school_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub text_len: u32,
    pub reaction_count: u32,
    pub reply_count: u32,
    pub renote_count: u32,
    pub visibility: Visibility,
    pub is_local: bool,
}

impl CandidatePost {
    /// Public posts on the local instance are the sampling universe for
    /// recommendations and negative examples.
    pub fn is_public_local(&self) -> bool {
        self.visibility == Visibility::Public && self.is_local
    }
}

/// Requesting user's view of the social graph, fixed for one request.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub user_id: Uuid,
    pub school_id: Option<String>,
    pub following: HashSet<Uuid>,
    /// Post ids the user reacted to within the training window.
    pub reacted: HashSet<Uuid>,
    /// Post ids the user replied to within the training window.
    pub replied: HashSet<Uuid>,
    /// Post ids the user renoted within the training window.
    pub renoted: HashSet<Uuid>,
    /// Post ids engaged (reacted/replied/renoted) by followed accounts.
    pub followed_engaged: HashSet<Uuid>,
    /// Nearby-school set for the user's school. `None` means the proximity
    /// lookup failed this request and boosting must be skipped.
    pub nearby_schools: Option<HashSet<String>>,
}

impl UserContext {
    pub fn has_engaged(&self, post_id: &Uuid) -> bool {
        self.reacted.contains(post_id)
            || self.replied.contains(post_id)
            || self.renoted.contains(post_id)
    }
}

/// A candidate paired with its model score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub score: f64,
    pub post: CandidatePost,
}

/// Pagination and content-filter parameters for one feed request.
#[derive(Debug, Clone, Default)]
pub struct TimelineQuery {
    pub limit: usize,
    pub since_id: Option<Uuid>,
    pub until_id: Option<Uuid>,
    pub include_replies: bool,
    pub include_renotes: bool,
}

/// Half-open time range (start, end] a timeline query is bounded to.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Per-request pool counters, logged after assembly.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub timeline_count: usize,
    pub recommended_count: usize,
    pub second_degree_count: usize,
    pub merged_count: usize,
    pub final_count: usize,
}

/// Feed response returned by the HTTP handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub posts: Vec<CandidatePost>,
    pub total_count: usize,
}
