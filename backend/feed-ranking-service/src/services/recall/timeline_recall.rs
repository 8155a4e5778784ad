//! Direct-timeline pool: followed accounts, own posts and public local
//! posts inside a bounded time window.

use crate::error::{AppError, Result};
use crate::models::{CandidatePost, TimeWindow, TimelineQuery};
use crate::stores::EngagementStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Window width for uncursored requests and for the bound applied after a
/// `since_id` cursor.
const WINDOW_DAYS: i64 = 7;

pub struct TimelineRecall {
    store: Arc<dyn EngagementStore>,
}

impl TimelineRecall {
    pub fn new(store: Arc<dyn EngagementStore>) -> Self {
        Self { store }
    }

    /// Fetch the direct-timeline pool, over-fetched to `fetch_limit` so
    /// later filtering stages have slack. Store faults propagate: the
    /// page cannot be served without this pool.
    pub async fn recall(
        &self,
        user_id: Uuid,
        query: &TimelineQuery,
        now: DateTime<Utc>,
        fetch_limit: usize,
    ) -> Result<Vec<CandidatePost>> {
        let window = self.resolve_window(query, now).await?;
        self.store
            .timeline_posts(user_id, window, query, fetch_limit)
            .await
    }

    /// Cursor semantics: `since_id` bounds the window to seven days after
    /// the referenced post's creation time; `until_id` caps the upper
    /// edge. A cursor naming an unknown post is a caller fault.
    async fn resolve_window(
        &self,
        query: &TimelineQuery,
        now: DateTime<Utc>,
    ) -> Result<TimeWindow> {
        let width = Duration::days(WINDOW_DAYS);

        let mut window = TimeWindow {
            start: now - width,
            end: now,
        };

        if let Some(since_id) = query.since_id {
            let since = self.cursor_timestamp(since_id).await?;
            window.start = since;
            window.end = since + width;
        }

        if let Some(until_id) = query.until_id {
            let until = self.cursor_timestamp(until_id).await?;
            window.end = window.end.min(until);
            if query.since_id.is_none() {
                window.start = window.end - width;
            }
        }

        Ok(window)
    }

    async fn cursor_timestamp(&self, post_id: Uuid) -> Result<DateTime<Utc>> {
        self.store
            .post_created_at(post_id)
            .await?
            .ok_or_else(|| AppError::Validation(format!("unknown cursor post {}", post_id)))
    }
}
