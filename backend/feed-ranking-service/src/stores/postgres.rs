//! PostgreSQL implementation of [`EngagementStore`].
//!
//! Schema expectations: `posts` carries denormalized engagement counters
//! and the visibility/locality columns; `follows`, `reactions`, `replies`
//! and `renotes` are plain relation tables; `users.school_id` is nullable;
//! `mutes`/`blocks` hold the standard filter relations.

use super::{EngagementHistory, EngagementStore};
use crate::error::Result;
use crate::models::{CandidatePost, TimeWindow, TimelineQuery, Visibility};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

const CANDIDATE_COLUMNS: &str = "p.id, p.user_id, u.school_id, p.created_at, p.text_len, \
     p.reaction_count, p.reply_count, p.renote_count, p.visibility, p.is_local";

#[derive(Clone)]
pub struct PostgresEngagementStore {
    pool: PgPool,
}

impl PostgresEngagementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EngagementStore for PostgresEngagementStore {
    async fn timeline_posts(
        &self,
        user_id: Uuid,
        window: TimeWindow,
        query: &TimelineQuery,
        limit: usize,
    ) -> Result<Vec<CandidatePost>> {
        let rows = sqlx::query(&format!(
            "SELECT {CANDIDATE_COLUMNS}
             FROM posts p
             JOIN users u ON u.id = p.user_id
             WHERE p.soft_delete IS NULL
               AND p.created_at > $2
               AND p.created_at <= $3
               AND (
                     p.user_id = $1
                     OR p.user_id IN (SELECT followee_id FROM follows WHERE follower_id = $1)
                     OR (p.visibility = 'public' AND p.is_local = TRUE)
                   )
               AND NOT EXISTS (
                     SELECT 1 FROM mutes m
                     WHERE m.user_id = $1 AND m.target_id = p.user_id
                   )
               AND NOT EXISTS (
                     SELECT 1 FROM blocks b
                     WHERE b.user_id = p.user_id AND b.target_id = $1
                   )
               AND ($4 OR p.reply_to_id IS NULL)
               AND ($5 OR p.renote_of_id IS NULL)
             ORDER BY p.created_at DESC
             LIMIT $6"
        ))
        .bind(user_id)
        .bind(window.start)
        .bind(window.end)
        .bind(query.include_replies)
        .bind(query.include_renotes)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candidate).collect()
    }

    async fn following_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let rows = sqlx::query("SELECT followee_id FROM follows WHERE follower_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let mut ids = HashSet::with_capacity(rows.len());
        for row in rows {
            ids.insert(row.try_get("followee_id")?);
        }
        Ok(ids)
    }

    async fn user_school(&self, user_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT school_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get("school_id")?),
            None => Ok(None),
        }
    }

    async fn engagement_history(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<EngagementHistory> {
        Ok(EngagementHistory {
            reacted: self.engaged_posts("reactions", user_id, since).await?,
            replied: self.engaged_posts("replies", user_id, since).await?,
            renoted: self.engaged_posts("renotes", user_id, since).await?,
        })
    }

    async fn posts_by_authors(
        &self,
        author_ids: &HashSet<Uuid>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CandidatePost>> {
        if author_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = author_ids.iter().copied().collect();

        let rows = sqlx::query(&format!(
            "SELECT {CANDIDATE_COLUMNS}
             FROM posts p
             JOIN users u ON u.id = p.user_id
             WHERE p.soft_delete IS NULL
               AND p.user_id = ANY($1)
               AND p.created_at > $2
             ORDER BY p.created_at DESC
             LIMIT $3"
        ))
        .bind(&ids)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candidate).collect()
    }

    async fn posts_engaged_by_followed(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CandidatePost>> {
        let rows = sqlx::query(&format!(
            "SELECT {CANDIDATE_COLUMNS}
             FROM posts p
             JOIN users u ON u.id = p.user_id
             WHERE p.soft_delete IS NULL
               AND p.id IN (
                     SELECT e.post_id FROM (
                         SELECT post_id, user_id, created_at FROM reactions
                         UNION ALL
                         SELECT post_id, user_id, created_at FROM replies
                         UNION ALL
                         SELECT post_id, user_id, created_at FROM renotes
                     ) e
                     WHERE e.created_at > $2
                       AND e.user_id IN (
                             SELECT followee_id FROM follows WHERE follower_id = $1
                           )
                   )
             ORDER BY p.created_at DESC
             LIMIT $3"
        ))
        .bind(user_id)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candidate).collect()
    }

    async fn public_local_posts(
        &self,
        since: DateTime<Utc>,
        limit: usize,
        exclude: &HashSet<Uuid>,
    ) -> Result<Vec<CandidatePost>> {
        let excluded: Vec<Uuid> = exclude.iter().copied().collect();

        let rows = sqlx::query(&format!(
            "SELECT {CANDIDATE_COLUMNS}
             FROM posts p
             JOIN users u ON u.id = p.user_id
             WHERE p.soft_delete IS NULL
               AND p.visibility = 'public'
               AND p.is_local = TRUE
               AND p.created_at > $1
               AND NOT (p.id = ANY($2))
             ORDER BY random()
             LIMIT $3"
        ))
        .bind(since)
        .bind(&excluded)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candidate).collect()
    }

    async fn second_degree_public_posts(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CandidatePost>> {
        let rows = sqlx::query(&format!(
            "SELECT {CANDIDATE_COLUMNS}
             FROM posts p
             JOIN users u ON u.id = p.user_id
             WHERE p.soft_delete IS NULL
               AND p.visibility = 'public'
               AND p.user_id IN (
                     SELECT f2.followee_id
                     FROM follows f1
                     JOIN follows f2 ON f2.follower_id = f1.followee_id
                     WHERE f1.follower_id = $1
                       AND f2.followee_id <> $1
                       AND f2.followee_id NOT IN (
                             SELECT followee_id FROM follows WHERE follower_id = $1
                           )
                   )
             ORDER BY random()
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candidate).collect()
    }

    async fn post_created_at(&self, post_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT created_at FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("created_at")?)),
            None => Ok(None),
        }
    }
}

impl PostgresEngagementStore {
    /// Posts the user engaged with through one relation table.
    async fn engaged_posts(
        &self,
        relation: &str,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<CandidatePost>> {
        let rows = sqlx::query(&format!(
            "SELECT {CANDIDATE_COLUMNS}
             FROM {relation} e
             JOIN posts p ON p.id = e.post_id
             JOIN users u ON u.id = p.user_id
             WHERE e.user_id = $1
               AND e.created_at > $2
               AND p.soft_delete IS NULL
             ORDER BY e.created_at DESC"
        ))
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_candidate).collect()
    }
}

fn row_to_candidate(row: &PgRow) -> Result<CandidatePost> {
    let visibility: String = row.try_get("visibility")?;
    Ok(CandidatePost {
        id: row.try_get("id")?,
        author_id: row.try_get("user_id")?,
        author_school_id: row.try_get("school_id")?,
        created_at: row.try_get("created_at")?,
        text_len: row.try_get::<i32, _>("text_len")? as u32,
        reaction_count: row.try_get::<i32, _>("reaction_count")? as u32,
        reply_count: row.try_get::<i32, _>("reply_count")? as u32,
        renote_count: row.try_get::<i32, _>("renote_count")? as u32,
        visibility: parse_visibility(&visibility),
        is_local: row.try_get("is_local")?,
    })
}

fn parse_visibility(value: &str) -> Visibility {
    match value {
        "public" => Visibility::Public,
        "home" => Visibility::Home,
        "followers" => Visibility::Followers,
        other => {
            warn!("unknown visibility '{}', treating as followers-only", other);
            Visibility::Followers
        }
    }
}
