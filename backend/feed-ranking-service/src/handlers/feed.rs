use actix_web::{delete, get, web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{FeedResponse, TimelineQuery};
use crate::services::PersonalizedFeedEngine;

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub since_id: Option<Uuid>,
    pub until_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub include_replies: bool,
    #[serde(default = "default_true")]
    pub include_renotes: bool,
}

fn default_limit() -> usize {
    30
}

fn default_true() -> bool {
    true
}

pub struct AppState {
    pub engine: Arc<PersonalizedFeedEngine>,
}

#[get("/api/v1/users/{user_id}/feed")]
pub async fn get_feed(
    path: web::Path<Uuid>,
    query: web::Query<FeedQueryParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();

    debug!(
        "feed request: user={} limit={} since={:?} until={:?}",
        user_id, query.limit, query.since_id, query.until_id
    );

    let timeline_query = TimelineQuery {
        limit: query.limit,
        since_id: query.since_id,
        until_id: query.until_id,
        include_replies: query.include_replies,
        include_renotes: query.include_renotes,
    };

    let posts = state
        .engine
        .get_personalized_feed(user_id, timeline_query)
        .await?;

    Ok(HttpResponse::Ok().json(FeedResponse {
        total_count: posts.len(),
        posts,
    }))
}

/// Drops the user's cached ranking model so the next request retrains.
#[delete("/api/v1/users/{user_id}/feed/model")]
pub async fn clear_ranking_model(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    state.engine.clear_model(user_id).await;
    Ok(HttpResponse::NoContent().finish())
}
