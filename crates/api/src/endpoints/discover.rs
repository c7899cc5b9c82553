//! Discover endpoints.

use axum::{Json, Router, extract::State, routing::post};
use coterie_common::AppResult;
use coterie_core::Ranked;
use coterie_db::entities::{collection, post as post_entity};
use serde::Deserialize;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Most items one discover call ranks.
const MAX_K: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    #[serde(default = "default_k")]
    pub limit: usize,
}

const fn default_k() -> usize {
    20
}

async fn collections(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<DiscoverRequest>,
) -> AppResult<ApiResponse<Vec<Ranked<collection::Model>>>> {
    let ranked = state
        .discover_service
        .discover_collections(&user.id, req.limit.min(MAX_K))
        .await?;
    Ok(ApiResponse::ok(ranked))
}

async fn posts(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<DiscoverRequest>,
) -> AppResult<ApiResponse<Vec<Ranked<post_entity::Model>>>> {
    let ranked = state
        .discover_service
        .discover_posts(&user.id, req.limit.min(MAX_K))
        .await?;
    Ok(ApiResponse::ok(ranked))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/collections", post(collections))
        .route("/posts", post(posts))
}
