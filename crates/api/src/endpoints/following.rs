//! Following endpoints.

use axum::{Json, Router, extract::State, routing::post};
use coterie_common::AppResult;
use coterie_db::entities::following;
use serde::{Deserialize, Serialize};

use super::{MAX_LIMIT, default_limit};
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFollowingRequest {
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub until_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowerCountResponse {
    pub count: u64,
}

async fn follow(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<FollowRequest>,
) -> AppResult<ApiResponse<following::Model>> {
    let edge = state
        .following_service
        .follow(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(edge))
}

async fn unfollow(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<FollowRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .following_service
        .unfollow(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListFollowingRequest>,
) -> AppResult<ApiResponse<Vec<following::Model>>> {
    let edges = state
        .following_service
        .following(&user.id, req.limit.min(MAX_LIMIT), req.until_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(edges))
}

async fn follower_count(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<FollowRequest>,
) -> AppResult<ApiResponse<FollowerCountResponse>> {
    let count = state.following_service.follower_count(&req.user_id).await?;
    Ok(ApiResponse::ok(FollowerCountResponse { count }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(follow))
        .route("/delete", post(unfollow))
        .route("/list", post(list))
        .route("/followers/count", post(follower_count))
}
