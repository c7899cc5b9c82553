//! Blocking endpoints.

use axum::{Json, Router, extract::State, routing::post};
use coterie_common::AppResult;
use serde::{Deserialize, Serialize};

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Block or unblock request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUserRequest {
    pub user_id: String,
}

/// Users the caller blocks.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockListResponse {
    pub blocked_user_ids: Vec<String>,
}

/// Block a user.
async fn block_user(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<BlockUserRequest>,
) -> AppResult<ApiResponse<()>> {
    state.blocking_service.block(&user.id, &req.user_id).await?;
    Ok(ApiResponse::ok(()))
}

/// Unblock a user.
async fn unblock_user(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<BlockUserRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .blocking_service
        .unblock(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

/// Get list of blocked users.
async fn list_blocking(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<BlockListResponse>> {
    let blocked_user_ids = state.blocking_service.blocked_users(&user.id).await?;
    Ok(ApiResponse::ok(BlockListResponse { blocked_user_ids }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(block_user))
        .route("/delete", post(unblock_user))
        .route("/list", post(list_blocking))
}
