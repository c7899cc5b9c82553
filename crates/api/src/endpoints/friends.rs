//! Friendship endpoints.
//!
//! Every route takes the other party as `userId`; the caller is always the
//! authenticated user.

use axum::{Json, Router, extract::State, routing::post};
use coterie_common::AppResult;
use coterie_core::{PairStatus, SendRequestResult};
use coterie_db::entities::friend_request;
use serde::{Deserialize, Serialize};

use super::{MAX_LIMIT, default_limit};
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequestsRequest {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatesRequest {
    pub user_ids: Vec<String>,
}

/// Relation of the caller to another user.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationResponse {
    pub status: PairStatus,
    pub is_one_way_unadd: bool,
    pub can_restore_directly: bool,
}

async fn send_request(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> AppResult<ApiResponse<SendRequestResult>> {
    let result = state
        .friendship_service
        .send_request(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(result))
}

async fn accept(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .friendship_service
        .accept_request(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

async fn deny(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .friendship_service
        .deny_request(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

async fn cancel(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .friendship_service
        .cancel_request(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

async fn remove(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> AppResult<ApiResponse<PairStatus>> {
    let status = state
        .friendship_service
        .remove_friend(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(status))
}

async fn restore(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .friendship_service
        .restore_friend(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

async fn relation(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> AppResult<ApiResponse<RelationResponse>> {
    let service = &state.friendship_service;
    let status = service.relation(&user.id, &req.user_id).await?;
    let is_one_way_unadd = service.is_one_way_unadd(&user.id, &req.user_id).await?;
    let can_restore_directly = service
        .can_restore_directly(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(RelationResponse {
        status,
        is_one_way_unadd,
        can_restore_directly,
    }))
}

async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<String>>> {
    let friends = state.friendship_service.friends(&user.id).await?;
    Ok(ApiResponse::ok(friends))
}

async fn requests(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListRequestsRequest>,
) -> AppResult<ApiResponse<Vec<friend_request::Model>>> {
    let pending = state
        .friendship_service
        .pending_requests(&user.id, req.limit.min(MAX_LIMIT))
        .await?;
    Ok(ApiResponse::ok(pending))
}

/// Filter a list of users down to those the caller may be offered.
async fn candidates(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CandidatesRequest>,
) -> AppResult<ApiResponse<Vec<String>>> {
    let candidates = state
        .friendship_service
        .add_user_candidates(&user.id, &req.user_ids)
        .await?;
    Ok(ApiResponse::ok(candidates))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/request", post(send_request))
        .route("/accept", post(accept))
        .route("/deny", post(deny))
        .route("/cancel", post(cancel))
        .route("/remove", post(remove))
        .route("/restore", post(restore))
        .route("/relation", post(relation))
        .route("/list", post(list))
        .route("/requests", post(requests))
        .route("/candidates", post(candidates))
}
