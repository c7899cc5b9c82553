//! Notification endpoints.

use axum::{Json, Router, extract::State, routing::post};
use coterie_common::AppResult;
use coterie_db::entities::notification;
use serde::{Deserialize, Serialize};

use super::{MAX_LIMIT, default_limit};
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsRequest {
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub until_id: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub notification_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub count: u64,
}

async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListNotificationsRequest>,
) -> AppResult<ApiResponse<Vec<notification::Model>>> {
    let notifications = state
        .notification_service
        .list(
            &user.id,
            req.limit.min(MAX_LIMIT),
            req.until_id.as_deref(),
            req.unread_only,
        )
        .await?;
    Ok(ApiResponse::ok(notifications))
}

async fn mark_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<MarkReadRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .notification_service
        .mark_read(&user.id, &req.notification_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

/// Mark everything read. Returns how many rows changed.
async fn mark_all_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.mark_all_read(&user.id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

async fn unread_count(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.unread_count(&user.id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/list", post(list))
        .route("/mark-read", post(mark_read))
        .route("/mark-all-read", post(mark_all_read))
        .route("/unread-count", post(unread_count))
}
