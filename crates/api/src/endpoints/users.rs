//! User endpoints.

use axum::{Json, Router, extract::State, routing::post};
use coterie_common::AppResult;
use coterie_core::{DeletionReport, RegisterInput, RegisteredUser, UpdateProfileInput};
use coterie_db::entities::user;
use serde::{Deserialize, Serialize};

use super::{MAX_LIMIT, default_limit};
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowUserRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchUsersRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameAvailableResponse {
    pub available: bool,
}

/// Register a new user and issue their token.
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterInput>,
) -> AppResult<ApiResponse<RegisteredUser>> {
    let registered = state.user_service.register(req).await?;
    Ok(ApiResponse::ok(registered))
}

/// The authenticated user.
async fn me(AuthUser(user): AuthUser) -> AppResult<ApiResponse<user::Model>> {
    Ok(ApiResponse::ok(user))
}

async fn show(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ShowUserRequest>,
) -> AppResult<ApiResponse<user::Model>> {
    let user = state.user_service.get(&req.user_id).await?;
    Ok(ApiResponse::ok(user))
}

async fn update(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileInput>,
) -> AppResult<ApiResponse<user::Model>> {
    let updated = state.user_service.update_profile(&user.id, req).await?;
    Ok(ApiResponse::ok(updated))
}

async fn change_username(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UsernameRequest>,
) -> AppResult<ApiResponse<user::Model>> {
    let updated = state
        .user_service
        .change_username(&user.id, &req.username)
        .await?;
    Ok(ApiResponse::ok(updated))
}

/// Whether a username is free. Open to anonymous callers for sign-up forms.
async fn username_available(
    State(state): State<AppState>,
    Json(req): Json<UsernameRequest>,
) -> AppResult<ApiResponse<UsernameAvailableResponse>> {
    let available = state
        .user_service
        .is_username_available(&req.username)
        .await?;
    Ok(ApiResponse::ok(UsernameAvailableResponse { available }))
}

async fn search(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<SearchUsersRequest>,
) -> AppResult<ApiResponse<Vec<user::Model>>> {
    let users = state
        .user_service
        .search_by_username(&user.id, &req.query, req.limit.min(MAX_LIMIT))
        .await?;
    Ok(ApiResponse::ok(users))
}

/// Delete the authenticated account and everything it owns.
async fn delete_account(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<DeletionReport>> {
    let report = state.account_service.delete_account(&user.id).await?;
    Ok(ApiResponse::ok(report))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/me", post(me))
        .route("/show", post(show))
        .route("/update", post(update))
        .route("/change-username", post(change_username))
        .route("/username-available", post(username_available))
        .route("/search", post(search))
        .route("/delete-account", post(delete_account))
}
