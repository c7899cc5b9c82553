//! Post endpoints.

use axum::{Json, Router, extract::State, routing::post};
use coterie_common::AppResult;
use coterie_core::{CommentInput, CreatePostInput};
use coterie_db::entities::{post as post_entity, post_comment, post_star};
use serde::Deserialize;

use super::{MAX_LIMIT, default_limit};
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostIdRequest {
    pub post_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRequest {
    pub post_id: String,
    pub pinned: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub post_id: String,
    #[serde(flatten)]
    pub input: CommentInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCommentsRequest {
    pub post_id: String,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub after_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsRequest {
    pub collection_id: String,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub until_id: Option<String>,
}

async fn create(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreatePostInput>,
) -> AppResult<ApiResponse<post_entity::Model>> {
    let post = state.post_service.create(&user.id, req).await?;
    Ok(ApiResponse::ok(post))
}

async fn show(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<ApiResponse<post_entity::Model>> {
    let post = state.post_service.get(&user.id, &req.post_id).await?;
    Ok(ApiResponse::ok(post))
}

/// Tombstone a post. Returns the tombstone.
async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<ApiResponse<post_entity::Model>> {
    let post = state.post_service.delete(&user.id, &req.post_id).await?;
    Ok(ApiResponse::ok(post))
}

async fn pin(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<PinRequest>,
) -> AppResult<ApiResponse<post_entity::Model>> {
    let post = state
        .post_service
        .set_pinned(&user.id, &req.post_id, req.pinned)
        .await?;
    Ok(ApiResponse::ok(post))
}

async fn star(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<ApiResponse<post_star::Model>> {
    let star = state.post_service.star(&user.id, &req.post_id).await?;
    Ok(ApiResponse::ok(star))
}

async fn unstar(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state.post_service.unstar(&user.id, &req.post_id).await?;
    Ok(ApiResponse::ok(()))
}

async fn comment(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CommentRequest>,
) -> AppResult<ApiResponse<post_comment::Model>> {
    let comment = state
        .post_service
        .comment(&user.id, &req.post_id, req.input)
        .await?;
    Ok(ApiResponse::ok(comment))
}

async fn comments(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListCommentsRequest>,
) -> AppResult<ApiResponse<Vec<post_comment::Model>>> {
    let comments = state
        .post_service
        .list_comments(
            &user.id,
            &req.post_id,
            req.limit.min(MAX_LIMIT),
            req.after_id.as_deref(),
        )
        .await?;
    Ok(ApiResponse::ok(comments))
}

async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListPostsRequest>,
) -> AppResult<ApiResponse<Vec<post_entity::Model>>> {
    let posts = state
        .post_service
        .list_in_collection(
            &user.id,
            &req.collection_id,
            req.limit.min(MAX_LIMIT),
            req.until_id.as_deref(),
        )
        .await?;
    Ok(ApiResponse::ok(posts))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/show", post(show))
        .route("/delete", post(delete))
        .route("/pin", post(pin))
        .route("/star", post(star))
        .route("/unstar", post(unstar))
        .route("/comment", post(comment))
        .route("/comments", post(comments))
        .route("/list", post(list))
}
