//! Collection endpoints.

use axum::{Json, Router, extract::State, routing::post};
use coterie_common::AppResult;
use coterie_core::{AccessList, CreateCollectionInput};
use coterie_db::entities::collection;
use serde::Deserialize;

use super::{MAX_LIMIT, default_limit};
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionIdRequest {
    pub collection_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVisibilityRequest {
    pub collection_id: String,
    pub is_public: bool,
}

/// Add a user to, or remove one from, an access list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAccessRequest {
    pub collection_id: String,
    pub list: AccessList,
    pub user_id: String,
    pub add: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCollectionsRequest {
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub after_id: Option<String>,
}

async fn create(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateCollectionInput>,
) -> AppResult<ApiResponse<collection::Model>> {
    let created = state.collection_service.create(&user.id, req).await?;
    Ok(ApiResponse::ok(created))
}

async fn show(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CollectionIdRequest>,
) -> AppResult<ApiResponse<collection::Model>> {
    let collection = state
        .collection_service
        .get_visible(&user.id, &req.collection_id)
        .await?;
    Ok(ApiResponse::ok(collection))
}

async fn join(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CollectionIdRequest>,
) -> AppResult<ApiResponse<collection::Model>> {
    let collection = state
        .collection_service
        .join(&user.id, &req.collection_id)
        .await?;
    Ok(ApiResponse::ok(collection))
}

async fn leave(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CollectionIdRequest>,
) -> AppResult<ApiResponse<collection::Model>> {
    let collection = state
        .collection_service
        .leave(&user.id, &req.collection_id)
        .await?;
    Ok(ApiResponse::ok(collection))
}

async fn set_visibility(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<SetVisibilityRequest>,
) -> AppResult<ApiResponse<collection::Model>> {
    let collection = state
        .collection_service
        .set_visibility(&user.id, &req.collection_id, req.is_public)
        .await?;
    Ok(ApiResponse::ok(collection))
}

async fn edit_access(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<EditAccessRequest>,
) -> AppResult<ApiResponse<collection::Model>> {
    let collection = state
        .collection_service
        .edit_list(&user.id, &req.collection_id, req.list, &req.user_id, req.add)
        .await?;
    Ok(ApiResponse::ok(collection))
}

/// Move a collection to the trash.
async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CollectionIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .collection_service
        .soft_delete(&user.id, &req.collection_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

async fn restore(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CollectionIdRequest>,
) -> AppResult<ApiResponse<collection::Model>> {
    let collection = state
        .collection_service
        .restore(&user.id, &req.collection_id)
        .await?;
    Ok(ApiResponse::ok(collection))
}

async fn trash(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<collection::Model>>> {
    let trashed = state.collection_service.list_trash(&user.id).await?;
    Ok(ApiResponse::ok(trashed))
}

async fn owned(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListCollectionsRequest>,
) -> AppResult<ApiResponse<Vec<collection::Model>>> {
    let collections = state
        .collection_service
        .list_owned(&user.id, req.limit.min(MAX_LIMIT), req.after_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(collections))
}

async fn joined(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListCollectionsRequest>,
) -> AppResult<ApiResponse<Vec<collection::Model>>> {
    let collections = state
        .collection_service
        .list_joined(&user.id, req.limit.min(MAX_LIMIT), req.after_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(collections))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/show", post(show))
        .route("/join", post(join))
        .route("/leave", post(leave))
        .route("/set-visibility", post(set_visibility))
        .route("/access", post(edit_access))
        .route("/delete", post(delete))
        .route("/restore", post(restore))
        .route("/trash", post(trash))
        .route("/owned", post(owned))
        .route("/joined", post(joined))
}
