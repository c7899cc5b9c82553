//! Chat endpoints.

use axum::{Json, Router, extract::State, routing::post};
use coterie_common::AppResult;
use coterie_core::{EditMessageInput, SendMessageInput};
use coterie_db::entities::{chat_room, message};
use serde::Deserialize;

use super::{MAX_LIMIT, default_limit};
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoomRequest {
    pub participants: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub room_id: String,
    #[serde(flatten)]
    pub input: SendMessageInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub message_id: String,
    #[serde(flatten)]
    pub input: EditMessageInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageIdRequest {
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesRequest {
    pub room_id: String,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub until_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRoomsRequest {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

/// Open, or reopen, the room between the caller and one other user.
async fn open(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<OpenRoomRequest>,
) -> AppResult<ApiResponse<chat_room::Model>> {
    let room = state
        .chat_service
        .open_room(&user.id, &req.participants)
        .await?;
    Ok(ApiResponse::ok(room))
}

async fn send(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> AppResult<ApiResponse<message::Model>> {
    let message = state
        .chat_service
        .send_message(&user.id, &req.room_id, req.input)
        .await?;
    Ok(ApiResponse::ok(message))
}

async fn edit(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<EditRequest>,
) -> AppResult<ApiResponse<message::Model>> {
    let message = state
        .chat_service
        .edit_message(&user.id, &req.message_id, req.input)
        .await?;
    Ok(ApiResponse::ok(message))
}

/// Hide a message from the caller only.
async fn delete_for_me(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<MessageIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .chat_service
        .delete_for_me(&user.id, &req.message_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

/// Tombstone a message for everyone.
async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<MessageIdRequest>,
) -> AppResult<ApiResponse<message::Model>> {
    let message = state
        .chat_service
        .delete_message(&user.id, &req.message_id)
        .await?;
    Ok(ApiResponse::ok(message))
}

async fn messages(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListMessagesRequest>,
) -> AppResult<ApiResponse<Vec<message::Model>>> {
    let messages = state
        .chat_service
        .list_messages(
            &user.id,
            &req.room_id,
            req.limit.min(MAX_LIMIT),
            req.until_id.as_deref(),
        )
        .await?;
    Ok(ApiResponse::ok(messages))
}

async fn rooms(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListRoomsRequest>,
) -> AppResult<ApiResponse<Vec<chat_room::Model>>> {
    let rooms = state
        .chat_service
        .rooms_for(&user.id, req.limit.min(MAX_LIMIT))
        .await?;
    Ok(ApiResponse::ok(rooms))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/open", post(open))
        .route("/send", post(send))
        .route("/edit", post(edit))
        .route("/delete-for-me", post(delete_for_me))
        .route("/delete", post(delete))
        .route("/messages", post(messages))
        .route("/rooms", post(rooms))
}
