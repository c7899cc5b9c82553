//! API integration tests.
//!
//! The router runs over a mock database for token lookups and an in-memory
//! friend graph for relationship state.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::Utc;
use coterie_api::{AppState, app};
use coterie_common::Config;
use coterie_core::MemoryFriendGraph;
use coterie_db::entities::{notification, user};
use sea_orm::{DatabaseBackend, MockDatabase};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_config() -> Config {
    Config::from_toml(
        r#"
        [server]
        url = "https://coterie.example"

        [database]
        url = "postgres://localhost/coterie_test"
        "#,
    )
    .unwrap()
}

fn user_row(id: &str, username: &str) -> user::Model {
    user::Model {
        id: id.to_string(),
        username: username.to_string(),
        username_lower: username.to_lowercase(),
        token: Some(format!("token-{id}")),
        name: None,
        bio: None,
        avatar_url: None,
        banner_url: None,
        preferences: json!({}),
        created_at: Utc::now().fixed_offset(),
        updated_at: None,
    }
}

fn notification_row(
    notifiee: &str,
    notifier: &str,
    kind: notification::NotificationKind,
) -> notification::Model {
    notification::Model {
        id: "n1".to_string(),
        notifiee_id: notifiee.to_string(),
        notifier_id: Some(notifier.to_string()),
        kind,
        entity_id: None,
        is_read: false,
        created_at: Utc::now().fixed_offset(),
    }
}

async fn test_app(db: MockDatabase, graph: MemoryFriendGraph) -> Router {
    let state = AppState::with_graph(
        Arc::new(db.into_connection()),
        Arc::new(graph),
        &test_config(),
    )
    .unwrap();
    app(state)
}

fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = test_app(
        MockDatabase::new(DatabaseBackend::Postgres),
        MemoryFriendGraph::new(),
    )
    .await;

    let response = app
        .oneshot(post_json("/nonexistent", None, &json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = test_app(
        MockDatabase::new(DatabaseBackend::Postgres),
        MemoryFriendGraph::new(),
    )
    .await;

    let response = app
        .oneshot(post_json("/users/me", None, &json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NOT_AUTHENTICATED");
}

#[tokio::test]
async fn test_unknown_token_is_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<user::Model>::new()]);
    let app = test_app(db, MemoryFriendGraph::new()).await;

    let response = app
        .oneshot(post_json("/users/me", Some("nope"), &json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_hides_token() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user_row("u1", "alice")]]);
    let app = test_app(db, MemoryFriendGraph::new()).await;

    let response = app
        .oneshot(post_json("/users/me", Some("token-u1"), &json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["username"], "alice");
    assert!(body["data"].get("token").is_none());
}

#[tokio::test]
async fn test_register_rejects_bad_username() {
    let app = test_app(
        MockDatabase::new(DatabaseBackend::Postgres),
        MemoryFriendGraph::new(),
    )
    .await;

    let response = app
        .oneshot(post_json(
            "/users/register",
            None,
            &json!({ "username": "not valid!" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_missing_field_is_unprocessable() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user_row("u1", "alice")]]);
    let app = test_app(db, MemoryFriendGraph::new()).await;

    let response = app
        .oneshot(post_json("/friends/request", Some("token-u1"), &json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_open_room_needs_two_participants() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user_row("u1", "alice")]]);
    let app = test_app(db, MemoryFriendGraph::new()).await;

    let response = app
        .oneshot(post_json(
            "/chat/open",
            Some("token-u1"),
            &json!({ "participants": ["u1", "u2", "u3"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "INVALID_PARTICIPANT_COUNT");
}

#[tokio::test]
async fn test_friend_request_accept_flow() {
    use notification::NotificationKind;

    let graph = MemoryFriendGraph::new();
    graph.add_user("u1").await;
    graph.add_user("u2").await;

    // Token lookups and notification inserts, in request order
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user_row("u1", "alice")]])
        .append_query_results([vec![notification_row("u2", "u1", NotificationKind::FriendRequest)]])
        .append_query_results([vec![user_row("u2", "bob")]])
        .append_query_results([vec![notification_row("u1", "u2", NotificationKind::FriendAccepted)]])
        .append_query_results([vec![user_row("u1", "alice")]]);
    let app = test_app(db, graph).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/friends/request",
            Some("token-u1"),
            &json!({ "userId": "u2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"], "requested");

    let response = app
        .clone()
        .oneshot(post_json(
            "/friends/accept",
            Some("token-u2"),
            &json!({ "userId": "u1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json(
            "/friends/relation",
            Some("token-u1"),
            &json!({ "userId": "u2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"]["mine"], "friends");
    assert_eq!(body["data"]["status"]["theirs"], "friends");
    assert_eq!(body["data"]["isOneWayUnadd"], false);
}

#[tokio::test]
async fn test_befriending_yourself_is_rejected() {
    let graph = MemoryFriendGraph::new();
    graph.add_user("u1").await;
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user_row("u1", "alice")]]);
    let app = test_app(db, graph).await;

    let response = app
        .oneshot(post_json(
            "/friends/request",
            Some("token-u1"),
            &json!({ "userId": "u1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
