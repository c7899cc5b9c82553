//! API endpoints.

mod blocking;
mod chat;
mod collections;
mod discover;
mod following;
mod friends;
mod notifications;
mod posts;
mod users;

use axum::Router;

use crate::middleware::AppState;

/// Largest page a list endpoint returns.
const MAX_LIMIT: u64 = 100;

const fn default_limit() -> u64 {
    30
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/users", users::router())
        .nest("/friends", friends::router())
        .nest("/blocking", blocking::router())
        .nest("/following", following::router())
        .nest("/discover", discover::router())
        .nest("/collections", collections::router())
        .nest("/posts", posts::router())
        .nest("/chat", chat::router())
        .nest("/notifications", notifications::router())
}
