//! HTTP API layer for coterie.
//!
//! - **Endpoints**: JSON-over-POST routes for every service
//! - **Extractors**: bearer-token authentication
//! - **Middleware**: application state and token resolution
//!
//! Built on Axum 0.8.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};

use axum::Router;

/// The API router with authentication applied, ready for serving.
pub fn app(state: AppState) -> Router {
    router()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}
