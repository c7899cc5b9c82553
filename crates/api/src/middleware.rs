//! API middleware and application state.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use chrono::TimeDelta;
use coterie_common::{AppResult, Config};
use coterie_core::{
    AccountService, BlockingService, ChatService, CollectionService, DbFriendGraph,
    DiscoverService, FollowingService, FriendGraph, FriendshipService, HttpBlockGateway,
    NotificationService, PostService, UserService,
};
use coterie_db::repositories::{
    ChatRoomRepository, CollectionRepository, FollowingRepository, MessageRepository,
    NotificationRepository, PostRepository, UserRepository,
};
use coterie_queue::{AdmissionConfig, AdmissionLimiter, RetryConfig};
use sea_orm::DatabaseConnection;
use tracing::{debug, info};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub user_service: UserService,
    pub friendship_service: FriendshipService,
    pub blocking_service: BlockingService,
    pub following_service: FollowingService,
    pub discover_service: DiscoverService,
    pub collection_service: CollectionService,
    pub post_service: PostService,
    pub chat_service: ChatService,
    pub notification_service: NotificationService,
    pub account_service: AccountService,
}

impl AppState {
    /// Wire every service over one database connection.
    pub fn new(db: Arc<DatabaseConnection>, config: &Config) -> AppResult<Self> {
        let graph: FriendGraph = Arc::new(DbFriendGraph::new(db.clone()));
        Self::with_graph(db, graph, config)
    }

    /// Wire every service over a connection and an explicit friend graph.
    pub fn with_graph(
        db: Arc<DatabaseConnection>,
        graph: FriendGraph,
        config: &Config,
    ) -> AppResult<Self> {
        let limiter = AdmissionLimiter::new(AdmissionConfig::from(&config.admission));
        let retry_config = RetryConfig::from(&config.retry);

        let collection_repo = CollectionRepository::new(db.clone());
        let post_repo = PostRepository::new(db.clone());
        let following_repo = FollowingRepository::new(db.clone());

        let mut notification_service = NotificationService::new(
            NotificationRepository::new(db.clone()),
            graph.clone(),
            limiter.clone(),
        );
        notification_service.set_ttl(TimeDelta::hours(config.sweep.notification_ttl_hours));

        let mut friendship_service = FriendshipService::new(graph.clone());
        friendship_service.set_notifications(notification_service.clone());

        let mut blocking_service = BlockingService::new(graph.clone());
        if let Some(gateway) = HttpBlockGateway::from_config(&config.functions)? {
            info!("Routing blocks through the remote block function");
            blocking_service.set_gateway(Arc::new(gateway));
        }

        let mut discover_service = DiscoverService::new(
            collection_repo.clone(),
            post_repo.clone(),
            following_repo.clone(),
            graph.clone(),
            config.discover.clone(),
        );
        discover_service.set_retry_config(retry_config);

        let mut collection_service =
            CollectionService::new(collection_repo.clone(), post_repo.clone(), graph.clone());
        collection_service.set_notifications(notification_service.clone());
        collection_service.set_retention(TimeDelta::days(config.sweep.collection_retention_days));

        let mut post_service = PostService::new(post_repo, collection_repo);
        post_service.set_notifications(notification_service.clone());

        let mut chat_service = ChatService::new(
            ChatRoomRepository::new(db.clone()),
            MessageRepository::new(db.clone()),
            graph.clone(),
        );
        chat_service.set_notifications(notification_service.clone());

        Ok(Self {
            user_service: UserService::new(UserRepository::new(db.clone()), graph.clone()),
            friendship_service,
            blocking_service,
            following_service: FollowingService::new(following_repo, graph),
            discover_service,
            collection_service,
            post_service,
            chat_service,
            notification_service,
            account_service: AccountService::new(db, limiter),
        })
    }
}

/// Authentication middleware.
///
/// Resolves `Authorization: Bearer <token>` to a user and stores it in the
/// request extensions. Requests without a valid token pass through
/// unauthenticated; [`crate::extractors::AuthUser`] rejects them where needed.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.user_service.authenticate_by_token(token).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(e) => debug!(error = %e, "Bearer token rejected"),
        }
    }

    next.run(req).await
}
