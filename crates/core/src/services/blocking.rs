//! Blocking service.
//!
//! Block and unblock go through a remote function first. When that call
//! fails the same effect is written directly as a relation batch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coterie_common::{AppError, AppResult, BackendErrorKind, config::FunctionsConfig};
use coterie_db::repositories::RelationWrite;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{info, warn};

use crate::relation;
use crate::services::friend_graph::FriendGraph;

/// Remote block/unblock function.
#[async_trait]
pub trait BlockGateway: Send + Sync {
    /// Ask the backend to block `blockee_id` on behalf of `blocker_id`.
    async fn block(&self, blocker_id: &str, blockee_id: &str) -> AppResult<()>;

    /// Ask the backend to lift the block.
    async fn unblock(&self, blocker_id: &str, blockee_id: &str) -> AppResult<()>;
}

/// Shared block gateway handle.
pub type BlockGatewayService = Arc<dyn BlockGateway>;

/// [`BlockGateway`] calling HTTP functions at `{base_url}/blockUser` and
/// `{base_url}/unblockUser`.
#[derive(Clone)]
pub struct HttpBlockGateway {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBlockGateway {
    /// Create a gateway for `base_url`.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a gateway from configuration, if a base URL is set.
    pub fn from_config(config: &FunctionsConfig) -> AppResult<Option<Self>> {
        let Some(base_url) = &config.base_url else {
            return Ok(None);
        };
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(10));
        Self::new(base_url, config.token.clone(), timeout).map(Some)
    }

    async fn call(&self, function: &str, blocker_id: &str, blockee_id: &str) -> AppResult<()> {
        let mut request = self
            .http_client
            .post(format!("{}/{function}", self.base_url))
            .json(&json!({
                "blockerId": blocker_id,
                "blockeeId": blockee_id,
            }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AppError::backend(
                status_kind(status),
                format!("{function} returned {status}: {body}"),
            ))
        }
    }
}

fn transport_error(err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() {
        BackendErrorKind::DeadlineExceeded
    } else if err.is_connect() || err.is_request() {
        BackendErrorKind::Network
    } else {
        BackendErrorKind::Internal
    };
    AppError::backend(kind, err.to_string())
}

fn status_kind(status: StatusCode) -> BackendErrorKind {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            BackendErrorKind::DeadlineExceeded
        }
        StatusCode::TOO_MANY_REQUESTS => BackendErrorKind::ResourceExhausted,
        StatusCode::NOT_FOUND => BackendErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendErrorKind::PermissionDenied,
        StatusCode::CONFLICT => BackendErrorKind::Aborted,
        s if s.is_server_error() => BackendErrorKind::Unavailable,
        s if s.is_client_error() => BackendErrorKind::InvalidArgument,
        _ => BackendErrorKind::Internal,
    }
}

#[async_trait]
impl BlockGateway for HttpBlockGateway {
    async fn block(&self, blocker_id: &str, blockee_id: &str) -> AppResult<()> {
        self.call("blockUser", blocker_id, blockee_id).await
    }

    async fn unblock(&self, blocker_id: &str, blockee_id: &str) -> AppResult<()> {
        self.call("unblockUser", blocker_id, blockee_id).await
    }
}

/// Blocking service for business logic.
#[derive(Clone)]
pub struct BlockingService {
    graph: FriendGraph,
    gateway: Option<BlockGatewayService>,
}

impl BlockingService {
    /// Create a new blocking service.
    #[must_use]
    pub const fn new(graph: FriendGraph) -> Self {
        Self {
            graph,
            gateway: None,
        }
    }

    /// Set the remote block gateway.
    pub fn set_gateway(&mut self, gateway: BlockGatewayService) {
        self.gateway = Some(gateway);
    }

    /// Block a user.
    pub async fn block(&self, blocker_id: &str, blockee_id: &str) -> AppResult<()> {
        // Cannot block yourself
        if blocker_id == blockee_id {
            return Err(AppError::BadRequest("Cannot block yourself".to_string()));
        }
        if !self.graph.user_exists(blockee_id).await? {
            return Err(AppError::UserNotFound(blockee_id.to_string()));
        }
        if self.graph.is_blocking(blocker_id, blockee_id).await? {
            return Err(AppError::Conflict("Already blocking this user".to_string()));
        }

        if let Some(gateway) = &self.gateway {
            match gateway.block(blocker_id, blockee_id).await {
                Ok(()) => {
                    info!(blocker_id, blockee_id, "User blocked via gateway");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, blocker_id, blockee_id, "Block gateway failed, writing directly");
                }
            }
        }

        let pair = relation::after_block();
        self.graph
            .apply(vec![
                RelationWrite::AddBlock {
                    blocker: blocker_id.to_string(),
                    blockee: blockee_id.to_string(),
                },
                RelationWrite::RemoveFriendPair {
                    a: blocker_id.to_string(),
                    b: blockee_id.to_string(),
                },
                RelationWrite::DeleteFriendRequest {
                    from: blocker_id.to_string(),
                    to: blockee_id.to_string(),
                },
                RelationWrite::DeleteFriendRequest {
                    from: blockee_id.to_string(),
                    to: blocker_id.to_string(),
                },
                RelationWrite::chat_room(blocker_id, blockee_id, pair.mine, pair.theirs),
            ])
            .await?;

        info!(blocker_id, blockee_id, "User blocked");
        Ok(())
    }

    /// Unblock a user.
    pub async fn unblock(&self, blocker_id: &str, blockee_id: &str) -> AppResult<()> {
        if !self.graph.is_blocking(blocker_id, blockee_id).await? {
            return Err(AppError::NotFound("Not blocking this user".to_string()));
        }

        if let Some(gateway) = &self.gateway {
            match gateway.unblock(blocker_id, blockee_id).await {
                Ok(()) => {
                    info!(blocker_id, blockee_id, "User unblocked via gateway");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, blocker_id, blockee_id, "Unblock gateway failed, writing directly");
                }
            }
        }

        let reverse = self.graph.is_blocking(blockee_id, blocker_id).await?;
        let pair = relation::after_unblock(reverse);
        self.graph
            .apply(vec![
                RelationWrite::RemoveBlock {
                    blocker: blocker_id.to_string(),
                    blockee: blockee_id.to_string(),
                },
                RelationWrite::chat_room(blocker_id, blockee_id, pair.mine, pair.theirs),
            ])
            .await?;

        info!(blocker_id, blockee_id, "User unblocked");
        Ok(())
    }

    /// Whether `blocker_id` blocks `blockee_id`.
    pub async fn is_blocking(&self, blocker_id: &str, blockee_id: &str) -> AppResult<bool> {
        self.graph.is_blocking(blocker_id, blockee_id).await
    }

    /// Whether either user blocks the other.
    pub async fn is_blocked_between(&self, a: &str, b: &str) -> AppResult<bool> {
        Ok(self.graph.is_blocking(a, b).await? || self.graph.is_blocking(b, a).await?)
    }

    /// Users `user_id` blocks.
    pub async fn blocked_users(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.graph.blocked_ids(user_id).await
    }

    /// Users blocking `user_id`.
    pub async fn blocked_by_users(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.graph.blocked_by_ids(user_id).await
    }

    /// Everyone hidden from `viewer_id`: blocks in both directions.
    pub async fn hidden_from(&self, viewer_id: &str) -> AppResult<HashSet<String>> {
        let mut hidden: HashSet<String> = self.blocked_users(viewer_id).await?.into_iter().collect();
        hidden.extend(self.blocked_by_users(viewer_id).await?);
        Ok(hidden)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::friend_graph::{FriendGraphStore, MemoryFriendGraph};
    use crate::services::friendship::FriendshipService;
    use coterie_db::entities::chat_room::ChatStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingGateway {
        calls: AtomicU32,
    }

    #[async_trait]
    impl BlockGateway for FailingGateway {
        async fn block(&self, _: &str, _: &str) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::backend(BackendErrorKind::Unavailable, "down"))
        }

        async fn unblock(&self, _: &str, _: &str) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::backend(BackendErrorKind::Network, "reset"))
        }
    }

    async fn setup() -> (BlockingService, FriendshipService, MemoryFriendGraph) {
        let graph = MemoryFriendGraph::new();
        for user in ["a", "b", "c"] {
            graph.add_user(user).await;
        }
        let shared: FriendGraph = Arc::new(graph.clone());
        (
            BlockingService::new(shared.clone()),
            FriendshipService::new(shared),
            graph,
        )
    }

    #[tokio::test]
    async fn test_block_is_symmetric_for_visibility() {
        let (blocking, friendship, graph) = setup().await;
        friendship.send_request("a", "b").await.unwrap();
        friendship.accept_request("b", "a").await.unwrap();

        blocking.block("a", "b").await.unwrap();

        assert!(blocking.is_blocking("a", "b").await.unwrap());
        assert!(!blocking.is_blocking("b", "a").await.unwrap());
        assert!(blocking.is_blocked_between("a", "b").await.unwrap());
        assert!(blocking.is_blocked_between("b", "a").await.unwrap());
        assert!(blocking.hidden_from("a").await.unwrap().contains("b"));
        assert!(blocking.hidden_from("b").await.unwrap().contains("a"));

        assert!(graph.friend_ids("a").await.unwrap().is_empty());
        assert!(graph.friend_ids("b").await.unwrap().is_empty());
        assert!(graph.friend_request("a", "b").await.unwrap().is_none());
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::Blocked, ChatStatus::Blocked))
        );
        assert!(matches!(
            friendship.send_request("b", "a").await,
            Err(AppError::Blocked)
        ));
    }

    #[tokio::test]
    async fn test_block_validation() {
        let (blocking, _, _) = setup().await;
        assert!(matches!(
            blocking.block("a", "a").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            blocking.block("a", "ghost").await,
            Err(AppError::UserNotFound(_))
        ));
        blocking.block("a", "b").await.unwrap();
        assert!(matches!(
            blocking.block("a", "b").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            blocking.unblock("a", "c").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unblock_respects_reverse_block() {
        let (blocking, _, graph) = setup().await;
        blocking.block("a", "b").await.unwrap();
        blocking.block("b", "a").await.unwrap();

        blocking.unblock("a", "b").await.unwrap();
        assert!(blocking.is_blocked_between("a", "b").await.unwrap());
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::Blocked, ChatStatus::Blocked))
        );

        blocking.unblock("b", "a").await.unwrap();
        assert!(!blocking.is_blocked_between("a", "b").await.unwrap());
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::Unadded, ChatStatus::Unadded))
        );
    }

    #[tokio::test]
    async fn test_gateway_failure_falls_back_to_direct_write() {
        let (mut blocking, _, _) = setup().await;
        let gateway = Arc::new(FailingGateway {
            calls: AtomicU32::new(0),
        });
        blocking.set_gateway(gateway.clone());

        blocking.block("a", "c").await.unwrap();
        assert!(blocking.is_blocking("a", "c").await.unwrap());

        blocking.unblock("a", "c").await.unwrap();
        assert!(!blocking.is_blocking("a", "c").await.unwrap());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            status_kind(StatusCode::SERVICE_UNAVAILABLE),
            BackendErrorKind::Unavailable
        );
        assert_eq!(
            status_kind(StatusCode::GATEWAY_TIMEOUT),
            BackendErrorKind::DeadlineExceeded
        );
        assert_eq!(
            status_kind(StatusCode::TOO_MANY_REQUESTS),
            BackendErrorKind::ResourceExhausted
        );
        assert_eq!(
            status_kind(StatusCode::BAD_REQUEST),
            BackendErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_gateway_from_config() {
        assert!(
            HttpBlockGateway::from_config(&FunctionsConfig::default())
                .unwrap()
                .is_none()
        );
        let config = FunctionsConfig {
            base_url: Some("https://functions.example/".to_string()),
            token: None,
            timeout_secs: Some(5),
        };
        let gateway = HttpBlockGateway::from_config(&config).unwrap().unwrap();
        assert_eq!(gateway.base_url, "https://functions.example");
    }
}
