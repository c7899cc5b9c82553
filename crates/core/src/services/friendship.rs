//! Friendship service.
//!
//! Every mutation reads the pair's current state, asks [`crate::relation`]
//! for the next one and writes friend rows, room statuses and request
//! lifecycle as one batch. Failures propagate; this flow is not retried.

use std::collections::HashSet;

use coterie_common::{AppError, AppResult};
use coterie_db::{
    entities::{
        chat_room::ChatStatus,
        friend_request::{self, FriendRequestStatus},
        notification::NotificationKind,
    },
    repositories::RelationWrite,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::relation::{self, PairStatus, SendPlan};
use crate::services::friend_graph::FriendGraph;
use crate::services::notification::NotificationService;

/// What sending a friend request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SendRequestResult {
    /// A plain pending request was created.
    Requested,
    /// The sender is re-adding someone who removed them.
    ReAdding,
    /// Both sides wanted it; they are friends now.
    Friends,
}

/// Friendship service for business logic.
#[derive(Clone)]
pub struct FriendshipService {
    graph: FriendGraph,
    notifications: Option<NotificationService>,
}

impl FriendshipService {
    /// Create a new friendship service.
    #[must_use]
    pub const fn new(graph: FriendGraph) -> Self {
        Self {
            graph,
            notifications: None,
        }
    }

    /// Set the notification service.
    pub fn set_notifications(&mut self, notifications: NotificationService) {
        self.notifications = Some(notifications);
    }

    /// Current statuses of a pair from `viewer_id`'s side.
    pub async fn relation(&self, viewer_id: &str, other_id: &str) -> AppResult<PairStatus> {
        let room = self.graph.chat_room(viewer_id, other_id).await?;
        Ok(room
            .and_then(|room| room.statuses_for(viewer_id))
            .map_or(PairStatus::NONE, |(mine, theirs)| {
                PairStatus::new(mine, theirs)
            }))
    }

    async fn pending_request(
        &self,
        from: &str,
        to: &str,
    ) -> AppResult<Option<friend_request::Model>> {
        Ok(self
            .graph
            .friend_request(from, to)
            .await?
            .filter(friend_request::Model::is_pending))
    }

    async fn ensure_pair(&self, a: &str, b: &str) -> AppResult<()> {
        if a == b {
            return Err(AppError::BadRequest(
                "Cannot befriend yourself".to_string(),
            ));
        }
        for id in [a, b] {
            if !self.graph.user_exists(id).await? {
                return Err(AppError::UserNotFound(id.to_string()));
            }
        }
        Ok(())
    }

    async fn ensure_not_blocked(&self, a: &str, b: &str) -> AppResult<()> {
        if self.graph.is_blocking(a, b).await? || self.graph.is_blocking(b, a).await? {
            return Err(AppError::Blocked);
        }
        Ok(())
    }

    /// Send a friend request.
    pub async fn send_request(&self, from_id: &str, to_id: &str) -> AppResult<SendRequestResult> {
        self.ensure_pair(from_id, to_id).await?;
        self.ensure_not_blocked(from_id, to_id).await?;

        let pair = self.relation(from_id, to_id).await?;
        let outgoing = self.pending_request(from_id, to_id).await?;
        let reverse = self.pending_request(to_id, from_id).await?;

        match relation::plan_send_request(pair, outgoing.is_some(), reverse.is_some())? {
            SendPlan::Converge => {
                let mut writes = vec![
                    RelationWrite::DeleteFriendRequest {
                        from: from_id.to_string(),
                        to: to_id.to_string(),
                    },
                    RelationWrite::AddFriendPair {
                        a: from_id.to_string(),
                        b: to_id.to_string(),
                    },
                    chat_room_write(from_id, to_id, relation::after_accept(pair)),
                ];
                if reverse.is_some() {
                    writes.push(RelationWrite::UpsertFriendRequest {
                        from: to_id.to_string(),
                        to: from_id.to_string(),
                        status: FriendRequestStatus::Accepted,
                    });
                } else {
                    writes.push(RelationWrite::DeleteFriendRequest {
                        from: to_id.to_string(),
                        to: from_id.to_string(),
                    });
                }
                self.graph.apply(writes).await?;

                info!(from_id, to_id, "Friend request converged");
                self.notify(to_id, from_id, NotificationKind::FriendAccepted)
                    .await;
                Ok(SendRequestResult::Friends)
            }
            SendPlan::ReAdd(next) | SendPlan::Plain(next) => {
                let readding = next.mine == ChatStatus::PendingAdd;
                self.graph
                    .apply(vec![
                        RelationWrite::UpsertFriendRequest {
                            from: from_id.to_string(),
                            to: to_id.to_string(),
                            status: FriendRequestStatus::Pending,
                        },
                        chat_room_write(from_id, to_id, next),
                    ])
                    .await?;

                info!(from_id, to_id, readding, "Friend request sent");
                self.notify(to_id, from_id, NotificationKind::FriendRequest)
                    .await;
                Ok(if readding {
                    SendRequestResult::ReAdding
                } else {
                    SendRequestResult::Requested
                })
            }
        }
    }

    /// Accept the pending request `requester_id -> acceptor_id`.
    pub async fn accept_request(&self, acceptor_id: &str, requester_id: &str) -> AppResult<()> {
        if self.pending_request(requester_id, acceptor_id).await?.is_none() {
            return Err(AppError::NotFound("Friend request".to_string()));
        }
        self.ensure_not_blocked(acceptor_id, requester_id).await?;

        let pair = self.relation(acceptor_id, requester_id).await?;
        self.graph
            .apply(vec![
                RelationWrite::AddFriendPair {
                    a: acceptor_id.to_string(),
                    b: requester_id.to_string(),
                },
                chat_room_write(acceptor_id, requester_id, relation::after_accept(pair)),
                RelationWrite::UpsertFriendRequest {
                    from: requester_id.to_string(),
                    to: acceptor_id.to_string(),
                    status: FriendRequestStatus::Accepted,
                },
                RelationWrite::DeleteFriendRequest {
                    from: acceptor_id.to_string(),
                    to: requester_id.to_string(),
                },
            ])
            .await?;

        info!(acceptor_id, requester_id, "Friend request accepted");
        self.notify(requester_id, acceptor_id, NotificationKind::FriendAccepted)
            .await;
        Ok(())
    }

    /// Deny the pending request `requester_id -> denier_id`.
    pub async fn deny_request(&self, denier_id: &str, requester_id: &str) -> AppResult<()> {
        if self.pending_request(requester_id, denier_id).await?.is_none() {
            return Err(AppError::NotFound("Friend request".to_string()));
        }

        let pair = self.relation(denier_id, requester_id).await?;
        let next = relation::after_deny(pair);

        let mut writes = vec![RelationWrite::UpsertFriendRequest {
            from: requester_id.to_string(),
            to: denier_id.to_string(),
            status: FriendRequestStatus::Denied,
        }];
        if next != pair {
            writes.push(chat_room_write(denier_id, requester_id, next));
        }
        self.graph.apply(writes).await?;

        info!(denier_id, requester_id, "Friend request denied");
        Ok(())
    }

    /// Withdraw the sender's pending request.
    pub async fn cancel_request(&self, from_id: &str, to_id: &str) -> AppResult<()> {
        if self.pending_request(from_id, to_id).await?.is_none() {
            return Err(AppError::NotFound("Friend request".to_string()));
        }

        let pair = self.relation(from_id, to_id).await?;
        let next = relation::after_cancel(pair);

        let mut writes = vec![RelationWrite::DeleteFriendRequest {
            from: from_id.to_string(),
            to: to_id.to_string(),
        }];
        if next != pair {
            writes.push(chat_room_write(from_id, to_id, next));
        }
        self.graph.apply(writes).await?;

        info!(from_id, to_id, "Friend request cancelled");
        Ok(())
    }

    /// Remove a friend.
    pub async fn remove_friend(&self, remover_id: &str, removed_id: &str) -> AppResult<PairStatus> {
        let pair = self.relation(remover_id, removed_id).await?;
        let next = relation::plan_remove(pair)?;

        self.graph
            .apply(vec![
                RelationWrite::RemoveFriendPair {
                    a: remover_id.to_string(),
                    b: removed_id.to_string(),
                },
                chat_room_write(remover_id, removed_id, next),
                RelationWrite::DeleteFriendRequest {
                    from: remover_id.to_string(),
                    to: removed_id.to_string(),
                },
                RelationWrite::DeleteFriendRequest {
                    from: removed_id.to_string(),
                    to: remover_id.to_string(),
                },
            ])
            .await?;

        info!(remover_id, removed_id, status = ?next.mine, "Friend removed");
        Ok(next)
    }

    /// Undo a one-way removal without a new request.
    pub async fn restore_friend(&self, restorer_id: &str, other_id: &str) -> AppResult<()> {
        let pair = self.relation(restorer_id, other_id).await?;
        let next = relation::plan_restore(pair)?;

        self.graph
            .apply(vec![
                RelationWrite::AddFriendPair {
                    a: restorer_id.to_string(),
                    b: other_id.to_string(),
                },
                chat_room_write(restorer_id, other_id, next),
                RelationWrite::DeleteFriendRequest {
                    from: restorer_id.to_string(),
                    to: other_id.to_string(),
                },
                RelationWrite::DeleteFriendRequest {
                    from: other_id.to_string(),
                    to: restorer_id.to_string(),
                },
            ])
            .await?;

        info!(restorer_id, other_id, "Friendship restored");
        Ok(())
    }

    /// Whether exactly one side of the pair has removed the other.
    pub async fn is_one_way_unadd(&self, viewer_id: &str, other_id: &str) -> AppResult<bool> {
        Ok(relation::is_one_way_unadd(
            self.relation(viewer_id, other_id).await?,
        ))
    }

    /// Whether `viewer_id` may restore the friendship directly.
    pub async fn can_restore_directly(&self, viewer_id: &str, other_id: &str) -> AppResult<bool> {
        Ok(relation::can_restore_directly(
            self.relation(viewer_id, other_id).await?,
        ))
    }

    async fn hidden_from(&self, user_id: &str) -> AppResult<HashSet<String>> {
        let mut hidden: HashSet<String> =
            self.graph.blocked_ids(user_id).await?.into_iter().collect();
        hidden.extend(self.graph.blocked_by_ids(user_id).await?);
        Ok(hidden)
    }

    /// Friend IDs of a user, without blocked users in either direction.
    pub async fn friends(&self, user_id: &str) -> AppResult<Vec<String>> {
        let hidden = self.hidden_from(user_id).await?;
        Ok(self
            .graph
            .friend_ids(user_id)
            .await?
            .into_iter()
            .filter(|id| !hidden.contains(id))
            .collect())
    }

    /// Pending requests addressed to a user.
    pub async fn pending_requests(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<friend_request::Model>> {
        let hidden = self.hidden_from(user_id).await?;
        Ok(self
            .graph
            .pending_requests_to(user_id, limit)
            .await?
            .into_iter()
            .filter(|r| !hidden.contains(&r.from_id))
            .collect())
    }

    /// Users `viewer_id` may be offered in the general add-user list.
    ///
    /// Drops the viewer, friends, blocked users in either direction and
    /// one-way removals, which are re-added from the message screen instead.
    pub async fn add_user_candidates(
        &self,
        viewer_id: &str,
        user_ids: &[String],
    ) -> AppResult<Vec<String>> {
        let hidden = self.hidden_from(viewer_id).await?;
        let friends: HashSet<String> = self.graph.friend_ids(viewer_id).await?.into_iter().collect();

        let mut candidates = Vec::new();
        for id in user_ids {
            if id == viewer_id || hidden.contains(id) || friends.contains(id) {
                continue;
            }
            if relation::is_one_way_unadd(self.relation(viewer_id, id).await?) {
                continue;
            }
            candidates.push(id.clone());
        }
        Ok(candidates)
    }

    async fn notify(&self, notifiee_id: &str, notifier_id: &str, kind: NotificationKind) {
        let Some(notifications) = &self.notifications else {
            return;
        };
        if let Err(e) = notifications
            .notify(notifiee_id, Some(notifier_id), kind, None)
            .await
        {
            warn!(error = %e, notifiee_id, "Failed to send friendship notification");
        }
    }
}

fn chat_room_write(viewer_id: &str, other_id: &str, pair: PairStatus) -> RelationWrite {
    RelationWrite::chat_room(viewer_id, other_id, pair.mine, pair.theirs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::friend_graph::{FriendGraphStore, MemoryFriendGraph};
    use std::sync::Arc;

    async fn setup(users: &[&str]) -> (FriendshipService, MemoryFriendGraph) {
        let graph = MemoryFriendGraph::new();
        for user in users {
            graph.add_user(user).await;
        }
        (FriendshipService::new(Arc::new(graph.clone())), graph)
    }

    async fn befriend(service: &FriendshipService, a: &str, b: &str) {
        service.send_request(a, b).await.unwrap();
        service.accept_request(b, a).await.unwrap();
    }

    #[tokio::test]
    async fn test_request_then_accept() {
        let (service, graph) = setup(&["alice", "bob"]).await;

        let sent = service.send_request("bob", "alice").await.unwrap();
        assert_eq!(sent, SendRequestResult::Requested);
        assert_eq!(
            graph.statuses("bob", "alice").await,
            Some((ChatStatus::Pending, ChatStatus::Pending))
        );

        service.accept_request("alice", "bob").await.unwrap();

        assert_eq!(service.friends("alice").await.unwrap(), vec!["bob"]);
        assert_eq!(service.friends("bob").await.unwrap(), vec!["alice"]);
        let room = graph.chat_room("bob", "alice").await.unwrap().unwrap();
        assert_eq!(room.id, "alice_bob");
        assert_eq!(room.status_a, ChatStatus::Friends);
        assert_eq!(room.status_b, ChatStatus::Friends);
        assert_eq!(
            graph.friend_request("bob", "alice").await.unwrap().unwrap().status,
            FriendRequestStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_send_validation() {
        let (service, graph) = setup(&["a", "b"]).await;

        assert!(matches!(
            service.send_request("a", "a").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            service.send_request("a", "ghost").await,
            Err(AppError::UserNotFound(_))
        ));

        service.send_request("a", "b").await.unwrap();
        assert!(matches!(
            service.send_request("a", "b").await,
            Err(AppError::AlreadyExists(_))
        ));

        graph
            .apply(vec![RelationWrite::AddBlock {
                blocker: "b".to_string(),
                blockee: "a".to_string(),
            }])
            .await
            .unwrap();
        assert!(matches!(
            service.send_request("a", "b").await,
            Err(AppError::Blocked)
        ));
    }

    #[tokio::test]
    async fn test_crossed_requests_converge() {
        let (service, graph) = setup(&["a", "b"]).await;

        service.send_request("a", "b").await.unwrap();
        let result = service.send_request("b", "a").await.unwrap();

        assert_eq!(result, SendRequestResult::Friends);
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::Friends, ChatStatus::Friends))
        );
        assert!(graph.pending_requests_to("a", 10).await.unwrap().is_empty());
        assert!(graph.pending_requests_to("b", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deny_keeps_friend_lists() {
        let (service, graph) = setup(&["a", "b"]).await;

        service.send_request("a", "b").await.unwrap();
        service.deny_request("b", "a").await.unwrap();

        assert!(service.friends("a").await.unwrap().is_empty());
        assert_eq!(
            graph.friend_request("a", "b").await.unwrap().unwrap().status,
            FriendRequestStatus::Denied
        );
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::Unadded, ChatStatus::Unadded))
        );
        assert!(matches!(
            service.accept_request("b", "a").await,
            Err(AppError::NotFound(_))
        ));

        // A denied request can be sent again.
        assert_eq!(
            service.send_request("a", "b").await.unwrap(),
            SendRequestResult::Requested
        );
    }

    #[tokio::test]
    async fn test_cancel_request() {
        let (service, graph) = setup(&["a", "b"]).await;

        service.send_request("a", "b").await.unwrap();
        service.cancel_request("a", "b").await.unwrap();

        assert!(graph.friend_request("a", "b").await.unwrap().is_none());
        assert!(matches!(
            service.cancel_request("a", "b").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_one_way_remove_and_restore() {
        let (service, graph) = setup(&["a", "b"]).await;
        befriend(&service, "a", "b").await;

        let removed = service.remove_friend("a", "b").await.unwrap();
        assert_eq!(
            removed,
            PairStatus::new(ChatStatus::IUnadded, ChatStatus::TheyUnadded)
        );
        assert!(service.friends("a").await.unwrap().is_empty());
        assert!(service.is_one_way_unadd("a", "b").await.unwrap());
        assert!(service.is_one_way_unadd("b", "a").await.unwrap());
        assert!(service.can_restore_directly("a", "b").await.unwrap());
        assert!(!service.can_restore_directly("b", "a").await.unwrap());

        // A stale request between the pair is cleaned up by the restore.
        graph
            .apply(vec![RelationWrite::UpsertFriendRequest {
                from: "b".to_string(),
                to: "a".to_string(),
                status: FriendRequestStatus::Pending,
            }])
            .await
            .unwrap();

        service.restore_friend("a", "b").await.unwrap();
        assert_eq!(service.friends("a").await.unwrap(), vec!["b"]);
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::Friends, ChatStatus::Friends))
        );
        assert!(graph.friend_request("b", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_request_after_remove_keeps_restore() {
        let (service, graph) = setup(&["a", "b"]).await;
        befriend(&service, "a", "b").await;
        service.remove_friend("a", "b").await.unwrap();

        assert_eq!(
            service.send_request("a", "b").await.unwrap(),
            SendRequestResult::Requested
        );
        service.cancel_request("a", "b").await.unwrap();

        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::IUnadded, ChatStatus::TheyUnadded))
        );
        assert!(service.is_one_way_unadd("b", "a").await.unwrap());
        assert!(service.can_restore_directly("a", "b").await.unwrap());

        service.restore_friend("a", "b").await.unwrap();
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::Friends, ChatStatus::Friends))
        );
    }

    #[tokio::test]
    async fn test_denied_request_after_remove_keeps_restore() {
        let (service, graph) = setup(&["a", "b"]).await;
        befriend(&service, "a", "b").await;
        service.remove_friend("a", "b").await.unwrap();

        service.send_request("a", "b").await.unwrap();
        service.deny_request("b", "a").await.unwrap();

        assert_eq!(
            graph.statuses("b", "a").await,
            Some((ChatStatus::TheyUnadded, ChatStatus::IUnadded))
        );
        service.restore_friend("a", "b").await.unwrap();
        assert_eq!(service.friends("b").await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_both_sides_remove_then_both_readd() {
        let (service, graph) = setup(&["a", "b"]).await;
        befriend(&service, "a", "b").await;

        service.remove_friend("a", "b").await.unwrap();
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::IUnadded, ChatStatus::TheyUnadded))
        );

        service.remove_friend("b", "a").await.unwrap();
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::BothUnadded, ChatStatus::BothUnadded))
        );
        assert!(matches!(
            service.restore_friend("a", "b").await,
            Err(AppError::BadRequest(_))
        ));

        let result = service.send_request("a", "b").await.unwrap();
        assert_eq!(result, SendRequestResult::ReAdding);
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::PendingAdd, ChatStatus::BothUnadded))
        );
        assert!(service.friends("a").await.unwrap().is_empty());

        let result = service.send_request("b", "a").await.unwrap();
        assert_eq!(result, SendRequestResult::Friends);
        assert_eq!(
            graph.statuses("a", "b").await,
            Some((ChatStatus::Friends, ChatStatus::Friends))
        );
        assert_eq!(service.friends("b").await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_remove_twice_conflicts() {
        let (service, _) = setup(&["a", "b"]).await;
        befriend(&service, "a", "b").await;

        service.remove_friend("a", "b").await.unwrap();
        assert!(matches!(
            service.remove_friend("a", "b").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_add_user_candidates() {
        let (service, graph) = setup(&["me", "friend", "gone", "blocker", "stranger"]).await;
        befriend(&service, "me", "friend").await;
        befriend(&service, "me", "gone").await;
        service.remove_friend("gone", "me").await.unwrap();
        graph
            .apply(vec![RelationWrite::AddBlock {
                blocker: "blocker".to_string(),
                blockee: "me".to_string(),
            }])
            .await
            .unwrap();

        let users: Vec<String> = ["me", "friend", "gone", "blocker", "stranger"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let candidates = service.add_user_candidates("me", &users).await.unwrap();
        assert_eq!(candidates, vec!["stranger"]);
    }
}
