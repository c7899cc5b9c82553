//! Friend graph storage seam.
//!
//! The friendship and blocking services read the graph through
//! [`FriendGraphStore`] and mutate it only by handing over a batch of
//! [`RelationWrite`]s. [`DbFriendGraph`] is the database implementation;
//! [`MemoryFriendGraph`] keeps everything in process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use coterie_common::{AppResult, chat_room_id, friend_request_id};
use coterie_db::{
    entities::{chat_room, chat_room::ChatStatus, friend_request},
    repositories::{
        BlockingRepository, ChatRoomRepository, FriendRequestRepository, FriendshipRepository,
        RelationRepository, RelationWrite, UserRepository,
    },
};
use sea_orm::DatabaseConnection;
use tokio::sync::RwLock;

/// Read access to the friend graph plus atomic batch writes.
#[async_trait]
pub trait FriendGraphStore: Send + Sync {
    /// Whether a user exists.
    async fn user_exists(&self, user_id: &str) -> AppResult<bool>;

    /// The room shared by two users, in either order.
    async fn chat_room(&self, a: &str, b: &str) -> AppResult<Option<chat_room::Model>>;

    /// The request `from -> to`, whatever its status.
    async fn friend_request(
        &self,
        from: &str,
        to: &str,
    ) -> AppResult<Option<friend_request::Model>>;

    /// Whether `blocker` blocks `blockee`.
    async fn is_blocking(&self, blocker: &str, blockee: &str) -> AppResult<bool>;

    /// Friend IDs of a user.
    async fn friend_ids(&self, user_id: &str) -> AppResult<Vec<String>>;

    /// Users this user blocks.
    async fn blocked_ids(&self, user_id: &str) -> AppResult<Vec<String>>;

    /// Users blocking this user.
    async fn blocked_by_ids(&self, user_id: &str) -> AppResult<Vec<String>>;

    /// Pending requests addressed to a user, newest first.
    async fn pending_requests_to(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<friend_request::Model>>;

    /// Rooms a user participates in.
    async fn chat_rooms_for(&self, user_id: &str, limit: u64) -> AppResult<Vec<chat_room::Model>>;

    /// Apply every write or none of them.
    async fn apply(&self, writes: Vec<RelationWrite>) -> AppResult<()>;
}

/// Shared friend graph handle.
pub type FriendGraph = Arc<dyn FriendGraphStore>;

/// Friend graph backed by the database repositories.
#[derive(Clone)]
pub struct DbFriendGraph {
    user_repo: UserRepository,
    friendship_repo: FriendshipRepository,
    blocking_repo: BlockingRepository,
    friend_request_repo: FriendRequestRepository,
    chat_room_repo: ChatRoomRepository,
    relation_repo: RelationRepository,
}

impl DbFriendGraph {
    /// Build every repository over one connection.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            friendship_repo: FriendshipRepository::new(db.clone()),
            blocking_repo: BlockingRepository::new(db.clone()),
            friend_request_repo: FriendRequestRepository::new(db.clone()),
            chat_room_repo: ChatRoomRepository::new(db.clone()),
            relation_repo: RelationRepository::new(db),
        }
    }
}

#[async_trait]
impl FriendGraphStore for DbFriendGraph {
    async fn user_exists(&self, user_id: &str) -> AppResult<bool> {
        self.user_repo.exists(user_id).await
    }

    async fn chat_room(&self, a: &str, b: &str) -> AppResult<Option<chat_room::Model>> {
        self.chat_room_repo.find_by_pair(a, b).await
    }

    async fn friend_request(
        &self,
        from: &str,
        to: &str,
    ) -> AppResult<Option<friend_request::Model>> {
        self.friend_request_repo.find_by_pair(from, to).await
    }

    async fn is_blocking(&self, blocker: &str, blockee: &str) -> AppResult<bool> {
        self.blocking_repo.is_blocking(blocker, blockee).await
    }

    async fn friend_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.friendship_repo.friend_ids(user_id).await
    }

    async fn blocked_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.blocking_repo.blocked_ids(user_id).await
    }

    async fn blocked_by_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.blocking_repo.blocked_by_ids(user_id).await
    }

    async fn pending_requests_to(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<friend_request::Model>> {
        self.friend_request_repo.find_pending_to(user_id, limit).await
    }

    async fn chat_rooms_for(&self, user_id: &str, limit: u64) -> AppResult<Vec<chat_room::Model>> {
        self.chat_room_repo.find_for_user(user_id, limit).await
    }

    async fn apply(&self, writes: Vec<RelationWrite>) -> AppResult<()> {
        self.relation_repo.apply(&writes).await
    }
}

#[derive(Default)]
struct GraphState {
    users: HashSet<String>,
    friendships: HashSet<(String, String)>,
    blocks: HashSet<(String, String)>,
    rooms: HashMap<String, chat_room::Model>,
    requests: HashMap<String, friend_request::Model>,
}

impl GraphState {
    fn apply_one(&mut self, write: RelationWrite) {
        let now = Utc::now().fixed_offset();
        match write {
            RelationWrite::AddFriendPair { a, b } => {
                self.friendships.insert((a.clone(), b.clone()));
                self.friendships.insert((b, a));
            }
            RelationWrite::RemoveFriendPair { a, b } => {
                self.friendships.remove(&(a.clone(), b.clone()));
                self.friendships.remove(&(b, a));
            }
            RelationWrite::PutChatRoom {
                user_a,
                user_b,
                status_a,
                status_b,
            } => {
                let id = chat_room_id(&user_a, &user_b);
                self.rooms
                    .entry(id.clone())
                    .and_modify(|room| {
                        room.status_a = status_a;
                        room.status_b = status_b;
                        room.updated_at = Some(now);
                    })
                    .or_insert_with(|| chat_room::Model {
                        id,
                        user_a,
                        user_b,
                        status_a,
                        status_b,
                        created_at: now,
                        updated_at: Some(now),
                        last_message_at: None,
                    });
            }
            RelationWrite::UpsertFriendRequest { from, to, status } => {
                let id = friend_request_id(&from, &to);
                self.requests
                    .entry(id.clone())
                    .and_modify(|request| {
                        request.status = status;
                        request.updated_at = Some(now);
                    })
                    .or_insert_with(|| friend_request::Model {
                        id,
                        from_id: from,
                        to_id: to,
                        status,
                        created_at: now,
                        updated_at: Some(now),
                    });
            }
            RelationWrite::DeleteFriendRequest { from, to } => {
                self.requests.remove(&friend_request_id(&from, &to));
            }
            RelationWrite::AddBlock { blocker, blockee } => {
                self.blocks.insert((blocker, blockee));
            }
            RelationWrite::RemoveBlock { blocker, blockee } => {
                self.blocks.remove(&(blocker, blockee));
            }
        }
    }
}

/// In-process friend graph.
#[derive(Clone, Default)]
pub struct MemoryFriendGraph {
    state: Arc<RwLock<GraphState>>,
}

impl MemoryFriendGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user.
    pub async fn add_user(&self, user_id: &str) {
        self.state.write().await.users.insert(user_id.to_string());
    }

    /// Room statuses of a pair as `(status of a, status of b)`.
    pub async fn statuses(&self, a: &str, b: &str) -> Option<(ChatStatus, ChatStatus)> {
        let state = self.state.read().await;
        let room = state.rooms.get(&chat_room_id(a, b))?;
        Some((room.status_of(a)?, room.status_of(b)?))
    }
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

#[async_trait]
impl FriendGraphStore for MemoryFriendGraph {
    async fn user_exists(&self, user_id: &str) -> AppResult<bool> {
        Ok(self.state.read().await.users.contains(user_id))
    }

    async fn chat_room(&self, a: &str, b: &str) -> AppResult<Option<chat_room::Model>> {
        Ok(self.state.read().await.rooms.get(&chat_room_id(a, b)).cloned())
    }

    async fn friend_request(
        &self,
        from: &str,
        to: &str,
    ) -> AppResult<Option<friend_request::Model>> {
        Ok(self
            .state
            .read()
            .await
            .requests
            .get(&friend_request_id(from, to))
            .cloned())
    }

    async fn is_blocking(&self, blocker: &str, blockee: &str) -> AppResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .blocks
            .contains(&(blocker.to_string(), blockee.to_string())))
    }

    async fn friend_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(sorted(
            state
                .friendships
                .iter()
                .filter(|(user, _)| user == user_id)
                .map(|(_, friend)| friend.clone())
                .collect(),
        ))
    }

    async fn blocked_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(sorted(
            state
                .blocks
                .iter()
                .filter(|(blocker, _)| blocker == user_id)
                .map(|(_, blockee)| blockee.clone())
                .collect(),
        ))
    }

    async fn blocked_by_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(sorted(
            state
                .blocks
                .iter()
                .filter(|(_, blockee)| blockee == user_id)
                .map(|(blocker, _)| blocker.clone())
                .collect(),
        ))
    }

    async fn pending_requests_to(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<friend_request::Model>> {
        let state = self.state.read().await;
        let mut requests: Vec<_> = state
            .requests
            .values()
            .filter(|r| r.to_id == user_id && r.is_pending())
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests.truncate(limit as usize);
        Ok(requests)
    }

    async fn chat_rooms_for(&self, user_id: &str, limit: u64) -> AppResult<Vec<chat_room::Model>> {
        let state = self.state.read().await;
        let mut rooms: Vec<_> = state
            .rooms
            .values()
            .filter(|room| room.has_participant(user_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        rooms.truncate(limit as usize);
        Ok(rooms)
    }

    async fn apply(&self, writes: Vec<RelationWrite>) -> AppResult<()> {
        let mut state = self.state.write().await;
        for write in writes {
            state.apply_one(write);
        }
        Ok(())
    }
}
