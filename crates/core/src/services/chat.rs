//! Chat service.

use std::collections::BTreeSet;

use chrono::Utc;
use coterie_common::{AppError, AppResult, IdGenerator};
use coterie_db::{
    entities::{
        chat_room,
        message::{self, MessageType},
        notification::NotificationKind,
        to_id_list, with_id,
    },
    repositories::{ChatRoomRepository, MessageRepository},
};
use sea_orm::Set;
use serde::Deserialize;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::services::friend_graph::FriendGraph;
use crate::services::notification::NotificationService;

/// How many times a message may be edited.
pub const MAX_EDITS: i32 = 2;

/// Input for sending a message.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput {
    /// Text body, or the media URL for media messages.
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
}

const fn default_message_type() -> MessageType {
    MessageType::Text
}

/// Input for editing a message.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageInput {
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
}

/// Chat service for business logic.
#[derive(Clone)]
pub struct ChatService {
    chat_room_repo: ChatRoomRepository,
    message_repo: MessageRepository,
    graph: FriendGraph,
    notifications: Option<NotificationService>,
    id_gen: IdGenerator,
}

impl ChatService {
    /// Create a new chat service.
    #[must_use]
    pub fn new(
        chat_room_repo: ChatRoomRepository,
        message_repo: MessageRepository,
        graph: FriendGraph,
    ) -> Self {
        Self {
            chat_room_repo,
            message_repo,
            graph,
            notifications: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the notification service.
    pub fn set_notifications(&mut self, notifications: NotificationService) {
        self.notifications = Some(notifications);
    }

    async fn blocked_between(&self, a: &str, b: &str) -> AppResult<bool> {
        Ok(self.graph.is_blocking(a, b).await? || self.graph.is_blocking(b, a).await?)
    }

    /// Open the room for exactly two distinct users, one of them `actor_id`.
    ///
    /// The room ID is derived from the sorted pair, so reopening returns the
    /// same room.
    pub async fn open_room(
        &self,
        actor_id: &str,
        participants: &[String],
    ) -> AppResult<chat_room::Model> {
        let distinct: BTreeSet<&str> = participants.iter().map(String::as_str).collect();
        if distinct.len() != 2 {
            return Err(AppError::InvalidParticipantCount(distinct.len()));
        }
        if !distinct.contains(actor_id) {
            return Err(AppError::Forbidden(
                "You must be a participant of the room".to_string(),
            ));
        }

        for user_id in &distinct {
            if !self.graph.user_exists(user_id).await? {
                return Err(AppError::UserNotFound((*user_id).to_string()));
            }
        }

        let mut ids = distinct.into_iter();
        let (Some(a), Some(b)) = (ids.next(), ids.next()) else {
            return Err(AppError::InvalidParticipantCount(participants.len()));
        };
        if self.blocked_between(a, b).await? {
            return Err(AppError::Blocked);
        }

        let room = self
            .chat_room_repo
            .create_if_missing(a, b, Utc::now().fixed_offset())
            .await?;
        debug!(room_id = %room.id, "Chat room opened");
        Ok(room)
    }

    async fn room_for(&self, user_id: &str, room_id: &str) -> AppResult<chat_room::Model> {
        let room = self
            .chat_room_repo
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Chat room {room_id}")))?;
        if !room.has_participant(user_id) {
            return Err(AppError::Forbidden(
                "Not a participant of this room".to_string(),
            ));
        }
        Ok(room)
    }

    /// Send a message into a room.
    pub async fn send_message(
        &self,
        sender_id: &str,
        room_id: &str,
        input: SendMessageInput,
    ) -> AppResult<message::Model> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        if input.message_type == MessageType::System {
            return Err(AppError::BadRequest(
                "System messages cannot be sent by users".to_string(),
            ));
        }

        let room = self.room_for(sender_id, room_id).await?;
        let recipient_id = room
            .other_participant(sender_id)
            .map(ToString::to_string)
            .ok_or_else(|| AppError::Internal(format!("Room {room_id} has no peer")))?;

        if self.blocked_between(sender_id, &recipient_id).await? {
            return Err(AppError::Blocked);
        }

        let now = Utc::now().fixed_offset();
        let model = message::ActiveModel {
            id: Set(self.id_gen.generate()),
            room_id: Set(room_id.to_string()),
            sender_id: Set(sender_id.to_string()),
            content: Set(Some(input.content)),
            message_type: Set(input.message_type),
            deleted_for: Set(to_id_list(Vec::<String>::new())),
            is_deleted: Set(false),
            edit_count: Set(0),
            created_at: Set(now),
            edited_at: Set(None),
        };

        let created = self.message_repo.create(model).await?;
        self.chat_room_repo.touch(room_id, now).await?;

        if let Some(notifications) = &self.notifications
            && let Err(e) = notifications
                .notify(
                    &recipient_id,
                    Some(sender_id),
                    NotificationKind::Message,
                    Some(room_id),
                )
                .await
        {
            warn!(error = %e, room_id, "Failed to notify message recipient");
        }

        Ok(created)
    }

    /// Edit a message. Only the sender may edit, at most [`MAX_EDITS`] times.
    pub async fn edit_message(
        &self,
        user_id: &str,
        message_id: &str,
        input: EditMessageInput,
    ) -> AppResult<message::Model> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let message = self.message_repo.get_by_id(message_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::Forbidden(
                "Only the sender can edit this message".to_string(),
            ));
        }
        if message.is_deleted {
            return Err(AppError::BadRequest(
                "Deleted messages cannot be edited".to_string(),
            ));
        }
        if message.edit_count >= MAX_EDITS {
            return Err(AppError::EditLimitReached(MAX_EDITS));
        }

        let edit_count = message.edit_count + 1;
        let mut active: message::ActiveModel = message.into();
        active.content = Set(Some(input.content));
        active.edit_count = Set(edit_count);
        active.edited_at = Set(Some(Utc::now().fixed_offset()));
        self.message_repo.update(active).await
    }

    /// Hide a message for `user_id` only.
    pub async fn delete_for_me(&self, user_id: &str, message_id: &str) -> AppResult<()> {
        let message = self.message_repo.get_by_id(message_id).await?;
        self.room_for(user_id, &message.room_id).await?;
        if message.is_hidden_for(user_id) {
            return Ok(());
        }

        let deleted_for = with_id(&message.deleted_for, user_id);
        let mut active: message::ActiveModel = message.into();
        active.deleted_for = Set(deleted_for);
        self.message_repo.update(active).await?;
        Ok(())
    }

    /// Tombstone a message for everyone. Sender only.
    pub async fn delete_message(&self, user_id: &str, message_id: &str) -> AppResult<message::Model> {
        let message = self.message_repo.get_by_id(message_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::Forbidden(
                "Only the sender can delete this message".to_string(),
            ));
        }
        if message.is_deleted {
            return Ok(message);
        }

        let mut active: message::ActiveModel = message.into();
        active.content = Set(None);
        active.is_deleted = Set(true);
        let tombstone = self.message_repo.update(active).await?;

        info!(message_id, user_id, "Message deleted");
        Ok(tombstone)
    }

    /// Messages in a room, newest first, without those the viewer hid.
    ///
    /// Hidden messages do not count against `limit`: further batches are read
    /// until the page is full or the room runs out.
    pub async fn list_messages(
        &self,
        viewer_id: &str,
        room_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<message::Model>> {
        self.room_for(viewer_id, room_id).await?;

        let want = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut page = Vec::new();
        let mut cursor = until_id.map(ToString::to_string);
        loop {
            let batch = self
                .message_repo
                .find_by_room(room_id, limit, cursor.as_deref())
                .await?;
            let exhausted = batch.len() < want;
            cursor = batch.last().map(|m| m.id.clone());

            let room_left = want - page.len();
            page.extend(
                batch
                    .into_iter()
                    .filter(|m| !m.is_hidden_for(viewer_id))
                    .take(room_left),
            );
            if exhausted || page.len() >= want || cursor.is_none() {
                break;
            }
        }
        Ok(page)
    }

    /// Rooms of a user, most recently active first.
    pub async fn rooms_for(&self, user_id: &str, limit: u64) -> AppResult<Vec<chat_room::Model>> {
        self.chat_room_repo.find_for_user(user_id, limit).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::friend_graph::{FriendGraphStore, MemoryFriendGraph};
    use coterie_common::chat_room_id;
    use coterie_db::entities::chat_room::ChatStatus;
    use coterie_db::repositories::RelationWrite;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn room() -> chat_room::Model {
        chat_room::Model {
            id: chat_room_id("alice", "bob"),
            user_a: "alice".to_string(),
            user_b: "bob".to_string(),
            status_a: ChatStatus::Friends,
            status_b: ChatStatus::Friends,
            created_at: Utc::now().fixed_offset(),
            updated_at: None,
            last_message_at: None,
        }
    }

    fn message(id: &str, sender: &str, edit_count: i32) -> message::Model {
        message::Model {
            id: id.to_string(),
            room_id: chat_room_id("alice", "bob"),
            sender_id: sender.to_string(),
            content: Some("hi".to_string()),
            message_type: MessageType::Text,
            deleted_for: to_id_list(Vec::<String>::new()),
            is_deleted: false,
            edit_count,
            created_at: Utc::now().fixed_offset(),
            edited_at: None,
        }
    }

    async fn graph() -> MemoryFriendGraph {
        let graph = MemoryFriendGraph::new();
        graph.add_user("alice").await;
        graph.add_user("bob").await;
        graph
    }

    fn service(db: MockDatabase, graph: MemoryFriendGraph) -> ChatService {
        let conn = Arc::new(db.into_connection());
        ChatService::new(
            ChatRoomRepository::new(conn.clone()),
            MessageRepository::new(conn),
            Arc::new(graph),
        )
    }

    fn exec(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_open_room_needs_two_distinct_participants() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres), graph().await);

        for participants in [
            ids(&["alice"]),
            ids(&["alice", "alice"]),
            ids(&["alice", "bob", "carol"]),
        ] {
            let err = service.open_room("alice", &participants).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidParticipantCount(_)));
        }
    }

    #[tokio::test]
    async fn test_open_room_is_deterministic() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1)])
            .append_query_results([vec![room()]]);
        let service = service(db, graph().await);

        let opened = service
            .open_room("bob", &ids(&["bob", "alice"]))
            .await
            .unwrap();
        assert_eq!(opened.id, chat_room_id("alice", "bob"));
    }

    #[tokio::test]
    async fn test_open_room_outsider_forbidden() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres), graph().await);
        let err = service
            .open_room("carol", &ids(&["alice", "bob"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_open_room_unknown_user() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres), graph().await);
        let err = service
            .open_room("alice", &ids(&["alice", "ghost"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_send_message_blocked() {
        let graph = graph().await;
        graph
            .apply(vec![RelationWrite::AddBlock {
                blocker: "bob".to_string(),
                blockee: "alice".to_string(),
            }])
            .await
            .unwrap();
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![room()]]);
        let service = service(db, graph);

        let err = service
            .send_message(
                "alice",
                &chat_room_id("alice", "bob"),
                SendMessageInput {
                    content: "hi".to_string(),
                    message_type: MessageType::Text,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Blocked));
    }

    #[tokio::test]
    async fn test_send_message_outsider_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![room()]]);
        let service = service(db, graph().await);

        let err = service
            .send_message(
                "carol",
                &chat_room_id("alice", "bob"),
                SendMessageInput {
                    content: "hi".to_string(),
                    message_type: MessageType::Text,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_send_message() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![room()]])
            .append_query_results([vec![message("m1", "alice", 0)]])
            .append_exec_results([exec(1)]);
        let service = service(db, graph().await);

        let sent = service
            .send_message(
                "alice",
                &chat_room_id("alice", "bob"),
                SendMessageInput {
                    content: "hi".to_string(),
                    message_type: MessageType::Text,
                },
            )
            .await
            .unwrap();
        assert_eq!(sent.sender_id, "alice");
    }

    #[tokio::test]
    async fn test_edit_limit() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![message("m1", "alice", MAX_EDITS)]]);
        let service = service(db, graph().await);

        let err = service
            .edit_message(
                "alice",
                "m1",
                EditMessageInput {
                    content: "again".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EditLimitReached(2)));
    }

    #[tokio::test]
    async fn test_edit_increments_count() {
        let mut edited = message("m1", "alice", 2);
        edited.content = Some("fixed".to_string());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![message("m1", "alice", 1)], vec![edited]]);
        let service = service(db, graph().await);

        let result = service
            .edit_message(
                "alice",
                "m1",
                EditMessageInput {
                    content: "fixed".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(result.edit_count, 2);
    }

    #[tokio::test]
    async fn test_tombstone_not_editable() {
        let mut tombstone = message("m1", "alice", 0);
        tombstone.is_deleted = true;
        tombstone.content = None;
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![tombstone]]);
        let service = service(db, graph().await);

        let err = service
            .edit_message(
                "alice",
                "m1",
                EditMessageInput {
                    content: "x".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_only_sender_deletes() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![message("m1", "alice", 0)]]);
        let service = service(db, graph().await);

        assert!(matches!(
            service.delete_message("bob", "m1").await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_list_hides_deleted_for_viewer() {
        let mut hidden = message("m2", "alice", 0);
        hidden.deleted_for = to_id_list(["bob"]);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![room()]])
            .append_query_results([vec![hidden, message("m1", "alice", 0)]]);
        let service = service(db, graph().await);

        let listed = service
            .list_messages("bob", &chat_room_id("alice", "bob"), 20, None)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "m1");
    }

    #[tokio::test]
    async fn test_hidden_message_does_not_shorten_page() {
        let mut hidden = message("m3", "alice", 0);
        hidden.deleted_for = to_id_list(["bob"]);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![room()]])
            .append_query_results([vec![hidden, message("m2", "alice", 0)]])
            .append_query_results([vec![message("m1", "bob", 0)]]);
        let service = service(db, graph().await);

        let listed = service
            .list_messages("bob", &chat_room_id("alice", "bob"), 2, None)
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1"]);
    }
}
