//! Chat room repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{ChatRoom, chat_room, chat_room::ChatStatus};
use chrono::{DateTime, FixedOffset};
use coterie_common::{AppError, AppResult, chat_room_id, sorted_pair};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect, Set,
    sea_query::{NullOrdering, OnConflict},
};

/// Chat room repository for database operations.
#[derive(Clone)]
pub struct ChatRoomRepository {
    db: Arc<DatabaseConnection>,
}

impl ChatRoomRepository {
    /// Create a new chat room repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a room by its ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<chat_room::Model>> {
        ChatRoom::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find the room shared by two users, in either argument order.
    pub async fn find_by_pair(&self, a: &str, b: &str) -> AppResult<Option<chat_room::Model>> {
        self.find_by_id(&chat_room_id(a, b)).await
    }

    /// Rooms `user_id` participates in, most recently active first.
    pub async fn find_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<chat_room::Model>> {
        ChatRoom::find()
            .filter(
                Condition::any()
                    .add(chat_room::Column::UserA.eq(user_id))
                    .add(chat_room::Column::UserB.eq(user_id)),
            )
            .order_by_with_nulls(
                chat_room::Column::LastMessageAt,
                Order::Desc,
                NullOrdering::Last,
            )
            .order_by_desc(chat_room::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Insert the room for a pair unless it already exists, then return it.
    ///
    /// Both sides start at [`ChatStatus::None`].
    pub async fn create_if_missing(
        &self,
        a: &str,
        b: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<chat_room::Model> {
        let (user_a, user_b) = sorted_pair(a, b);
        let id = chat_room_id(a, b);

        let model = chat_room::ActiveModel {
            id: Set(id.clone()),
            user_a: Set(user_a.to_string()),
            user_b: Set(user_b.to_string()),
            status_a: Set(ChatStatus::None),
            status_b: Set(ChatStatus::None),
            created_at: Set(now),
            updated_at: Set(None),
            last_message_at: Set(None),
        };

        ChatRoom::insert(model)
            .on_conflict(
                OnConflict::column(chat_room::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(db_err)?;

        self.find_by_id(&id)
            .await?
            .ok_or(AppError::NotFound(id))
    }

    /// Record message activity on a room.
    pub async fn touch(&self, room_id: &str, at: DateTime<FixedOffset>) -> AppResult<()> {
        ChatRoom::update_many()
            .col_expr(chat_room::Column::LastMessageAt, Some(at).into())
            .filter(chat_room::Column::Id.eq(room_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Delete every room `user_id` participates in. Messages cascade.
    pub async fn delete_all_for_user(&self, user_id: &str) -> AppResult<u64> {
        let result = ChatRoom::delete_many()
            .filter(
                Condition::any()
                    .add(chat_room::Column::UserA.eq(user_id))
                    .add(chat_room::Column::UserB.eq(user_id)),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn room(a: &str, b: &str) -> chat_room::Model {
        chat_room::Model {
            id: chat_room_id(a, b),
            user_a: a.to_string(),
            user_b: b.to_string(),
            status_a: ChatStatus::None,
            status_b: ChatStatus::None,
            created_at: Utc::now().into(),
            updated_at: None,
            last_message_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_if_missing_returns_existing_room() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .append_query_results([vec![room("alice", "bob")]])
                .into_connection(),
        );

        let repo = ChatRoomRepository::new(db);
        let created = repo
            .create_if_missing("bob", "alice", Utc::now().into())
            .await
            .unwrap();

        assert_eq!(created.id, "alice_bob");
        assert_eq!(created.status_a, ChatStatus::None);
    }

    #[tokio::test]
    async fn test_find_by_pair_is_order_independent() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![room("a", "b")], vec![room("a", "b")]])
                .into_connection(),
        );

        let repo = ChatRoomRepository::new(db);
        let one = repo.find_by_pair("a", "b").await.unwrap().unwrap();
        let two = repo.find_by_pair("b", "a").await.unwrap().unwrap();
        assert_eq!(one.id, two.id);
    }
}
