//! Chat message repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Message, message};
use coterie_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, sea_query::Expr,
};

/// Message repository for database operations.
#[derive(Clone)]
pub struct MessageRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    /// Create a new message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a message by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<message::Model>> {
        Message::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find a message by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<message::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::MessageNotFound(id.to_string()))
    }

    /// Create a new message.
    pub async fn create(&self, model: message::ActiveModel) -> AppResult<message::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Update a message.
    pub async fn update(&self, model: message::ActiveModel) -> AppResult<message::Model> {
        model.update(self.db.as_ref()).await.map_err(db_err)
    }

    /// Messages in a room, newest first.
    pub async fn find_by_room(
        &self,
        room_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<message::Model>> {
        let mut query = Message::find()
            .filter(message::Column::RoomId.eq(room_id))
            .order_by_desc(message::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(message::Column::Id.lt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Tombstone every live message `sender_id` sent. Returns rows touched.
    pub async fn tombstone_by_sender(&self, sender_id: &str) -> AppResult<u64> {
        let result = Message::update_many()
            .col_expr(message::Column::IsDeleted, Expr::value(true))
            .col_expr(message::Column::Content, Expr::value(Option::<String>::None))
            .filter(message::Column::SenderId.eq(sender_id))
            .filter(message::Column::IsDeleted.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}
