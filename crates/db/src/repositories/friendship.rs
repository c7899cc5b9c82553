//! Friendship repository.
//!
//! Friendships are stored as one row per direction. Writes that touch both
//! rows go through [`super::RelationRepository`] so they land atomically.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Friendship, friendship};
use coterie_common::AppResult;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};

/// Friendship repository for database operations.
#[derive(Clone)]
pub struct FriendshipRepository {
    db: Arc<DatabaseConnection>,
}

impl FriendshipRepository {
    /// Create a new friendship repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// IDs of everyone `user_id` is friends with.
    pub async fn friend_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        Friendship::find()
            .filter(friendship::Column::UserId.eq(user_id))
            .select_only()
            .column(friendship::Column::FriendId)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Check whether `user_id` lists `friend_id` as a friend.
    pub async fn are_friends(&self, user_id: &str, friend_id: &str) -> AppResult<bool> {
        let row = Friendship::find()
            .filter(friendship::Column::UserId.eq(user_id))
            .filter(friendship::Column::FriendId.eq(friend_id))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    /// Friendship rows owned by `user_id` (paginated).
    pub async fn find_by_user(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<friendship::Model>> {
        let mut query = Friendship::find()
            .filter(friendship::Column::UserId.eq(user_id))
            .order_by_desc(friendship::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(friendship::Column::Id.lt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Delete every friendship row that mentions `user_id` on either side.
    pub async fn delete_all_for_user(&self, user_id: &str) -> AppResult<u64> {
        let result = Friendship::delete_many()
            .filter(
                Condition::any()
                    .add(friendship::Column::UserId.eq(user_id))
                    .add(friendship::Column::FriendId.eq(user_id)),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}
