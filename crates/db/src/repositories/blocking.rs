//! Blocking repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Blocking, blocking};
use coterie_common::AppResult;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};

/// Blocking repository for database operations.
#[derive(Clone)]
pub struct BlockingRepository {
    db: Arc<DatabaseConnection>,
}

impl BlockingRepository {
    /// Create a new blocking repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a blocking relationship by blocker and blockee.
    pub async fn find_by_pair(
        &self,
        blocker_id: &str,
        blockee_id: &str,
    ) -> AppResult<Option<blocking::Model>> {
        Blocking::find()
            .filter(blocking::Column::BlockerId.eq(blocker_id))
            .filter(blocking::Column::BlockeeId.eq(blockee_id))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Check if a user is blocking another user.
    pub async fn is_blocking(&self, blocker_id: &str, blockee_id: &str) -> AppResult<bool> {
        Ok(self.find_by_pair(blocker_id, blockee_id).await?.is_some())
    }

    /// Check if either user is blocking the other.
    pub async fn is_blocked_between(&self, user_a: &str, user_b: &str) -> AppResult<bool> {
        Ok(self.is_blocking(user_a, user_b).await? || self.is_blocking(user_b, user_a).await?)
    }

    /// IDs of users `user_id` has blocked.
    pub async fn blocked_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        Blocking::find()
            .filter(blocking::Column::BlockerId.eq(user_id))
            .select_only()
            .column(blocking::Column::BlockeeId)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// IDs of users who have blocked `user_id`.
    pub async fn blocked_by_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        Blocking::find()
            .filter(blocking::Column::BlockeeId.eq(user_id))
            .select_only()
            .column(blocking::Column::BlockerId)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Get users that a user is blocking (paginated).
    pub async fn find_blocking(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<blocking::Model>> {
        let mut query = Blocking::find()
            .filter(blocking::Column::BlockerId.eq(user_id))
            .order_by_desc(blocking::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(blocking::Column::Id.lt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Delete every block where `user_id` is blocker or blockee.
    pub async fn delete_all_for_user(&self, user_id: &str) -> AppResult<u64> {
        let result = Blocking::delete_many()
            .filter(
                Condition::any()
                    .add(blocking::Column::BlockerId.eq(user_id))
                    .add(blocking::Column::BlockeeId.eq(user_id)),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}
