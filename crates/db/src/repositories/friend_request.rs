//! Friend request repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{FriendRequest, friend_request, friend_request::FriendRequestStatus};
use coterie_common::{AppResult, friend_request_id};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};

/// Friend request repository for database operations.
#[derive(Clone)]
pub struct FriendRequestRepository {
    db: Arc<DatabaseConnection>,
}

impl FriendRequestRepository {
    /// Create a new friend request repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the request `from_id` sent to `to_id`, whatever its status.
    pub async fn find_by_pair(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> AppResult<Option<friend_request::Model>> {
        FriendRequest::find_by_id(friend_request_id(from_id, to_id))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Pending requests addressed to `user_id`, newest first.
    pub async fn find_pending_to(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<friend_request::Model>> {
        FriendRequest::find()
            .filter(friend_request::Column::ToId.eq(user_id))
            .filter(friend_request::Column::Status.eq(FriendRequestStatus::Pending))
            .order_by_desc(friend_request::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Delete every request sent by or to `user_id`.
    pub async fn delete_all_for_user(&self, user_id: &str) -> AppResult<u64> {
        let result = FriendRequest::delete_many()
            .filter(
                Condition::any()
                    .add(friend_request::Column::FromId.eq(user_id))
                    .add(friend_request::Column::ToId.eq(user_id)),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}
