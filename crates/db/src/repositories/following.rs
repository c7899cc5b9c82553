//! Following repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Following, following};
use coterie_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};

/// Following repository for database operations.
#[derive(Clone)]
pub struct FollowingRepository {
    db: Arc<DatabaseConnection>,
}

impl FollowingRepository {
    /// Create a new following repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a following relationship by follower and followee.
    pub async fn find_by_pair(
        &self,
        follower_id: &str,
        followee_id: &str,
    ) -> AppResult<Option<following::Model>> {
        Following::find()
            .filter(following::Column::FollowerId.eq(follower_id))
            .filter(following::Column::FolloweeId.eq(followee_id))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Check if a user is following another user.
    pub async fn is_following(&self, follower_id: &str, followee_id: &str) -> AppResult<bool> {
        Ok(self.find_by_pair(follower_id, followee_id).await?.is_some())
    }

    /// Create a new following relationship.
    pub async fn create(&self, model: following::ActiveModel) -> AppResult<following::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Delete a following relationship by pair.
    pub async fn delete_by_pair(&self, follower_id: &str, followee_id: &str) -> AppResult<()> {
        Following::delete_many()
            .filter(following::Column::FollowerId.eq(follower_id))
            .filter(following::Column::FolloweeId.eq(followee_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// IDs of users `user_id` follows.
    pub async fn followee_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        Following::find()
            .filter(following::Column::FollowerId.eq(user_id))
            .select_only()
            .column(following::Column::FolloweeId)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Every follow edge whose follower is in `follower_ids`.
    pub async fn find_by_followers(
        &self,
        follower_ids: &[String],
    ) -> AppResult<Vec<following::Model>> {
        if follower_ids.is_empty() {
            return Ok(vec![]);
        }

        Following::find()
            .filter(following::Column::FollowerId.is_in(follower_ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Get users that a user is following (paginated).
    pub async fn find_following(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<following::Model>> {
        let mut query = Following::find()
            .filter(following::Column::FollowerId.eq(user_id))
            .order_by_desc(following::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(following::Column::Id.lt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Count followers of a user.
    pub async fn count_followers(&self, user_id: &str) -> AppResult<u64> {
        Following::find()
            .filter(following::Column::FolloweeId.eq(user_id))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Delete every edge where `user_id` follows or is followed.
    pub async fn delete_all_for_user(&self, user_id: &str) -> AppResult<u64> {
        let result = Following::delete_many()
            .filter(
                Condition::any()
                    .add(following::Column::FollowerId.eq(user_id))
                    .add(following::Column::FolloweeId.eq(user_id)),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}
