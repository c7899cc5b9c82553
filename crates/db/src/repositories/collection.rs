//! Collection repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Collection, collection};
use chrono::{DateTime, FixedOffset};
use coterie_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
    sea_query::{Alias, Expr},
};

/// Collection repository for database operations.
#[derive(Clone)]
pub struct CollectionRepository {
    db: Arc<DatabaseConnection>,
}

impl CollectionRepository {
    /// Create a new collection repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a collection by ID, including soft-deleted ones.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<collection::Model>> {
        Collection::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find a collection by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<collection::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::CollectionNotFound(id.to_string()))
    }

    /// Find collections by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<collection::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Collection::find()
            .filter(collection::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Create a new collection.
    pub async fn create(&self, model: collection::ActiveModel) -> AppResult<collection::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Update a collection.
    pub async fn update(&self, model: collection::ActiveModel) -> AppResult<collection::Model> {
        model.update(self.db.as_ref()).await.map_err(db_err)
    }

    /// Collections created by `owner_id`, ascending by ID after `after_id`.
    ///
    /// Soft-deleted collections are included.
    pub async fn find_by_owner(
        &self,
        owner_id: &str,
        limit: u64,
        after_id: Option<&str>,
    ) -> AppResult<Vec<collection::Model>> {
        let mut query = Collection::find()
            .filter(collection::Column::OwnerId.eq(owner_id))
            .order_by_asc(collection::Column::Id);

        if let Some(id) = after_id {
            query = query.filter(collection::Column::Id.gt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Live collections whose member list contains `user_id`, ascending by ID.
    pub async fn find_with_member(
        &self,
        user_id: &str,
        limit: u64,
        after_id: Option<&str>,
    ) -> AppResult<Vec<collection::Model>> {
        let mut query = Collection::find()
            .filter(collection::Column::DeletedAt.is_null())
            .filter(
                Expr::expr(Expr::col(collection::Column::Members).cast_as(Alias::new("text")))
                    .like(format!("%\"{user_id}\"%")),
            )
            .order_by_asc(collection::Column::Id);

        if let Some(id) = after_id {
            query = query.filter(collection::Column::Id.gt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Most recent live collections, newest first.
    pub async fn find_recent_live(&self, limit: u64) -> AppResult<Vec<collection::Model>> {
        Collection::find()
            .filter(collection::Column::DeletedAt.is_null())
            .order_by_desc(collection::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Soft-deleted collections of `owner_id`, most recently deleted first.
    pub async fn find_trash(&self, owner_id: &str) -> AppResult<Vec<collection::Model>> {
        Collection::find()
            .filter(collection::Column::OwnerId.eq(owner_id))
            .filter(collection::Column::DeletedAt.is_not_null())
            .order_by_desc(collection::Column::DeletedAt)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// IDs of soft-deleted collections whose `deleted_at` is before `cutoff`.
    pub async fn find_expired_ids(&self, cutoff: DateTime<FixedOffset>) -> AppResult<Vec<String>> {
        Collection::find()
            .filter(collection::Column::DeletedAt.is_not_null())
            .filter(collection::Column::DeletedAt.lt(cutoff))
            .select_only()
            .column(collection::Column::Id)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Hard-delete collections by ID.
    pub async fn delete_by_ids(&self, ids: &[String]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = Collection::delete_many()
            .filter(collection::Column::Id.is_in(ids.to_vec()))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}
