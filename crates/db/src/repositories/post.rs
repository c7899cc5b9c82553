//! Post repository, including stars and comments.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Post, PostComment, PostStar, post, post_comment, post_star};
use coterie_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, sea_query::Expr,
};

/// Post repository for database operations.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a post by ID. Tombstones are returned too.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find a post by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<post::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(id.to_string()))
    }

    /// Create a new post.
    pub async fn create(&self, model: post::ActiveModel) -> AppResult<post::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Update a post.
    pub async fn update(&self, model: post::ActiveModel) -> AppResult<post::Model> {
        model.update(self.db.as_ref()).await.map_err(db_err)
    }

    /// Posts in a collection, newest first. Tombstones keep their slot.
    pub async fn find_by_collection(
        &self,
        collection_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<post::Model>> {
        let mut query = Post::find()
            .filter(post::Column::CollectionId.eq(collection_id))
            .order_by_desc(post::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(post::Column::Id.lt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Recent live posts across a set of collections, newest first.
    pub async fn find_recent_in_collections(
        &self,
        collection_ids: &[String],
        limit: u64,
    ) -> AppResult<Vec<post::Model>> {
        if collection_ids.is_empty() {
            return Ok(vec![]);
        }

        Post::find()
            .filter(post::Column::CollectionId.is_in(collection_ids.to_vec()))
            .filter(post::Column::IsDeleted.eq(false))
            .order_by_desc(post::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Hard-delete every post of the given collections.
    pub async fn delete_by_collections(&self, collection_ids: &[String]) -> AppResult<u64> {
        if collection_ids.is_empty() {
            return Ok(0);
        }

        let result = Post::delete_many()
            .filter(post::Column::CollectionId.is_in(collection_ids.to_vec()))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    /// Increment the star counter atomically.
    pub async fn increment_star_count(&self, post_id: &str) -> AppResult<()> {
        Post::update_many()
            .col_expr(post::Column::StarCount, Expr::col(post::Column::StarCount).add(1))
            .filter(post::Column::Id.eq(post_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Decrement the star counter atomically, never going below zero.
    pub async fn decrement_star_count(&self, post_id: &str) -> AppResult<()> {
        Post::update_many()
            .col_expr(post::Column::StarCount, Expr::cust("GREATEST(star_count - 1, 0)"))
            .filter(post::Column::Id.eq(post_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Increment the comment counter atomically.
    pub async fn increment_comment_count(&self, post_id: &str) -> AppResult<()> {
        Post::update_many()
            .col_expr(
                post::Column::CommentCount,
                Expr::col(post::Column::CommentCount).add(1),
            )
            .filter(post::Column::Id.eq(post_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ==================== Stars ====================

    /// Find the star `user_id` gave `post_id`.
    pub async fn find_star(&self, post_id: &str, user_id: &str) -> AppResult<Option<post_star::Model>> {
        PostStar::find()
            .filter(post_star::Column::PostId.eq(post_id))
            .filter(post_star::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Record a star.
    pub async fn create_star(&self, model: post_star::ActiveModel) -> AppResult<post_star::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Remove a star. Returns whether a row was deleted.
    pub async fn delete_star(&self, post_id: &str, user_id: &str) -> AppResult<bool> {
        let result = PostStar::delete_many()
            .filter(post_star::Column::PostId.eq(post_id))
            .filter(post_star::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    /// Stars on any of `post_ids`.
    pub async fn find_stars_for_posts(
        &self,
        post_ids: &[String],
    ) -> AppResult<Vec<post_star::Model>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        PostStar::find()
            .filter(post_star::Column::PostId.is_in(post_ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Delete every star `user_id` gave.
    pub async fn delete_stars_by_user(&self, user_id: &str) -> AppResult<u64> {
        let result = PostStar::delete_many()
            .filter(post_star::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    // ==================== Comments ====================

    /// Record a comment.
    pub async fn create_comment(
        &self,
        model: post_comment::ActiveModel,
    ) -> AppResult<post_comment::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Comments on a post, oldest first.
    pub async fn find_comments(
        &self,
        post_id: &str,
        limit: u64,
        after_id: Option<&str>,
    ) -> AppResult<Vec<post_comment::Model>> {
        let mut query = PostComment::find()
            .filter(post_comment::Column::PostId.eq(post_id))
            .order_by_asc(post_comment::Column::Id);

        if let Some(id) = after_id {
            query = query.filter(post_comment::Column::Id.gt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Delete every comment `user_id` wrote.
    pub async fn delete_comments_by_user(&self, user_id: &str) -> AppResult<u64> {
        let result = PostComment::delete_many()
            .filter(post_comment::Column::AuthorId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }
}
