//! Following service.
//!
//! Follows are one-way and carry no chat status; Discover reads them as a
//! feed signal.

use chrono::Utc;
use coterie_common::{AppError, AppResult, IdGenerator};
use coterie_db::{entities::following, repositories::FollowingRepository};
use sea_orm::Set;
use tracing::info;

use crate::services::friend_graph::FriendGraph;

/// Following service for business logic.
#[derive(Clone)]
pub struct FollowingService {
    following_repo: FollowingRepository,
    graph: FriendGraph,
    id_gen: IdGenerator,
}

impl FollowingService {
    /// Create a new following service.
    #[must_use]
    pub fn new(following_repo: FollowingRepository, graph: FriendGraph) -> Self {
        Self {
            following_repo,
            graph,
            id_gen: IdGenerator::new(),
        }
    }

    /// Follow a user.
    pub async fn follow(&self, follower_id: &str, followee_id: &str) -> AppResult<following::Model> {
        // Cannot follow yourself
        if follower_id == followee_id {
            return Err(AppError::BadRequest("Cannot follow yourself".to_string()));
        }

        if !self.graph.user_exists(followee_id).await? {
            return Err(AppError::UserNotFound(followee_id.to_string()));
        }

        if self.graph.is_blocking(followee_id, follower_id).await?
            || self.graph.is_blocking(follower_id, followee_id).await?
        {
            return Err(AppError::Blocked);
        }

        if self
            .following_repo
            .is_following(follower_id, followee_id)
            .await?
        {
            return Err(AppError::AlreadyExists("Already following".to_string()));
        }

        let model = following::ActiveModel {
            id: Set(self.id_gen.generate()),
            follower_id: Set(follower_id.to_string()),
            followee_id: Set(followee_id.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let created = self.following_repo.create(model).await?;
        info!(follower_id, followee_id, "Followed user");
        Ok(created)
    }

    /// Unfollow a user.
    pub async fn unfollow(&self, follower_id: &str, followee_id: &str) -> AppResult<()> {
        if !self
            .following_repo
            .is_following(follower_id, followee_id)
            .await?
        {
            return Err(AppError::NotFound("Not following".to_string()));
        }

        self.following_repo
            .delete_by_pair(follower_id, followee_id)
            .await
    }

    /// Users `user_id` follows, newest first.
    pub async fn following(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<following::Model>> {
        self.following_repo
            .find_following(user_id, limit, until_id)
            .await
    }

    /// Number of followers of a user.
    pub async fn follower_count(&self, user_id: &str) -> AppResult<u64> {
        self.following_repo.count_followers(user_id).await
    }
}
