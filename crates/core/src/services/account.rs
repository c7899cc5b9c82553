//! Account deletion.
//!
//! Deleting an account walks every place the user left data. Each step is
//! best-effort: a failure is logged and recorded in the [`DeletionReport`]
//! and the cascade moves on. Every step is idempotent, so a partial run can
//! simply be repeated. Only the final removal of the user row propagates.

use coterie_common::AppResult;
use coterie_db::{
    entities::{collection, without_id},
    repositories::{
        BlockingRepository, ChatRoomRepository, CollectionRepository, FollowingRepository,
        FriendRequestRepository, FriendshipRepository, MessageRepository, NotificationRepository,
        PostRepository, UserRepository,
    },
};
use coterie_queue::AdmissionLimiter;
use sea_orm::{DatabaseConnection, Set};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::pagination::CursorPager;
use crate::services::collection::OwnedCollections;

/// Collections handled per page of the cascade.
const COLLECTION_PAGE_SIZE: u64 = 20;

/// One stage of the deletion cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeletionStep {
    OwnedCollections,
    Memberships,
    Stars,
    Comments,
    Messages,
    Friendships,
    Blocks,
    FriendRequests,
    ChatRooms,
    Follows,
    Notifications,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: DeletionStep,
    /// Rows removed or rewritten.
    pub affected: u64,
    pub error: Option<String>,
}

/// What an account deletion did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub user_id: String,
    pub steps: Vec<StepOutcome>,
}

impl DeletionReport {
    /// Steps that failed.
    #[must_use]
    pub fn failed_steps(&self) -> Vec<DeletionStep> {
        self.steps
            .iter()
            .filter(|s| s.error.is_some())
            .map(|s| s.step)
            .collect()
    }

    /// Whether every step succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.error.is_none())
    }

    /// Rows affected by a step, if it ran.
    #[must_use]
    pub fn affected(&self, step: DeletionStep) -> Option<u64> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.affected)
    }

    fn record(&mut self, step: DeletionStep, result: AppResult<u64>) {
        let outcome = match result {
            Ok(affected) => StepOutcome {
                step,
                affected,
                error: None,
            },
            Err(e) => {
                warn!(user_id = %self.user_id, step = ?step, error = %e, "Account cleanup step failed");
                StepOutcome {
                    step,
                    affected: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        self.steps.push(outcome);
    }
}

/// Account service for deleting users and everything they own.
#[derive(Clone)]
pub struct AccountService {
    user_repo: UserRepository,
    collection_repo: CollectionRepository,
    post_repo: PostRepository,
    message_repo: MessageRepository,
    friendship_repo: FriendshipRepository,
    blocking_repo: BlockingRepository,
    friend_request_repo: FriendRequestRepository,
    chat_room_repo: ChatRoomRepository,
    following_repo: FollowingRepository,
    notification_repo: NotificationRepository,
    limiter: AdmissionLimiter,
}

impl AccountService {
    /// Create a new account service over one connection.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, limiter: AdmissionLimiter) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            collection_repo: CollectionRepository::new(db.clone()),
            post_repo: PostRepository::new(db.clone()),
            message_repo: MessageRepository::new(db.clone()),
            friendship_repo: FriendshipRepository::new(db.clone()),
            blocking_repo: BlockingRepository::new(db.clone()),
            friend_request_repo: FriendRequestRepository::new(db.clone()),
            chat_room_repo: ChatRoomRepository::new(db.clone()),
            following_repo: FollowingRepository::new(db.clone()),
            notification_repo: NotificationRepository::new(db),
            limiter,
        }
    }

    /// Delete an account and cascade over its data.
    pub async fn delete_account(&self, user_id: &str) -> AppResult<DeletionReport> {
        // Fail fast on unknown users
        self.user_repo.get_by_id(user_id).await?;

        let mut report = DeletionReport {
            user_id: user_id.to_string(),
            steps: Vec::new(),
        };

        report.record(
            DeletionStep::OwnedCollections,
            self.delete_owned_collections(user_id).await,
        );
        report.record(
            DeletionStep::Memberships,
            self.leave_collections(user_id).await,
        );
        report.record(
            DeletionStep::Stars,
            self.post_repo.delete_stars_by_user(user_id).await,
        );
        report.record(
            DeletionStep::Comments,
            self.post_repo.delete_comments_by_user(user_id).await,
        );
        report.record(
            DeletionStep::Messages,
            self.message_repo.tombstone_by_sender(user_id).await,
        );
        report.record(
            DeletionStep::Friendships,
            self.friendship_repo.delete_all_for_user(user_id).await,
        );
        report.record(
            DeletionStep::Blocks,
            self.blocking_repo.delete_all_for_user(user_id).await,
        );
        report.record(
            DeletionStep::FriendRequests,
            self.friend_request_repo.delete_all_for_user(user_id).await,
        );
        report.record(
            DeletionStep::ChatRooms,
            self.chat_room_repo.delete_all_for_user(user_id).await,
        );
        report.record(
            DeletionStep::Follows,
            self.following_repo.delete_all_for_user(user_id).await,
        );
        report.record(
            DeletionStep::Notifications,
            self.notification_repo.delete_all_for_user(user_id).await,
        );

        self.user_repo.delete(user_id).await?;

        info!(
            user_id,
            failed = report.failed_steps().len(),
            "Account deleted"
        );
        Ok(report)
    }

    /// Hard-delete every collection the user created, page by page.
    async fn delete_owned_collections(&self, user_id: &str) -> AppResult<u64> {
        let source = OwnedCollections::new(self.collection_repo.clone(), user_id);
        let mut pager = CursorPager::new(source, COLLECTION_PAGE_SIZE);
        let mut deleted = 0;

        while let Some(page) = pager.next_page().await? {
            let ids: Vec<String> = page.into_iter().map(|c| c.id).collect();
            deleted += self
                .limiter
                .run(|| async {
                    self.post_repo.delete_by_collections(&ids).await?;
                    self.collection_repo.delete_by_ids(&ids).await
                })
                .await?;
        }

        Ok(deleted)
    }

    /// Drop the user from every collection they joined or co-own.
    async fn leave_collections(&self, user_id: &str) -> AppResult<u64> {
        let mut after: Option<String> = None;
        let mut left = 0;

        loop {
            let page = self
                .collection_repo
                .find_with_member(user_id, COLLECTION_PAGE_SIZE, after.as_deref())
                .await?;
            let full = page.len() as u64 == COLLECTION_PAGE_SIZE;
            after = page.last().map(|c| c.id.clone());

            for collection in page {
                self.limiter
                    .run(|| self.strip_member(collection, user_id))
                    .await?;
                left += 1;
            }

            if !full {
                break;
            }
        }

        Ok(left)
    }

    async fn strip_member(&self, collection: collection::Model, user_id: &str) -> AppResult<()> {
        let members = without_id(&collection.members, user_id);
        let owners = without_id(&collection.owners, user_id);
        let mut active: collection::ActiveModel = collection.into();
        active.members = Set(members);
        active.owners = Set(owners);
        self.collection_repo.update(active).await?;
        Ok(())
    }
}
