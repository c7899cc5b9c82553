//! Expiry sweep wiring.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coterie_common::AppResult;
use coterie_queue::SweepExecutor;

use crate::services::collection::CollectionService;
use crate::services::notification::NotificationService;

/// Runs expiry sweeps against the collection and notification services.
#[derive(Clone)]
pub struct ServiceSweeper {
    collections: CollectionService,
    notifications: NotificationService,
}

impl ServiceSweeper {
    /// Create a new sweeper.
    #[must_use]
    pub const fn new(collections: CollectionService, notifications: NotificationService) -> Self {
        Self {
            collections,
            notifications,
        }
    }
}

#[async_trait]
impl SweepExecutor for ServiceSweeper {
    async fn purge_deleted_collections(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.collections.purge_trashed_before(cutoff).await
    }

    async fn purge_expired_notifications(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.notifications.purge_created_before(cutoff).await
    }
}
