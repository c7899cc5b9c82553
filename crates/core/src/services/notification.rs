//! Notification service.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use coterie_common::{AppError, AppResult, IdGenerator};
use coterie_db::{
    entities::notification::{self, NotificationKind},
    repositories::NotificationRepository,
};
use coterie_queue::AdmissionLimiter;
use futures::future::join_all;
use sea_orm::Set;
use serde::Serialize;
use tracing::{debug, warn};

use crate::services::friend_graph::FriendGraph;

/// Outcome counts of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    /// Notifications written.
    pub delivered: usize,
    /// Recipients skipped (the actor, or users blocking the actor).
    pub skipped: usize,
    /// Writes that failed.
    pub failed: usize,
}

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
    graph: FriendGraph,
    limiter: AdmissionLimiter,
    ttl: TimeDelta,
    id_gen: IdGenerator,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub fn new(
        notification_repo: NotificationRepository,
        graph: FriendGraph,
        limiter: AdmissionLimiter,
    ) -> Self {
        Self {
            notification_repo,
            graph,
            limiter,
            ttl: TimeDelta::hours(24),
            id_gen: IdGenerator::new(),
        }
    }

    /// Set how long a notification stays visible.
    pub fn set_ttl(&mut self, ttl: TimeDelta) {
        self.ttl = ttl;
    }

    /// Notify one user. Returns `None` when the notification is suppressed.
    pub async fn notify(
        &self,
        notifiee_id: &str,
        notifier_id: Option<&str>,
        kind: NotificationKind,
        entity_id: Option<&str>,
    ) -> AppResult<Option<notification::Model>> {
        if let Some(notifier_id) = notifier_id {
            // Don't notify yourself
            if notifier_id == notifiee_id {
                return Ok(None);
            }
            if self.graph.is_blocking(notifiee_id, notifier_id).await? {
                debug!(notifiee_id, notifier_id, "Notification suppressed by block");
                return Ok(None);
            }
        }

        let model = notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            notifiee_id: Set(notifiee_id.to_string()),
            notifier_id: Set(notifier_id.map(ToString::to_string)),
            kind: Set(kind),
            entity_id: Set(entity_id.map(ToString::to_string)),
            is_read: Set(false),
            created_at: Set(Utc::now().fixed_offset()),
        };

        self.notification_repo.create(model).await.map(Some)
    }

    /// Notify many users through the admission limiter.
    ///
    /// Individual failures are logged and counted, never propagated.
    pub async fn fan_out(
        &self,
        notifier_id: &str,
        recipients: &[String],
        kind: NotificationKind,
        entity_id: Option<&str>,
    ) -> FanOutReport {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = recipients
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .collect();

        let results = join_all(unique.iter().map(|recipient| {
            self.limiter
                .run(|| self.notify(recipient, Some(notifier_id), kind, entity_id))
        }))
        .await;

        let mut report = FanOutReport::default();
        for (recipient, result) in unique.iter().zip(results) {
            match result {
                Ok(Some(_)) => report.delivered += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(recipient = %recipient, error = %e, "Failed to deliver notification");
                    report.failed += 1;
                }
            }
        }

        debug!(
            notifier_id,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Notification fan-out finished"
        );
        report
    }

    /// Live notifications of a user, newest first.
    ///
    /// Expired rows are excluded by the query and left for the sweep.
    pub async fn list(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        self.notification_repo
            .find_by_user(user_id, self.live_since(), limit, until_id, unread_only)
            .await
    }

    fn live_since(&self) -> DateTime<FixedOffset> {
        (Utc::now() - self.ttl).fixed_offset()
    }

    /// Mark one notification as read.
    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        if self
            .notification_repo
            .mark_as_read(user_id, notification_id)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "Notification {notification_id}"
            )))
        }
    }

    /// Mark every notification of a user as read.
    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.mark_all_as_read(user_id).await
    }

    /// Unread count over the same live notifications [`Self::list`] returns.
    pub async fn unread_count(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo
            .count_unread(user_id, self.live_since())
            .await
    }

    /// Delete notifications older than the TTL.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.purge_created_before(now - self.ttl).await
    }

    /// Delete notifications created before `cutoff`.
    pub async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.notification_repo
            .delete_older_than(cutoff.fixed_offset())
            .await
    }
}
