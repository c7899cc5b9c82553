//! Notification repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Notification, notification};
use chrono::{DateTime, FixedOffset};
use coterie_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DeleteResult, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, UpdateResult,
};

/// Notification repository for database operations.
#[derive(Clone)]
pub struct NotificationRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationRepository {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new notification.
    pub async fn create(&self, model: notification::ActiveModel) -> AppResult<notification::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Get notifications for a user created at or after `since` (paginated).
    pub async fn find_by_user(
        &self,
        user_id: &str,
        since: DateTime<FixedOffset>,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        let mut query = Notification::find()
            .filter(notification::Column::NotifieeId.eq(user_id))
            .filter(notification::Column::CreatedAt.gte(since))
            .order_by_desc(notification::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(notification::Column::Id.lt(id));
        }

        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Mark one of `user_id`'s notifications as read. Returns whether it existed.
    pub async fn mark_as_read(&self, user_id: &str, id: &str) -> AppResult<bool> {
        let result: UpdateResult = Notification::update_many()
            .filter(notification::Column::Id.eq(id))
            .filter(notification::Column::NotifieeId.eq(user_id))
            .col_expr(notification::Column::IsRead, true.into())
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected > 0)
    }

    /// Mark all notifications as read for a user.
    pub async fn mark_all_as_read(&self, user_id: &str) -> AppResult<u64> {
        let result: UpdateResult = Notification::update_many()
            .filter(notification::Column::NotifieeId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .col_expr(notification::Column::IsRead, true.into())
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    /// Count unread notifications for a user created at or after `since`.
    pub async fn count_unread(&self, user_id: &str, since: DateTime<FixedOffset>) -> AppResult<u64> {
        Notification::find()
            .filter(notification::Column::NotifieeId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .filter(notification::Column::CreatedAt.gte(since))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Delete all notifications for a user.
    pub async fn delete_all_for_user(&self, user_id: &str) -> AppResult<u64> {
        let result: DeleteResult = Notification::delete_many()
            .filter(notification::Column::NotifieeId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    /// Delete every notification created before `cutoff`.
    pub async fn delete_older_than(&self, cutoff: DateTime<FixedOffset>) -> AppResult<u64> {
        let result: DeleteResult = Notification::delete_many()
            .filter(notification::Column::CreatedAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::notification::NotificationKind;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::collections::BTreeMap;

    fn create_test_notification(id: &str, is_read: bool) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            notifiee_id: "bob".to_string(),
            notifier_id: Some("alice".to_string()),
            kind: NotificationKind::FriendRequest,
            entity_id: Some("alice_bob".to_string()),
            is_read,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_user() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![
                    create_test_notification("n2", false),
                    create_test_notification("n1", true),
                ]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let since = (Utc::now() - chrono::TimeDelta::hours(24)).into();
        let list = repo
            .find_by_user("bob", since, 10, None, false)
            .await
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].kind, NotificationKind::FriendRequest);
    }

    #[tokio::test]
    async fn test_count_unread() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[BTreeMap::from([(
                    "num_items",
                    sea_orm::Value::BigInt(Some(4)),
                )])]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        assert_eq!(repo.count_unread("bob", Utc::now().into()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_mark_as_read_missing() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        assert!(!repo.mark_as_read("bob", "n9").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 3,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let purged = repo.delete_older_than(Utc::now().into()).await.unwrap();
        assert_eq!(purged, 3);
    }
}
