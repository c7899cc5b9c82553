//! Background expiry sweeps.
//!
//! Soft-deleted collections and notifications expire on a fixed schedule
//! rather than when somebody happens to read them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use coterie_common::{AppResult, config::SweepSettings};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::retry::{RetryConfig, retry};

/// Sweep schedule configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// How long a soft-deleted collection is kept.
    pub collection_retention: TimeDelta,
    /// Interval between collection purges.
    pub collection_interval: Duration,
    /// How long a notification lives.
    pub notification_ttl: TimeDelta,
    /// Interval between notification purges.
    pub notification_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            collection_retention: TimeDelta::days(15),
            collection_interval: Duration::from_secs(3600),
            notification_ttl: TimeDelta::hours(24),
            notification_interval: Duration::from_secs(600),
        }
    }
}

impl From<&SweepSettings> for SweepConfig {
    fn from(settings: &SweepSettings) -> Self {
        Self {
            collection_retention: TimeDelta::days(settings.collection_retention_days),
            collection_interval: Duration::from_secs(settings.collection_interval_secs.max(1)),
            notification_ttl: TimeDelta::hours(settings.notification_ttl_hours),
            notification_interval: Duration::from_secs(settings.notification_interval_secs.max(1)),
        }
    }
}

impl SweepConfig {
    /// Collections deleted before this instant are purged.
    #[must_use]
    pub fn collection_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.collection_retention
    }

    /// Notifications created before this instant are purged.
    #[must_use]
    pub fn notification_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.notification_ttl
    }
}

/// Executes the purges a sweep schedules.
#[async_trait::async_trait]
pub trait SweepExecutor: Send + Sync {
    /// Hard-delete collections soft-deleted before `cutoff`. Returns the count.
    async fn purge_deleted_collections(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Delete notifications created before `cutoff`. Returns the count.
    async fn purge_expired_notifications(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Counts from a single sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Collections purged.
    pub collections: u64,
    /// Notifications purged.
    pub notifications: u64,
}

/// Run both purges once, each wrapped in [`retry`].
pub async fn run_sweep_once<E: SweepExecutor + ?Sized>(
    config: &SweepConfig,
    retry_config: &RetryConfig,
    executor: &E,
    now: DateTime<Utc>,
) -> AppResult<SweepReport> {
    let collection_cutoff = config.collection_cutoff(now);
    let collections = retry(retry_config, "purge_deleted_collections", move || {
        executor.purge_deleted_collections(collection_cutoff)
    })
    .await?;

    let notification_cutoff = config.notification_cutoff(now);
    let notifications = retry(retry_config, "purge_expired_notifications", move || {
        executor.purge_expired_notifications(notification_cutoff)
    })
    .await?;

    Ok(SweepReport {
        collections,
        notifications,
    })
}

/// Spawn one interval loop per purge. The handles run until aborted.
pub fn run_scheduler<E: SweepExecutor + 'static>(
    config: SweepConfig,
    retry_config: RetryConfig,
    executor: Arc<E>,
) -> Vec<JoinHandle<()>> {
    let executor_collections = executor.clone();
    let executor_notifications = executor;
    let retry_collections = retry_config.clone();
    let retry_notifications = retry_config;
    let collection_config = config.clone();
    let notification_config = config;

    // Spawn collection purge task
    let collections = tokio::spawn(async move {
        let mut interval = interval(collection_config.collection_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let cutoff = collection_config.collection_cutoff(Utc::now());
            match retry(&retry_collections, "purge_deleted_collections", || {
                executor_collections.purge_deleted_collections(cutoff)
            })
            .await
            {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Purged expired collections");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to purge expired collections");
                }
            }
        }
    });

    // Spawn notification purge task
    let notifications = tokio::spawn(async move {
        let mut interval = interval(notification_config.notification_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let cutoff = notification_config.notification_cutoff(Utc::now());
            match retry(&retry_notifications, "purge_expired_notifications", || {
                executor_notifications.purge_expired_notifications(cutoff)
            })
            .await
            {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Purged expired notifications");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to purge expired notifications");
                }
            }
        }
    });

    vec![collections, notifications]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use coterie_common::{AppError, BackendErrorKind};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingExecutor {
        collection_cutoffs: Mutex<Vec<DateTime<Utc>>>,
        notification_cutoffs: Mutex<Vec<DateTime<Utc>>>,
        transient_failures: AtomicU32,
    }

    #[async_trait::async_trait]
    impl SweepExecutor for RecordingExecutor {
        async fn purge_deleted_collections(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::backend(BackendErrorKind::Unavailable, "down"));
            }
            self.collection_cutoffs.lock().unwrap().push(cutoff);
            Ok(2)
        }

        async fn purge_expired_notifications(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
            self.notification_cutoffs.lock().unwrap().push(cutoff);
            Ok(5)
        }
    }

    #[test]
    fn test_sweep_config_default() {
        let config = SweepConfig::default();
        assert_eq!(config.collection_retention, TimeDelta::days(15));
        assert_eq!(config.notification_ttl, TimeDelta::hours(24));
        assert_eq!(config, SweepConfig::from(&SweepSettings::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweep_once_uses_cutoffs() {
        let executor = RecordingExecutor::default();
        let now = Utc::now();

        let report = run_sweep_once(
            &SweepConfig::default(),
            &RetryConfig::default(),
            &executor,
            now,
        )
        .await
        .unwrap();

        assert_eq!(
            report,
            SweepReport {
                collections: 2,
                notifications: 5
            }
        );
        assert_eq!(
            executor.collection_cutoffs.lock().unwrap()[0],
            now - TimeDelta::days(15)
        );
        assert_eq!(
            executor.notification_cutoffs.lock().unwrap()[0],
            now - TimeDelta::hours(24)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweep_once_retries_transient_failures() {
        let executor = RecordingExecutor::default();
        executor.transient_failures.store(2, Ordering::SeqCst);

        let report = run_sweep_once(
            &SweepConfig::default(),
            &RetryConfig::default(),
            &executor,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(report.collections, 2);
        assert_eq!(executor.collection_cutoffs.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_on_interval() {
        let executor = Arc::new(RecordingExecutor::default());
        let config = SweepConfig {
            collection_interval: Duration::from_secs(60),
            notification_interval: Duration::from_secs(10),
            ..SweepConfig::default()
        };

        let handles = run_scheduler(config, RetryConfig::default(), executor.clone());

        // First ticks fire immediately, then every interval.
        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(executor.collection_cutoffs.lock().unwrap().len(), 1);
        assert_eq!(executor.notification_cutoffs.lock().unwrap().len(), 4);

        for handle in handles {
            handle.abort();
        }
    }
}
