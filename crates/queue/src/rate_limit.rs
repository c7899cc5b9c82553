//! Admission limiter for bulk backend writes.
//!
//! Two limits apply together: a rolling window caps how many operations may
//! start per period, and a semaphore caps how many run at once. Waiters are
//! admitted in arrival order. Both tokio primitives used here are fair, and
//! the waiter holding the window lock sleeps until the oldest admission ages
//! out instead of polling.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use coterie_common::{AppError, AppResult, config::AdmissionSettings};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Admission limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Operations admitted per rolling window.
    pub max_per_window: usize,
    /// Window length.
    pub window: Duration,
    /// Operations allowed in flight at once.
    pub max_concurrent: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_per_window: 30,
            window: Duration::from_secs(60),
            max_concurrent: 5,
        }
    }
}

impl From<&AdmissionSettings> for AdmissionConfig {
    fn from(settings: &AdmissionSettings) -> Self {
        Self {
            max_per_window: settings.max_per_window,
            window: Duration::from_secs(settings.window_secs),
            max_concurrent: settings.max_concurrent,
        }
    }
}

/// Proof of admission. The concurrency slot is released on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _slot: OwnedSemaphorePermit,
}

/// FIFO admission limiter.
#[derive(Clone)]
pub struct AdmissionLimiter {
    max_per_window: usize,
    window: Duration,
    admitted: Arc<Mutex<VecDeque<Instant>>>,
    slots: Arc<Semaphore>,
}

impl AdmissionLimiter {
    /// Create a limiter. Zero limits are raised to one.
    #[must_use]
    pub fn new(config: AdmissionConfig) -> Self {
        let max_per_window = config.max_per_window.max(1);
        Self {
            max_per_window,
            window: config.window,
            admitted: Arc::new(Mutex::new(VecDeque::with_capacity(max_per_window))),
            slots: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    /// Wait until both a window slot and a concurrency slot are free.
    pub async fn acquire(&self) -> AppResult<AdmissionPermit> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let mut admitted = self.admitted.lock().await;
        loop {
            let now = Instant::now();
            self.expire(&mut admitted, now);
            if admitted.len() < self.max_per_window {
                admitted.push_back(now);
                break;
            }

            let Some(&oldest) = admitted.front() else {
                continue;
            };
            tokio::time::sleep_until(oldest + self.window).await;
        }

        Ok(AdmissionPermit { _slot: slot })
    }

    /// Admit immediately or fail with [`AppError::RateLimited`].
    pub fn try_acquire(&self) -> AppResult<AdmissionPermit> {
        let slot = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| AppError::RateLimited)?;

        // A held lock means someone is already queued for a window slot.
        let mut admitted = self.admitted.try_lock().map_err(|_| AppError::RateLimited)?;
        let now = Instant::now();
        self.expire(&mut admitted, now);
        if admitted.len() >= self.max_per_window {
            return Err(AppError::RateLimited);
        }
        admitted.push_back(now);

        Ok(AdmissionPermit { _slot: slot })
    }

    /// Run `op` once admitted, holding the permit for its whole duration.
    pub async fn run<T, F, Fut>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let _permit = self.acquire().await?;
        op().await
    }

    /// Concurrency slots currently free.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    fn expire(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for AdmissionLimiter {
    fn default() -> Self {
        Self::new(AdmissionConfig::default())
    }
}
