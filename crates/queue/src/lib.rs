//! Background execution helpers for coterie.
//!
//! - **Retry**: exponential backoff for transient backend failures
//! - **Rate limiting**: FIFO admission for bulk writes
//! - **Scheduler**: periodic expiry sweeps

pub mod rate_limit;
pub mod retry;
pub mod scheduler;

pub use rate_limit::{AdmissionConfig, AdmissionLimiter, AdmissionPermit};
pub use retry::{RetryConfig, retry};
pub use scheduler::{SweepConfig, SweepExecutor, SweepReport, run_scheduler, run_sweep_once};
