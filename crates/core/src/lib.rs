//! Core business logic for coterie.
//!
//! - [`relation`]: the per-pair chat status state machine
//! - [`pagination`]: forward-only cursor paging over ordered queries
//! - [`services`]: friendship, blocking, discover, collections, posts, chat,
//!   notifications, users, accounts and media upload fan-out

pub mod pagination;
pub mod relation;
pub mod services;

pub use pagination::{CursorPager, PageSource};
pub use relation::{ChatStatus, PairStatus, SendPlan};
pub use services::*;
