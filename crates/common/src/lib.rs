//! Common utilities and shared types for coterie.
//!
//! This crate provides foundational components used across all coterie crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`],
//!   with structured backend failure kinds via [`BackendErrorKind`]
//! - **ID Generation**: ULID-based identifiers via [`IdGenerator`], plus the
//!   deterministic pair keys used for chat rooms and friend requests
//!
//! # Example
//!
//! ```no_run
//! use coterie_common::{chat_room_id, Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     println!("{} on {}", id_gen.generate(), config.server.url);
//!     assert_eq!(chat_room_id("bob", "alice"), "alice_bob");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::Config;
pub use error::{AppError, AppResult, BackendErrorKind};
pub use id::{IdGenerator, chat_room_id, friend_request_id, sorted_pair};
