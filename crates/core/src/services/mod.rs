//! Business logic services.

#![allow(missing_docs)]

pub mod account;
pub mod blocking;
pub mod chat;
pub mod collection;
pub mod discover;
pub mod following;
pub mod friend_graph;
pub mod friendship;
pub mod media;
pub mod notification;
pub mod post;
pub mod sweep;
pub mod user;

pub use account::{AccountService, DeletionReport, DeletionStep, StepOutcome};
pub use blocking::{BlockGateway, BlockGatewayService, BlockingService, HttpBlockGateway};
pub use chat::{ChatService, EditMessageInput, MAX_EDITS, SendMessageInput};
pub use collection::{AccessList, CollectionService, CreateCollectionInput, OwnedCollections};
pub use discover::{DiscoverService, DiscoverSignals, Ranked, rank_top_k};
pub use following::FollowingService;
pub use friend_graph::{DbFriendGraph, FriendGraph, FriendGraphStore, MemoryFriendGraph};
pub use friendship::{FriendshipService, SendRequestResult};
pub use media::{
    CompressedMedia, MediaPipeline, MediaService, MediaUpload, PhaseReporter, overall_progress,
};
pub use notification::{FanOutReport, NotificationService};
pub use post::{CommentInput, CreatePostInput, PostService};
pub use sweep::ServiceSweeper;
pub use user::{RegisterInput, RegisteredUser, UpdateProfileInput, UserService};
