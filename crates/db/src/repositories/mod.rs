//! Database repositories.

mod blocking;
mod chat_room;
mod collection;
mod following;
mod friend_request;
mod friendship;
mod message;
mod notification;
mod post;
mod relation;
mod user;

pub use blocking::BlockingRepository;
pub use chat_room::ChatRoomRepository;
pub use collection::CollectionRepository;
pub use following::FollowingRepository;
pub use friend_request::FriendRequestRepository;
pub use friendship::FriendshipRepository;
pub use message::MessageRepository;
pub use notification::NotificationRepository;
pub use post::PostRepository;
pub use relation::{RelationRepository, RelationWrite};
pub use user::UserRepository;
