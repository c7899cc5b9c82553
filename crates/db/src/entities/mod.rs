//! Database entities.

#![allow(missing_docs)]

pub mod blocking;
pub mod chat_room;
pub mod collection;
pub mod following;
pub mod friend_request;
pub mod friendship;
pub mod message;
pub mod notification;
pub mod post;
pub mod post_comment;
pub mod post_star;
pub mod user;

pub use blocking::Entity as Blocking;
pub use chat_room::Entity as ChatRoom;
pub use collection::Entity as Collection;
pub use following::Entity as Following;
pub use friend_request::Entity as FriendRequest;
pub use friendship::Entity as Friendship;
pub use message::Entity as Message;
pub use notification::Entity as Notification;
pub use post::Entity as Post;
pub use post_comment::Entity as PostComment;
pub use post_star::Entity as PostStar;
pub use user::Entity as User;

use sea_orm::entity::prelude::Json;

/// Decode a JSON array of user IDs. Non-string entries are ignored.
#[must_use]
pub fn id_list(value: &Json) -> Vec<String> {
    match value {
        Json::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Encode user IDs as a JSON array.
pub fn to_id_list<I, S>(ids: I) -> Json
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Json::Array(ids.into_iter().map(|id| Json::String(id.into())).collect())
}

/// Return `list` with `id` appended if absent.
#[must_use]
pub fn with_id(list: &Json, id: &str) -> Json {
    let mut ids = id_list(list);
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
    to_id_list(ids)
}

/// Return `list` with every occurrence of `id` removed.
#[must_use]
pub fn without_id(list: &Json, id: &str) -> Json {
    to_id_list(id_list(list).into_iter().filter(|existing| existing != id))
}
