//! Chat room entity.
//!
//! A room is keyed by the sorted participant pair (`uid1_uid2`) and carries the
//! relationship status as seen from each side independently.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Relationship status as seen by one participant of a room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "camelCase")]
pub enum ChatStatus {
    /// No relationship recorded.
    #[sea_orm(string_value = "none")]
    None,
    /// Mutual friends.
    #[sea_orm(string_value = "friends")]
    Friends,
    /// A plain friend request is outstanding between the pair.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// I removed them; they have not removed me.
    #[sea_orm(string_value = "iUnadded")]
    IUnadded,
    /// They removed me; I have not removed them.
    #[sea_orm(string_value = "theyUnadded")]
    TheyUnadded,
    /// Both sides removed each other.
    #[sea_orm(string_value = "bothUnadded")]
    BothUnadded,
    /// I am re-adding someone who removed me.
    #[sea_orm(string_value = "pendingAdd")]
    PendingAdd,
    /// A block exists between the pair.
    #[sea_orm(string_value = "blocked")]
    Blocked,
    /// Not friends, no un-add history worth tracking.
    #[sea_orm(string_value = "unadded")]
    Unadded,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_room")]
pub struct Model {
    /// `{user_a}_{user_b}`
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Lexicographically smaller participant
    pub user_a: String,

    /// Lexicographically larger participant
    pub user_b: String,

    /// Status as seen by `user_a`
    pub status_a: ChatStatus,

    /// Status as seen by `user_b`
    pub status_b: ChatStatus,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub last_message_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether `user_id` is one of the two participants.
    #[must_use]
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The participant who is not `user_id`.
    #[must_use]
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        if self.user_a == user_id {
            Some(&self.user_b)
        } else if self.user_b == user_id {
            Some(&self.user_a)
        } else {
            None
        }
    }

    /// Status as seen by `user_id`.
    #[must_use]
    pub fn status_of(&self, user_id: &str) -> Option<ChatStatus> {
        if self.user_a == user_id {
            Some(self.status_a)
        } else if self.user_b == user_id {
            Some(self.status_b)
        } else {
            None
        }
    }

    /// `(viewer's status, other side's status)`.
    #[must_use]
    pub fn statuses_for(&self, viewer_id: &str) -> Option<(ChatStatus, ChatStatus)> {
        if self.user_a == viewer_id {
            Some((self.status_a, self.status_b))
        } else if self.user_b == viewer_id {
            Some((self.status_b, self.status_a))
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserA",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    UserA,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserB",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    UserB,

    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
