//! Notification entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    #[sea_orm(string_value = "friendRequest")]
    FriendRequest,
    #[sea_orm(string_value = "friendAccepted")]
    FriendAccepted,
    #[sea_orm(string_value = "collectionJoined")]
    CollectionJoined,
    #[sea_orm(string_value = "postCreated")]
    PostCreated,
    #[sea_orm(string_value = "postStarred")]
    PostStarred,
    #[sea_orm(string_value = "postCommented")]
    PostCommented,
    #[sea_orm(string_value = "message")]
    Message,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user receiving the notification
    pub notifiee_id: String,

    /// The user who triggered the notification
    #[sea_orm(nullable)]
    pub notifier_id: Option<String>,

    pub kind: NotificationKind,

    /// Related post, collection, room or request
    #[sea_orm(nullable)]
    pub entity_id: Option<String>,

    #[sea_orm(default_value = false)]
    pub is_read: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::NotifieeId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Notifiee,
}

impl ActiveModelBehavior for ActiveModel {}
