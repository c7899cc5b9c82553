//! Chat message entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::id_list;

/// Message content kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[sea_orm(string_value = "text")]
    Text,
    #[sea_orm(string_value = "image")]
    Image,
    #[sea_orm(string_value = "video")]
    Video,
    #[sea_orm(string_value = "audio")]
    Audio,
    #[sea_orm(string_value = "system")]
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "message")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub room_id: String,

    pub sender_id: String,

    /// Text body or media URL; `None` on tombstones
    #[sea_orm(column_type = "Text", nullable)]
    pub content: Option<String>,

    pub message_type: MessageType,

    /// Users who hid this message for themselves
    #[sea_orm(column_type = "JsonBinary")]
    pub deleted_for: Json,

    /// Tombstone flag
    #[sea_orm(default_value = false)]
    pub is_deleted: bool,

    #[sea_orm(default_value = 0)]
    pub edit_count: i32,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub edited_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether `user_id` hid this message.
    #[must_use]
    pub fn is_hidden_for(&self, user_id: &str) -> bool {
        id_list(&self.deleted_for).iter().any(|id| id == user_id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chat_room::Entity",
        from = "Column::RoomId",
        to = "super::chat_room::Column::Id",
        on_delete = "Cascade"
    )]
    Room,
}

impl Related<super::chat_room::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Room.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
