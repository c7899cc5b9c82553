//! Friend request entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Friend request lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "camelCase")]
pub enum FriendRequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "denied")]
    Denied,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "friend_request")]
pub struct Model {
    /// `{from_id}_{to_id}`
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user who sent the request
    pub from_id: String,

    /// The user who received the request
    pub to_id: String,

    pub status: FriendRequestStatus,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether the request is still awaiting an answer.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == FriendRequestStatus::Pending
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::FromId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    From,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ToId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    To,
}

impl ActiveModelBehavior for ActiveModel {}
