//! Block edges.
//!
//! A row means `blocker_id` blocked `blockee_id`. Either direction hides the
//! pair from each other everywhere, and the pair's chat room reads `blocked`
//! on both sides until the last edge between them is removed.
//! `(blocker_id, blockee_id)` is unique.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "blocking")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub blocker_id: String,
    pub blockee_id: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::BlockerId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    BlockerUser,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::BlockeeId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    BlockeeUser,
}

impl ActiveModelBehavior for ActiveModel {}
