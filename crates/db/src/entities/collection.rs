//! Collection entity (a named, ownable group of posts).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::id_list;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "collection")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Creator
    pub owner_id: String,

    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub is_public: bool,

    /// Co-owners with admin rights (includes the creator)
    #[sea_orm(column_type = "JsonBinary")]
    pub owners: Json,

    /// Joined members
    #[sea_orm(column_type = "JsonBinary")]
    pub members: Json,

    /// Users allowed to see a private collection
    #[sea_orm(column_type = "JsonBinary")]
    pub allowed_users: Json,

    /// Users hidden from a public collection
    #[sea_orm(column_type = "JsonBinary")]
    pub denied_users: Json,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,

    /// Soft delete marker; purged after the retention window
    #[sea_orm(nullable)]
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Owner and co-owner IDs.
    #[must_use]
    pub fn owner_ids(&self) -> Vec<String> {
        id_list(&self.owners)
    }

    /// Member IDs.
    #[must_use]
    pub fn member_ids(&self) -> Vec<String> {
        id_list(&self.members)
    }

    /// Whether `user_id` owns or co-owns the collection.
    #[must_use]
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.owner_ids().iter().any(|id| id == user_id)
    }

    /// Whether `user_id` has joined the collection.
    #[must_use]
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids().iter().any(|id| id == user_id)
    }

    /// Visibility rule: members and owners always see it; otherwise a private
    /// collection needs allow-list membership and a public one needs absence
    /// from the deny-list. Deleted collections are visible to nobody.
    #[must_use]
    pub fn is_visible_to(&self, viewer_id: &str) -> bool {
        if self.deleted_at.is_some() {
            return false;
        }
        if self.is_owner(viewer_id) || self.is_member(viewer_id) {
            return true;
        }
        if self.is_public {
            !id_list(&self.denied_users).iter().any(|id| id == viewer_id)
        } else {
            id_list(&self.allowed_users).iter().any(|id| id == viewer_id)
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Owner,

    #[sea_orm(has_many = "super::post::Entity")]
    Posts,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
