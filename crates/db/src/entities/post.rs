//! Post entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One media attachment of a post, in display order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub url: String,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Attachment kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "post")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub collection_id: String,

    pub author_id: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub caption: Option<String>,

    /// Ordered `MediaItem` list; emptied on tombstone
    #[sea_orm(column_type = "JsonBinary")]
    pub media: Json,

    #[sea_orm(default_value = false)]
    pub is_pinned: bool,

    /// Tombstone flag
    #[sea_orm(default_value = false)]
    pub is_deleted: bool,

    #[sea_orm(default_value = 0)]
    pub star_count: i32,

    #[sea_orm(default_value = 0)]
    pub comment_count: i32,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Decoded media list. Malformed entries are skipped.
    #[must_use]
    pub fn media_items(&self) -> Vec<MediaItem> {
        match &self.media {
            Json::Array(items) => items
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::collection::Entity",
        from = "Column::CollectionId",
        to = "super::collection::Column::Id",
        on_delete = "Cascade"
    )]
    Collection,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AuthorId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Author,
}

impl Related<super::collection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Collection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
