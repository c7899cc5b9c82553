//! Create all tables from the entity definitions.

use sea_orm::{EntityTrait, Schema};
use sea_orm_migration::prelude::*;

use crate::entities::{
    blocking, chat_room, collection, following, friend_request, friendship, message,
    notification, post, post_comment, post_star, user,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

async fn create_from_entity<E: EntityTrait>(
    manager: &SchemaManager<'_>,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    manager
        .create_table(
            schema
                .create_table_from_entity(entity)
                .if_not_exists()
                .to_owned(),
        )
        .await
}

async fn unique_pair<C: IntoIden + 'static>(
    manager: &SchemaManager<'_>,
    name: &str,
    table: &str,
    first: C,
    second: C,
) -> Result<(), DbErr> {
    manager
        .create_index(
            Index::create()
                .name(name)
                .table(Alias::new(table))
                .col(first)
                .col(second)
                .unique()
                .if_not_exists()
                .to_owned(),
        )
        .await
}

async fn index<C: IntoIden + 'static>(
    manager: &SchemaManager<'_>,
    name: &str,
    table: &str,
    col: C,
) -> Result<(), DbErr> {
    manager
        .create_index(
            Index::create()
                .name(name)
                .table(Alias::new(table))
                .col(col)
                .if_not_exists()
                .to_owned(),
        )
        .await
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager.get_database_backend());

        // Parents before children so foreign keys resolve.
        create_from_entity(manager, &schema, user::Entity).await?;
        create_from_entity(manager, &schema, friendship::Entity).await?;
        create_from_entity(manager, &schema, blocking::Entity).await?;
        create_from_entity(manager, &schema, following::Entity).await?;
        create_from_entity(manager, &schema, friend_request::Entity).await?;
        create_from_entity(manager, &schema, chat_room::Entity).await?;
        create_from_entity(manager, &schema, message::Entity).await?;
        create_from_entity(manager, &schema, collection::Entity).await?;
        create_from_entity(manager, &schema, post::Entity).await?;
        create_from_entity(manager, &schema, post_star::Entity).await?;
        create_from_entity(manager, &schema, post_comment::Entity).await?;
        create_from_entity(manager, &schema, notification::Entity).await?;

        unique_pair(
            manager,
            "idx_friendship_user_friend",
            "friendship",
            friendship::Column::UserId,
            friendship::Column::FriendId,
        )
        .await?;
        unique_pair(
            manager,
            "idx_blocking_blocker_blockee",
            "blocking",
            blocking::Column::BlockerId,
            blocking::Column::BlockeeId,
        )
        .await?;
        unique_pair(
            manager,
            "idx_following_follower_followee",
            "following",
            following::Column::FollowerId,
            following::Column::FolloweeId,
        )
        .await?;
        unique_pair(
            manager,
            "idx_post_star_post_user",
            "post_star",
            post_star::Column::PostId,
            post_star::Column::UserId,
        )
        .await?;

        index(manager, "idx_blocking_blockee_id", "blocking", blocking::Column::BlockeeId).await?;
        index(manager, "idx_friend_request_to_id", "friend_request", friend_request::Column::ToId)
            .await?;
        index(manager, "idx_chat_room_user_b", "chat_room", chat_room::Column::UserB).await?;
        index(manager, "idx_message_room_id", "message", message::Column::RoomId).await?;
        index(manager, "idx_post_collection_id", "post", post::Column::CollectionId).await?;
        index(manager, "idx_collection_deleted_at", "collection", collection::Column::DeletedAt)
            .await?;
        index(
            manager,
            "idx_notification_notifiee_id",
            "notification",
            notification::Column::NotifieeId,
        )
        .await?;
        index(
            manager,
            "idx_notification_created_at",
            "notification",
            notification::Column::CreatedAt,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            "notification",
            "post_comment",
            "post_star",
            "post",
            "collection",
            "message",
            "chat_room",
            "friend_request",
            "following",
            "blocking",
            "friendship",
            "user",
        ] {
            manager
                .drop_table(Table::drop().table(Alias::new(table)).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}
