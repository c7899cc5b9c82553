//! Post service.

use chrono::Utc;
use coterie_common::{AppError, AppResult, IdGenerator};
use coterie_db::{
    entities::{
        collection,
        notification::NotificationKind,
        post::{self, MediaItem},
        post_comment, post_star,
    },
    repositories::{CollectionRepository, PostRepository},
};
use sea_orm::{Set, prelude::Json};
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use crate::services::notification::NotificationService;

/// Input for creating a post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    pub collection_id: String,
    #[validate(length(max = 2200))]
    pub caption: Option<String>,
    #[validate(length(min = 1, max = 10))]
    pub media: Vec<MediaItem>,
}

/// Input for commenting on a post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CommentInput {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
}

/// Post service for business logic.
#[derive(Clone)]
pub struct PostService {
    post_repo: PostRepository,
    collection_repo: CollectionRepository,
    notifications: Option<NotificationService>,
    id_gen: IdGenerator,
}

impl PostService {
    /// Create a new post service.
    #[must_use]
    pub fn new(post_repo: PostRepository, collection_repo: CollectionRepository) -> Self {
        Self {
            post_repo,
            collection_repo,
            notifications: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the notification service.
    pub fn set_notifications(&mut self, notifications: NotificationService) {
        self.notifications = Some(notifications);
    }

    async fn visible_collection(
        &self,
        viewer_id: &str,
        collection_id: &str,
    ) -> AppResult<collection::Model> {
        let collection = self.collection_repo.get_by_id(collection_id).await?;
        if !collection.is_visible_to(viewer_id) {
            return Err(AppError::CollectionNotFound(collection_id.to_string()));
        }
        Ok(collection)
    }

    /// A post and its collection, if `viewer_id` can see the collection.
    async fn visible_post(
        &self,
        viewer_id: &str,
        post_id: &str,
    ) -> AppResult<(post::Model, collection::Model)> {
        let post = self.post_repo.get_by_id(post_id).await?;
        let collection = self
            .visible_collection(viewer_id, &post.collection_id)
            .await
            .map_err(|_| AppError::PostNotFound(post_id.to_string()))?;
        Ok((post, collection))
    }

    /// Get a post.
    pub async fn get(&self, viewer_id: &str, post_id: &str) -> AppResult<post::Model> {
        self.visible_post(viewer_id, post_id).await.map(|(post, _)| post)
    }

    /// Publish a post into a collection the author belongs to.
    pub async fn create(&self, author_id: &str, input: CreatePostInput) -> AppResult<post::Model> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let collection = self
            .visible_collection(author_id, &input.collection_id)
            .await?;
        if !collection.is_owner(author_id) && !collection.is_member(author_id) {
            return Err(AppError::Forbidden(
                "Only members can post to this collection".to_string(),
            ));
        }

        let media =
            serde_json::to_value(&input.media).map_err(|e| AppError::Internal(e.to_string()))?;

        let model = post::ActiveModel {
            id: Set(self.id_gen.generate()),
            collection_id: Set(collection.id.clone()),
            author_id: Set(author_id.to_string()),
            caption: Set(input.caption),
            media: Set(media),
            is_pinned: Set(false),
            is_deleted: Set(false),
            star_count: Set(0),
            comment_count: Set(0),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let created = self.post_repo.create(model).await?;
        info!(post_id = %created.id, collection_id = %collection.id, author_id, "Post created");

        if let Some(notifications) = &self.notifications {
            let mut recipients = collection.owner_ids();
            recipients.extend(collection.member_ids());
            recipients.push(collection.owner_id.clone());
            notifications
                .fan_out(
                    author_id,
                    &recipients,
                    NotificationKind::PostCreated,
                    Some(&created.id),
                )
                .await;
        }

        Ok(created)
    }

    /// Tombstone a post. Allowed for the author and collection owners.
    pub async fn delete(&self, actor_id: &str, post_id: &str) -> AppResult<post::Model> {
        let (post, collection) = self.visible_post(actor_id, post_id).await?;
        if post.author_id != actor_id && !collection.is_owner(actor_id) {
            return Err(AppError::Forbidden(
                "Only the author or an owner can delete this post".to_string(),
            ));
        }
        if post.is_deleted {
            return Ok(post);
        }

        let mut active: post::ActiveModel = post.into();
        active.media = Set(Json::Array(vec![]));
        active.caption = Set(None);
        active.is_pinned = Set(false);
        active.is_deleted = Set(true);
        let tombstone = self.post_repo.update(active).await?;

        info!(post_id, actor_id, "Post deleted");
        Ok(tombstone)
    }

    /// Pin or unpin a post. Owners only.
    pub async fn set_pinned(
        &self,
        actor_id: &str,
        post_id: &str,
        pinned: bool,
    ) -> AppResult<post::Model> {
        let (post, collection) = self.visible_post(actor_id, post_id).await?;
        if !collection.is_owner(actor_id) {
            return Err(AppError::Forbidden("Only owners can pin posts".to_string()));
        }
        if post.is_deleted {
            return Err(AppError::PostNotFound(post_id.to_string()));
        }

        let mut active: post::ActiveModel = post.into();
        active.is_pinned = Set(pinned);
        self.post_repo.update(active).await
    }

    async fn live_post(&self, viewer_id: &str, post_id: &str) -> AppResult<post::Model> {
        let (post, _) = self.visible_post(viewer_id, post_id).await?;
        if post.is_deleted {
            return Err(AppError::PostNotFound(post_id.to_string()));
        }
        Ok(post)
    }

    /// Star a post.
    pub async fn star(&self, user_id: &str, post_id: &str) -> AppResult<post_star::Model> {
        let post = self.live_post(user_id, post_id).await?;

        if self.post_repo.find_star(post_id, user_id).await?.is_some() {
            return Err(AppError::AlreadyExists("Already starred".to_string()));
        }

        let star = self
            .post_repo
            .create_star(post_star::ActiveModel {
                id: Set(self.id_gen.generate()),
                post_id: Set(post_id.to_string()),
                user_id: Set(user_id.to_string()),
                created_at: Set(Utc::now().fixed_offset()),
            })
            .await?;
        self.post_repo.increment_star_count(post_id).await?;

        self.notify_author(&post, user_id, NotificationKind::PostStarred)
            .await;
        Ok(star)
    }

    /// Remove a star.
    pub async fn unstar(&self, user_id: &str, post_id: &str) -> AppResult<()> {
        if !self.post_repo.delete_star(post_id, user_id).await? {
            return Err(AppError::NotFound("Star".to_string()));
        }
        self.post_repo.decrement_star_count(post_id).await
    }

    /// Comment on a post.
    pub async fn comment(
        &self,
        user_id: &str,
        post_id: &str,
        input: CommentInput,
    ) -> AppResult<post_comment::Model> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let post = self.live_post(user_id, post_id).await?;

        let comment = self
            .post_repo
            .create_comment(post_comment::ActiveModel {
                id: Set(self.id_gen.generate()),
                post_id: Set(post_id.to_string()),
                author_id: Set(user_id.to_string()),
                text: Set(input.text),
                created_at: Set(Utc::now().fixed_offset()),
            })
            .await?;
        self.post_repo.increment_comment_count(post_id).await?;

        self.notify_author(&post, user_id, NotificationKind::PostCommented)
            .await;
        Ok(comment)
    }

    async fn notify_author(&self, post: &post::Model, actor_id: &str, kind: NotificationKind) {
        let Some(notifications) = &self.notifications else {
            return;
        };
        if let Err(e) = notifications
            .notify(&post.author_id, Some(actor_id), kind, Some(&post.id))
            .await
        {
            warn!(error = %e, post_id = %post.id, "Failed to notify post author");
        }
    }

    /// Comments on a post, oldest first.
    pub async fn list_comments(
        &self,
        viewer_id: &str,
        post_id: &str,
        limit: u64,
        after_id: Option<&str>,
    ) -> AppResult<Vec<post_comment::Model>> {
        self.visible_post(viewer_id, post_id).await?;
        self.post_repo.find_comments(post_id, limit, after_id).await
    }

    /// Posts in a collection, newest first.
    pub async fn list_in_collection(
        &self,
        viewer_id: &str,
        collection_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<post::Model>> {
        self.visible_collection(viewer_id, collection_id).await?;
        self.post_repo
            .find_by_collection(collection_id, limit, until_id)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use coterie_db::entities::{post::MediaKind, to_id_list};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn collection() -> collection::Model {
        collection::Model {
            id: "c1".to_string(),
            owner_id: "owner".to_string(),
            name: "Trip".to_string(),
            description: None,
            is_public: true,
            owners: to_id_list(["owner"]),
            members: to_id_list(["member", "other"]),
            allowed_users: to_id_list(Vec::<String>::new()),
            denied_users: to_id_list(Vec::<String>::new()),
            created_at: Utc::now().fixed_offset(),
            updated_at: None,
            deleted_at: None,
        }
    }

    fn media() -> Vec<MediaItem> {
        vec![MediaItem {
            url: "https://cdn.example/a.jpg".to_string(),
            kind: MediaKind::Image,
            thumbnail_url: None,
        }]
    }

    fn post(id: &str, author: &str) -> post::Model {
        post::Model {
            id: id.to_string(),
            collection_id: "c1".to_string(),
            author_id: author.to_string(),
            caption: Some("hello".to_string()),
            media: serde_json::to_value(media()).unwrap(),
            is_pinned: false,
            is_deleted: false,
            star_count: 0,
            comment_count: 0,
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn service(db: MockDatabase) -> PostService {
        let conn = Arc::new(db.into_connection());
        PostService::new(
            PostRepository::new(conn.clone()),
            CollectionRepository::new(conn),
        )
    }

    fn exec(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[tokio::test]
    async fn test_create_requires_media() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let err = service
            .create(
                "member",
                CreatePostInput {
                    collection_id: "c1".to_string(),
                    caption: None,
                    media: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_requires_membership() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![collection()]]);
        let service = service(db);

        let err = service
            .create(
                "stranger",
                CreatePostInput {
                    collection_id: "c1".to_string(),
                    caption: None,
                    media: media(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_member_creates_post() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![collection()]])
            .append_query_results([vec![post("p1", "member")]]);
        let service = service(db);

        let created = service
            .create(
                "member",
                CreatePostInput {
                    collection_id: "c1".to_string(),
                    caption: Some("hello".to_string()),
                    media: media(),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.media_items().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_writes_tombstone() {
        let mut tombstone = post("p1", "member");
        tombstone.media = Json::Array(vec![]);
        tombstone.caption = None;
        tombstone.is_deleted = true;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![post("p1", "member")]])
            .append_query_results([vec![collection()]])
            .append_query_results([vec![tombstone]]);
        let service = service(db);

        let deleted = service.delete("owner", "p1").await.unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.id, "p1");
        assert!(deleted.media_items().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_other_member_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![post("p1", "member")]])
            .append_query_results([vec![collection()]]);
        let service = service(db);

        assert!(matches!(
            service.delete("other", "p1").await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_pin_is_owner_only() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![post("p1", "member")]])
            .append_query_results([vec![collection()]]);
        let service = service(db);

        assert!(matches!(
            service.set_pinned("member", "p1", true).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_star_twice_already_exists() {
        let existing = post_star::Model {
            id: "s1".to_string(),
            post_id: "p1".to_string(),
            user_id: "other".to_string(),
            created_at: Utc::now().fixed_offset(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![post("p1", "member")]])
            .append_query_results([vec![collection()]])
            .append_query_results([vec![existing]]);
        let service = service(db);

        assert!(matches!(
            service.star("other", "p1").await,
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_star_increments_counter() {
        let star = post_star::Model {
            id: "s1".to_string(),
            post_id: "p1".to_string(),
            user_id: "other".to_string(),
            created_at: Utc::now().fixed_offset(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![post("p1", "member")]])
            .append_query_results([vec![collection()]])
            .append_query_results([Vec::<post_star::Model>::new()])
            .append_query_results([vec![star]])
            .append_exec_results([exec(1)]);
        let service = service(db);

        let star = service.star("other", "p1").await.unwrap();
        assert_eq!(star.user_id, "other");
    }

    #[tokio::test]
    async fn test_unstar_missing_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([exec(0)]);
        let service = service(db);

        assert!(matches!(
            service.unstar("other", "p1").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_comment_rejects_empty_text() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let err = service
            .comment(
                "other",
                "p1",
                CommentInput {
                    text: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_in_hidden_collection() {
        let mut private = collection();
        private.is_public = false;
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![private]]);
        let service = service(db);

        assert!(matches!(
            service.list_in_collection("stranger", "c1", 20, None).await,
            Err(AppError::CollectionNotFound(_))
        ));
    }
}
