//! Collection service.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use coterie_common::{AppError, AppResult, IdGenerator};
use coterie_db::{
    entities::{collection, notification::NotificationKind, to_id_list, with_id, without_id},
    repositories::{CollectionRepository, PostRepository},
};
use sea_orm::Set;
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use crate::pagination::PageSource;
use crate::services::friend_graph::FriendGraph;
use crate::services::notification::NotificationService;

/// Input for creating a collection.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCollectionInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2048))]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// Which access list an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessList {
    /// Users allowed into a private collection.
    Allowed,
    /// Users kept out of a public collection.
    Denied,
}

/// Collection service for business logic.
#[derive(Clone)]
pub struct CollectionService {
    collection_repo: CollectionRepository,
    post_repo: PostRepository,
    graph: FriendGraph,
    notifications: Option<NotificationService>,
    retention: TimeDelta,
    id_gen: IdGenerator,
}

impl CollectionService {
    /// Create a new collection service.
    #[must_use]
    pub fn new(
        collection_repo: CollectionRepository,
        post_repo: PostRepository,
        graph: FriendGraph,
    ) -> Self {
        Self {
            collection_repo,
            post_repo,
            graph,
            notifications: None,
            retention: TimeDelta::days(15),
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the notification service.
    pub fn set_notifications(&mut self, notifications: NotificationService) {
        self.notifications = Some(notifications);
    }

    /// Set how long a soft-deleted collection can be restored.
    pub fn set_retention(&mut self, retention: TimeDelta) {
        self.retention = retention;
    }

    /// Create a collection owned by `owner_id`.
    pub async fn create(
        &self,
        owner_id: &str,
        input: CreateCollectionInput,
    ) -> AppResult<collection::Model> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let model = collection::ActiveModel {
            id: Set(self.id_gen.generate()),
            owner_id: Set(owner_id.to_string()),
            name: Set(input.name),
            description: Set(input.description),
            is_public: Set(input.is_public),
            owners: Set(to_id_list([owner_id])),
            members: Set(to_id_list(Vec::<String>::new())),
            allowed_users: Set(to_id_list(Vec::<String>::new())),
            denied_users: Set(to_id_list(Vec::<String>::new())),
            created_at: Set(Utc::now().fixed_offset()),
            updated_at: Set(None),
            deleted_at: Set(None),
        };

        let created = self.collection_repo.create(model).await?;
        info!(collection_id = %created.id, owner_id, "Collection created");
        Ok(created)
    }

    /// A collection `viewer_id` may see.
    ///
    /// Invisible, deleted and blocked-owner collections all read as missing.
    pub async fn get_visible(
        &self,
        viewer_id: &str,
        collection_id: &str,
    ) -> AppResult<collection::Model> {
        let collection = self.collection_repo.get_by_id(collection_id).await?;
        if !collection.is_visible_to(viewer_id) || self.owner_hidden(viewer_id, &collection).await?
        {
            return Err(AppError::CollectionNotFound(collection_id.to_string()));
        }
        Ok(collection)
    }

    async fn owner_hidden(&self, viewer_id: &str, collection: &collection::Model) -> AppResult<bool> {
        let owner = collection.owner_id.as_str();
        if owner == viewer_id {
            return Ok(false);
        }
        Ok(self.graph.is_blocking(viewer_id, owner).await?
            || self.graph.is_blocking(owner, viewer_id).await?)
    }

    async fn get_managed(&self, actor_id: &str, collection_id: &str) -> AppResult<collection::Model> {
        let collection = self.collection_repo.get_by_id(collection_id).await?;
        if collection.deleted_at.is_some() {
            return Err(AppError::CollectionNotFound(collection_id.to_string()));
        }
        if !collection.is_owner(actor_id) {
            return Err(AppError::Forbidden(
                "Only owners can manage this collection".to_string(),
            ));
        }
        Ok(collection)
    }

    /// Join a visible collection.
    pub async fn join(&self, user_id: &str, collection_id: &str) -> AppResult<collection::Model> {
        let collection = self.get_visible(user_id, collection_id).await?;
        if collection.is_member(user_id) || collection.is_owner(user_id) {
            return Err(AppError::AlreadyExists(
                "Already a member of this collection".to_string(),
            ));
        }

        let owner_id = collection.owner_id.clone();
        let members = with_id(&collection.members, user_id);
        let mut active: collection::ActiveModel = collection.into();
        active.members = Set(members);
        active.updated_at = Set(Some(Utc::now().fixed_offset()));
        let updated = self.collection_repo.update(active).await?;

        info!(collection_id, user_id, "Joined collection");
        if let Some(notifications) = &self.notifications
            && let Err(e) = notifications
                .notify(
                    &owner_id,
                    Some(user_id),
                    NotificationKind::CollectionJoined,
                    Some(collection_id),
                )
                .await
        {
            warn!(error = %e, collection_id, "Failed to notify collection owner");
        }

        Ok(updated)
    }

    /// Leave a collection. The creator cannot leave.
    pub async fn leave(&self, user_id: &str, collection_id: &str) -> AppResult<collection::Model> {
        let collection = self.collection_repo.get_by_id(collection_id).await?;
        if collection.owner_id == user_id {
            return Err(AppError::BadRequest(
                "The creator cannot leave their collection".to_string(),
            ));
        }
        if !collection.is_member(user_id) && !collection.is_owner(user_id) {
            return Err(AppError::BadRequest(
                "Not a member of this collection".to_string(),
            ));
        }

        let members = without_id(&collection.members, user_id);
        let owners = without_id(&collection.owners, user_id);
        let mut active: collection::ActiveModel = collection.into();
        active.members = Set(members);
        active.owners = Set(owners);
        active.updated_at = Set(Some(Utc::now().fixed_offset()));
        let updated = self.collection_repo.update(active).await?;

        info!(collection_id, user_id, "Left collection");
        Ok(updated)
    }

    /// Switch between public and private.
    pub async fn set_visibility(
        &self,
        actor_id: &str,
        collection_id: &str,
        is_public: bool,
    ) -> AppResult<collection::Model> {
        let collection = self.get_managed(actor_id, collection_id).await?;
        let mut active: collection::ActiveModel = collection.into();
        active.is_public = Set(is_public);
        active.updated_at = Set(Some(Utc::now().fixed_offset()));
        self.collection_repo.update(active).await
    }

    async fn edit_access(
        &self,
        actor_id: &str,
        collection_id: &str,
        list: AccessList,
        user_id: &str,
        add: bool,
    ) -> AppResult<collection::Model> {
        let collection = self.get_managed(actor_id, collection_id).await?;
        let current = match list {
            AccessList::Allowed => &collection.allowed_users,
            AccessList::Denied => &collection.denied_users,
        };
        let next = if add {
            with_id(current, user_id)
        } else {
            without_id(current, user_id)
        };

        let mut active: collection::ActiveModel = collection.into();
        match list {
            AccessList::Allowed => active.allowed_users = Set(next),
            AccessList::Denied => active.denied_users = Set(next),
        }
        active.updated_at = Set(Some(Utc::now().fixed_offset()));
        self.collection_repo.update(active).await
    }

    /// Add a user to the allow-list.
    pub async fn allow(
        &self,
        actor_id: &str,
        collection_id: &str,
        user_id: &str,
    ) -> AppResult<collection::Model> {
        self.edit_access(actor_id, collection_id, AccessList::Allowed, user_id, true)
            .await
    }

    /// Add a user to the deny-list.
    pub async fn deny(
        &self,
        actor_id: &str,
        collection_id: &str,
        user_id: &str,
    ) -> AppResult<collection::Model> {
        self.edit_access(actor_id, collection_id, AccessList::Denied, user_id, true)
            .await
    }

    /// Apply a list edit by list kind.
    pub async fn edit_list(
        &self,
        actor_id: &str,
        collection_id: &str,
        list: AccessList,
        user_id: &str,
        add: bool,
    ) -> AppResult<collection::Model> {
        self.edit_access(actor_id, collection_id, list, user_id, add)
            .await
    }

    /// Move a collection to the creator's trash.
    pub async fn soft_delete(&self, actor_id: &str, collection_id: &str) -> AppResult<()> {
        let collection = self.collection_repo.get_by_id(collection_id).await?;
        if collection.owner_id != actor_id {
            return Err(AppError::Forbidden(
                "Only the creator can delete this collection".to_string(),
            ));
        }
        if collection.deleted_at.is_some() {
            return Err(AppError::CollectionNotFound(collection_id.to_string()));
        }

        let mut active: collection::ActiveModel = collection.into();
        active.deleted_at = Set(Some(Utc::now().fixed_offset()));
        self.collection_repo.update(active).await?;

        info!(collection_id, actor_id, "Collection moved to trash");
        Ok(())
    }

    /// Bring a collection back from the trash within the retention window.
    pub async fn restore(&self, actor_id: &str, collection_id: &str) -> AppResult<collection::Model> {
        let collection = self.collection_repo.get_by_id(collection_id).await?;
        if collection.owner_id != actor_id {
            return Err(AppError::Forbidden(
                "Only the creator can restore this collection".to_string(),
            ));
        }
        let Some(deleted_at) = collection.deleted_at else {
            return Err(AppError::BadRequest("Collection is not deleted".to_string()));
        };
        if Utc::now() - deleted_at.with_timezone(&Utc) > self.retention {
            return Err(AppError::BadRequest(
                "Restore window has passed".to_string(),
            ));
        }

        let mut active: collection::ActiveModel = collection.into();
        active.deleted_at = Set(None);
        active.updated_at = Set(Some(Utc::now().fixed_offset()));
        let restored = self.collection_repo.update(active).await?;

        info!(collection_id, actor_id, "Collection restored");
        Ok(restored)
    }

    /// Collections in the creator's trash.
    pub async fn list_trash(&self, owner_id: &str) -> AppResult<Vec<collection::Model>> {
        self.collection_repo.find_trash(owner_id).await
    }

    /// Collections created by `owner_id`, including trashed ones.
    pub async fn list_owned(
        &self,
        owner_id: &str,
        limit: u64,
        after_id: Option<&str>,
    ) -> AppResult<Vec<collection::Model>> {
        self.collection_repo
            .find_by_owner(owner_id, limit, after_id)
            .await
    }

    /// Live collections `user_id` has joined.
    pub async fn list_joined(
        &self,
        user_id: &str,
        limit: u64,
        after_id: Option<&str>,
    ) -> AppResult<Vec<collection::Model>> {
        self.collection_repo
            .find_with_member(user_id, limit, after_id)
            .await
    }

    /// Hard-delete collections trashed longer than the retention window,
    /// together with their posts.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.purge_trashed_before(now - self.retention).await
    }

    /// Hard-delete collections trashed before `cutoff`, together with their posts.
    pub async fn purge_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let ids = self
            .collection_repo
            .find_expired_ids(cutoff.fixed_offset())
            .await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let posts = self.post_repo.delete_by_collections(&ids).await?;
        let collections = self.collection_repo.delete_by_ids(&ids).await?;

        info!(collections, posts, "Purged expired collections");
        Ok(collections)
    }

    /// Page source over the collections a user created.
    #[must_use]
    pub fn owned_by(&self, owner_id: &str) -> OwnedCollections {
        OwnedCollections::new(self.collection_repo.clone(), owner_id)
    }
}

/// Collections created by one user, ascending by ID.
#[derive(Clone)]
pub struct OwnedCollections {
    collection_repo: CollectionRepository,
    owner_id: String,
}

impl OwnedCollections {
    /// Page source over the collections `owner_id` created.
    #[must_use]
    pub fn new(collection_repo: CollectionRepository, owner_id: &str) -> Self {
        Self {
            collection_repo,
            owner_id: owner_id.to_string(),
        }
    }
}

#[async_trait]
impl PageSource for OwnedCollections {
    type Item = collection::Model;
    type Cursor = String;

    async fn fetch(&self, after: Option<&String>, limit: u64) -> AppResult<Vec<collection::Model>> {
        self.collection_repo
            .find_by_owner(&self.owner_id, limit, after.map(String::as_str))
            .await
    }

    fn cursor_of(&self, item: &collection::Model) -> String {
        item.id.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pagination::CursorPager;
    use crate::services::friend_graph::{FriendGraphStore, MemoryFriendGraph};
    use coterie_db::entities::id_list;
    use coterie_db::repositories::RelationWrite;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn collection(id: &str, is_public: bool) -> collection::Model {
        collection::Model {
            id: id.to_string(),
            owner_id: "owner".to_string(),
            name: "Trip".to_string(),
            description: None,
            is_public,
            owners: to_id_list(["owner", "admin"]),
            members: to_id_list(["member"]),
            allowed_users: to_id_list(Vec::<String>::new()),
            denied_users: to_id_list(["denied"]),
            created_at: Utc::now().fixed_offset(),
            updated_at: None,
            deleted_at: None,
        }
    }

    fn service_with(db: MockDatabase, graph: MemoryFriendGraph) -> CollectionService {
        let conn = Arc::new(db.into_connection());
        CollectionService::new(
            CollectionRepository::new(conn.clone()),
            PostRepository::new(conn),
            Arc::new(graph),
        )
    }

    fn service(db: MockDatabase) -> CollectionService {
        service_with(db, MemoryFriendGraph::new())
    }

    fn exec(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[tokio::test]
    async fn test_create_validates_name() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let err = service
            .create(
                "owner",
                CreateCollectionInput {
                    name: String::new(),
                    description: None,
                    is_public: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![collection("c1", true)]]);
        let service = service(db);

        let created = service
            .create(
                "owner",
                CreateCollectionInput {
                    name: "Trip".to_string(),
                    description: None,
                    is_public: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.owner_id, "owner");
    }

    #[tokio::test]
    async fn test_get_visible_hides_denied_and_blocked() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([
            vec![collection("c1", true)],
            vec![collection("c1", true)],
            vec![collection("c1", true)],
        ]);
        let graph = MemoryFriendGraph::new();
        graph
            .apply(vec![RelationWrite::AddBlock {
                blocker: "owner".to_string(),
                blockee: "enemy".to_string(),
            }])
            .await
            .unwrap();
        let service = service_with(db, graph);

        assert!(service.get_visible("stranger", "c1").await.is_ok());
        assert!(matches!(
            service.get_visible("denied", "c1").await,
            Err(AppError::CollectionNotFound(_))
        ));
        assert!(matches!(
            service.get_visible("enemy", "c1").await,
            Err(AppError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_join_adds_member() {
        let mut joined = collection("c1", true);
        joined.members = to_id_list(["member", "newbie"]);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![collection("c1", true)], vec![joined]]);
        let service = service(db);

        let updated = service.join("newbie", "c1").await.unwrap();
        assert_eq!(id_list(&updated.members), vec!["member", "newbie"]);
    }

    #[tokio::test]
    async fn test_join_twice_already_exists() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![collection("c1", true)]]);
        let service = service(db);

        assert!(matches!(
            service.join("member", "c1").await,
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_private_collection_requires_allow_list() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![collection("c1", false)]]);
        let service = service(db);

        assert!(matches!(
            service.join("stranger", "c1").await,
            Err(AppError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_creator_cannot_leave() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([
            vec![collection("c1", true)],
            vec![collection("c1", true)],
        ]);
        let service = service(db);

        assert!(matches!(
            service.leave("owner", "c1").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            service.leave("stranger", "c1").await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_list_edits_are_owner_only() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![collection("c1", true)]]);
        let service = service(db);

        assert!(matches!(
            service.deny("member", "c1", "someone").await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_can_allow() {
        let mut updated = collection("c1", false);
        updated.allowed_users = to_id_list(["friend"]);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![collection("c1", false)], vec![updated]]);
        let service = service(db);

        let result = service.allow("admin", "c1", "friend").await.unwrap();
        assert_eq!(id_list(&result.allowed_users), vec!["friend"]);
    }

    #[tokio::test]
    async fn test_edit_list_removes_from_deny_list() {
        let mut updated = collection("c1", true);
        updated.denied_users = to_id_list(Vec::<String>::new());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![collection("c1", true)], vec![updated]]);
        let service = service(db);

        let result = service
            .edit_list("owner", "c1", AccessList::Denied, "denied", false)
            .await
            .unwrap();
        assert!(id_list(&result.denied_users).is_empty());
        assert!(result.is_visible_to("denied"));
    }

    #[tokio::test]
    async fn test_soft_delete_is_creator_only() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![collection("c1", true)]]);
        let service = service(db);

        assert!(matches!(
            service.soft_delete("admin", "c1").await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_within_window() {
        let mut trashed = collection("c1", true);
        trashed.deleted_at = Some((Utc::now() - TimeDelta::days(3)).fixed_offset());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![trashed], vec![collection("c1", true)]]);
        let service = service(db);

        let restored = service.restore("owner", "c1").await.unwrap();
        assert!(restored.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_restore_after_window_fails() {
        let mut trashed = collection("c1", true);
        trashed.deleted_at = Some((Utc::now() - TimeDelta::days(16)).fixed_offset());
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![trashed]]);
        let service = service(db);

        assert!(matches!(
            service.restore("owner", "c1").await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_expired_deletes_posts_then_collections() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![BTreeMap::from([("id", Value::from("c1"))])]])
            .append_exec_results([exec(4), exec(1)]);
        let service = service(db);

        assert_eq!(service.purge_expired(Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired_nothing_to_do() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()]);
        let service = service(db);

        assert_eq!(service.purge_expired(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_owned_collections_page_source() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([
            vec![collection("c1", true), collection("c2", true)],
            vec![collection("c3", true)],
        ]);
        let service = service(db);

        let all = CursorPager::new(service.owned_by("owner"), 2)
            .collect_all()
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }
}
