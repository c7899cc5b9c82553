//! User service.

use std::collections::HashSet;

use chrono::Utc;
use coterie_common::{AppError, AppResult, IdGenerator};
use coterie_db::{entities::user, repositories::UserRepository};
use sea_orm::{Set, prelude::Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::{Validate, ValidationError};

use crate::services::friend_graph::FriendGraph;

/// Maximum results of a username search.
const MAX_SEARCH_RESULTS: u64 = 50;

/// Input for registering a new user.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 20), custom(function = "validate_username"))]
    pub username: String,

    #[validate(length(max = 50))]
    pub name: Option<String>,
}

/// Input for updating a profile. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[validate(length(max = 50))]
    pub name: Option<String>,

    #[validate(length(max = 500))]
    pub bio: Option<String>,

    #[validate(length(max = 2048))]
    pub avatar_url: Option<String>,

    #[validate(length(max = 2048))]
    pub banner_url: Option<String>,

    pub preferences: Option<Json>,
}

#[derive(Debug, Validate)]
struct UsernameInput {
    #[validate(length(min = 1, max = 20), custom(function = "validate_username"))]
    username: String,
}

impl UsernameInput {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
        }
    }
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset"))
    }
}

/// A freshly registered user and the bearer token issued to them.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    pub user: user::Model,
    pub token: String,
}

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
    graph: FriendGraph,
    id_gen: IdGenerator,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub fn new(user_repo: UserRepository, graph: FriendGraph) -> Self {
        Self {
            user_repo,
            graph,
            id_gen: IdGenerator::new(),
        }
    }

    /// Register a new user and issue their token.
    ///
    /// Username uniqueness is checked before the insert; the unique index is
    /// the final arbiter when two registrations race.
    pub async fn register(&self, input: RegisterInput) -> AppResult<RegisteredUser> {
        input.validate()?;

        // Check if username is taken
        if self
            .user_repo
            .find_by_username(&input.username)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyExists("Username already taken".to_string()));
        }

        let token = self.id_gen.generate_token();
        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            username_lower: Set(input.username.to_lowercase()),
            username: Set(input.username),
            token: Set(Some(token.clone())),
            name: Set(input.name),
            bio: Set(None),
            avatar_url: Set(None),
            banner_url: Set(None),
            preferences: Set(serde_json::json!({})),
            created_at: Set(Utc::now().fixed_offset()),
            updated_at: Set(None),
        };

        let user = self.user_repo.create(model).await?;
        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(RegisteredUser { user, token })
    }

    /// Get a user by ID.
    pub async fn get(&self, user_id: &str) -> AppResult<user::Model> {
        self.user_repo.get_by_id(user_id).await
    }

    /// Resolve a bearer token to its user.
    pub async fn authenticate_by_token(&self, token: &str) -> AppResult<user::Model> {
        self.user_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Update profile fields.
    pub async fn update_profile(
        &self,
        user_id: &str,
        input: UpdateProfileInput,
    ) -> AppResult<user::Model> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let user = self.user_repo.get_by_id(user_id).await?;
        let mut active: user::ActiveModel = user.into();

        if let Some(name) = input.name {
            active.name = Set(Some(name).filter(|n| !n.is_empty()));
        }
        if let Some(bio) = input.bio {
            active.bio = Set(Some(bio).filter(|b| !b.is_empty()));
        }
        if let Some(avatar_url) = input.avatar_url {
            active.avatar_url = Set(Some(avatar_url).filter(|u| !u.is_empty()));
        }
        if let Some(banner_url) = input.banner_url {
            active.banner_url = Set(Some(banner_url).filter(|u| !u.is_empty()));
        }
        if let Some(preferences) = input.preferences {
            active.preferences = Set(preferences);
        }
        active.updated_at = Set(Some(Utc::now().fixed_offset()));

        self.user_repo.update(active).await
    }

    /// Change a username after the same checks as registration.
    pub async fn change_username(&self, user_id: &str, username: &str) -> AppResult<user::Model> {
        UsernameInput::new(username).validate()?;

        if let Some(existing) = self.user_repo.find_by_username(username).await?
            && existing.id != user_id
        {
            return Err(AppError::AlreadyExists("Username already taken".to_string()));
        }

        let user = self.user_repo.get_by_id(user_id).await?;
        let mut active: user::ActiveModel = user.into();
        active.username = Set(username.to_string());
        active.username_lower = Set(username.to_lowercase());
        active.updated_at = Set(Some(Utc::now().fixed_offset()));

        let updated = self.user_repo.update(active).await?;
        info!(user_id, username, "Username changed");
        Ok(updated)
    }

    /// Whether a username is valid and free.
    pub async fn is_username_available(&self, username: &str) -> AppResult<bool> {
        if UsernameInput::new(username).validate().is_err() {
            return Ok(false);
        }
        Ok(self.user_repo.find_by_username(username).await?.is_none())
    }

    /// Username prefix search, without users hidden by a block either way.
    pub async fn search_by_username(
        &self,
        viewer_id: &str,
        prefix: &str,
        limit: u64,
    ) -> AppResult<Vec<user::Model>> {
        if prefix.is_empty() {
            return Ok(vec![]);
        }

        let mut hidden: HashSet<String> =
            self.graph.blocked_ids(viewer_id).await?.into_iter().collect();
        hidden.extend(self.graph.blocked_by_ids(viewer_id).await?);

        let users = self
            .user_repo
            .search_by_username(prefix, limit.min(MAX_SEARCH_RESULTS))
            .await?;
        Ok(users
            .into_iter()
            .filter(|u| !hidden.contains(&u.id))
            .collect())
    }
}
