//! Error types for coterie.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Failure categories reported by the storage or remote-function transport.
///
/// The retry wrapper consults this instead of inspecting error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// The operation did not complete before its deadline.
    DeadlineExceeded,
    /// Quota or capacity was exhausted.
    ResourceExhausted,
    /// The backend is temporarily unreachable.
    Unavailable,
    /// Transport-level failure (connection reset, DNS, TLS).
    Network,
    /// The operation was aborted by a concurrent write.
    Aborted,
    /// The addressed record does not exist.
    NotFound,
    /// The caller lacks permission.
    PermissionDenied,
    /// The request was malformed.
    InvalidArgument,
    /// Unclassified backend failure.
    Internal,
}

impl BackendErrorKind {
    /// Whether a failure of this kind is worth retrying.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::DeadlineExceeded | Self::ResourceExhausted | Self::Unavailable | Self::Network
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Unavailable => "unavailable",
            Self::Network => "network",
            Self::Aborted => "aborted",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidArgument => "invalid_argument",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Blocked")]
    Blocked,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid participant count: expected 2, got {0}")]
    InvalidParticipantCount(usize),

    #[error("Cannot edit further: edit limit of {0} reached")]
    EditLimitReached(i32),

    #[error("Rate limited")]
    RateLimited,

    // === Server Errors ===
    #[error("Backend error ({kind}): {message}")]
    Backend {
        kind: BackendErrorKind,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build a classified backend error.
    pub fn backend(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self::Backend {
            kind,
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotFound(_)
            | Self::UserNotFound(_)
            | Self::CollectionNotFound(_)
            | Self::PostNotFound(_)
            | Self::MessageNotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::Blocked => StatusCode::FORBIDDEN,
            Self::BadRequest(_)
            | Self::Validation(_)
            | Self::InvalidParticipantCount(_)
            | Self::EditLimitReached(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 5xx Server Errors
            Self::Backend { kind, .. } => match kind {
                BackendErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
                BackendErrorKind::Unavailable
                | BackendErrorKind::Network
                | BackendErrorKind::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Database(_)
            | Self::Config(_)
            | Self::ExternalService(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::CollectionNotFound(_) => "COLLECTION_NOT_FOUND",
            Self::PostNotFound(_) => "POST_NOT_FOUND",
            Self::MessageNotFound(_) => "MESSAGE_NOT_FOUND",
            Self::Unauthorized => "NOT_AUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Blocked => "BLOCKED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::InvalidParticipantCount(_) => "INVALID_PARTICIPANT_COUNT",
            Self::EditLimitReached(_) => "CANNOT_EDIT_FURTHER",
            Self::RateLimited => "RATE_LIMITED",
            Self::Backend { .. } => "BACKEND_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Whether retrying the failed operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        for kind in [
            BackendErrorKind::DeadlineExceeded,
            BackendErrorKind::ResourceExhausted,
            BackendErrorKind::Unavailable,
            BackendErrorKind::Network,
        ] {
            assert!(AppError::backend(kind, "x").is_retryable(), "{kind}");
        }

        for kind in [
            BackendErrorKind::Aborted,
            BackendErrorKind::NotFound,
            BackendErrorKind::PermissionDenied,
            BackendErrorKind::InvalidArgument,
            BackendErrorKind::Internal,
        ] {
            assert!(!AppError::backend(kind, "x").is_retryable(), "{kind}");
        }
    }

    #[test]
    fn test_domain_errors_are_not_retryable() {
        // A message that looks like a network failure must not be classified as one.
        assert!(!AppError::Database("network unreachable".to_string()).is_retryable());
        assert!(!AppError::Unauthorized.is_retryable());
        assert!(!AppError::EditLimitReached(2).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::InvalidParticipantCount(3).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::AlreadyExists("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::backend(BackendErrorKind::Unavailable, "down").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::Blocked.error_code(), "BLOCKED");
        assert_eq!(AppError::EditLimitReached(2).error_code(), "CANNOT_EDIT_FURTHER");
    }
}
