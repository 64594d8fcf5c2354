/// Unified error types for Hearthgate
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which unique identity field(s) an existing account collides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateIdentity {
    Email,
    Username,
    Both,
}

impl std::fmt::Display for DuplicateIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            DuplicateIdentity::Email => "Email is in use",
            DuplicateIdentity::Username => "Username is in use",
            DuplicateIdentity::Both => "Email and Username are in use",
        };
        f.write_str(msg)
    }
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed input (email shape, password policy, missing fields)
    #[error("{0}")]
    Validation(String),

    /// Email and/or username already taken
    #[error("{0}")]
    Conflict(DuplicateIdentity),

    /// No invite exists for the supplied code
    #[error("Invite not found")]
    InviteNotFound,

    /// The invite's email differs from the submitted email
    #[error("Email does not match invite")]
    InviteMismatch,

    /// Bad, replayed, expired, or missing credential
    #[error("Unauthorized")]
    Unauthorized,

    /// Reset token absent or mismatched. Deliberately one kind for both
    /// so callers cannot tell which occurred.
    #[error("Invalid or expired password reset token")]
    InvalidOrExpired,

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistence failures
    #[error("Store error: {0}")]
    Database(#[from] sqlx::Error),

    /// Email delivery failures. Never aborts the workflow that triggered
    /// the send; surfaced to operators through logs only.
    #[error("Email delivery failed: {0}")]
    Delivery(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable identifier string for each error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "ValidationError",
            AuthError::Conflict(_) => "Conflict",
            AuthError::InviteNotFound => "InviteNotFound",
            AuthError::InviteMismatch => "InviteMismatch",
            AuthError::Unauthorized => "Unauthorized",
            AuthError::InvalidOrExpired => "InvalidOrExpiredToken",
            AuthError::NotFound(_) => "NotFound",
            AuthError::Database(_) => "StoreError",
            AuthError::Delivery(_) => "DeliveryError",
            AuthError::Internal(_) => "InternalError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::InviteNotFound
            | AuthError::InviteMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::InvalidOrExpired => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Database(_) | AuthError::Delivery(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Wire format for error responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert AuthError to HTTP response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            // Don't leak store or internal details to callers
            AuthError::Database(e) => {
                tracing::error!("store error: {e}");
                "A store error occurred".to_string()
            }
            AuthError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                "An internal error occurred".to_string()
            }
            AuthError::Delivery(msg) => {
                tracing::error!("delivery error surfaced to transport: {msg}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type AuthResult<T> = Result<T, AuthError>;
