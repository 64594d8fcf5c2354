/// Account lifecycle: registration, sessions, password reset
///
/// Request and response shapes for the account workflows, plus the hook
/// invoked when the bootstrap account is created.

mod manager;

pub use manager::AccountManager;

use crate::db::models::{Account, Role};
use crate::error::AuthResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 20, message = "Username must be 1 to 20 characters"))]
    pub username: String,
    #[validate(length(min = 3, max = 80, message = "Name must be 3 to 80 characters"))]
    pub name: String,
    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    pub password: String,
    pub invite_code: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request (the refresh token presented at the transport boundary)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Password reset request (step one: ask for the emailed link)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

/// Password reset submission (step two: consume the emailed secret)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub user_id: String,
    pub token: String,
    pub password: String,
}

/// Public view of an account. Never carries the password hash or the
/// refresh-token list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub invited_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountProfile {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            username: account.username,
            name: account.name,
            role: account.role,
            invited_by: account.invited_by,
            created_at: account.created_at,
        }
    }
}

/// Credential pair returned to the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Session response (profile plus fresh credentials)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: AccountProfile,
    pub token: String,
    pub refresh_token: String,
}

impl SessionResponse {
    pub fn new(profile: AccountProfile, tokens: SessionTokens) -> Self {
        Self {
            user: profile,
            token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }
}

/// Hook invoked exactly once, for the bootstrap account: any data created
/// before the first registration gets assigned to it. Failures are logged
/// by the caller and never fail the registration.
#[async_trait]
pub trait OwnerlessDataMigrator: Send + Sync {
    async fn assign_to(&self, account_id: &str) -> AuthResult<()>;
}

/// Default migrator for deployments with nothing to claim
pub struct NoopMigrator;

#[async_trait]
impl OwnerlessDataMigrator for NoopMigrator {
    async fn assign_to(&self, account_id: &str) -> AuthResult<()> {
        tracing::debug!("no ownerless data to assign to bootstrap account {}", account_id);
        Ok(())
    }
}

/// First violation in field-declaration order, as a user-facing message
pub(crate) fn first_violation(errors: &ValidationErrors) -> String {
    for field in ["email", "username", "name", "password"] {
        if let Some(field_errors) = errors.field_errors().get(field) {
            if let Some(error) = field_errors.first() {
                if let Some(message) = &error.message {
                    return message.to_string();
                }
                return format!("Invalid value for {}", field);
            }
        }
    }
    "Invalid input".to_string()
}
