/// Database models for accounts, tokens, and invites
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account role. Closed set; an invalid role is a construction-time error,
/// never a runtime string check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Parent,
    Child,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Parent => "PARENT",
            Role::Child => "CHILD",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    /// Account that invited this one, when registration went through an
    /// invite. Null for the bootstrap account and open signups.
    pub invited_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Active refresh token entry. One row per concurrent session; the slot
/// preserves issue order and survives rotation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefreshTokenRow {
    pub slot: i64,
    pub account_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Password reset token record. Only the hash of the reset secret is
/// persisted; the plaintext goes out in the emailed link.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub account_id: String,
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Pending invite. The id doubles as the invite code handed to the invitee.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invite {
    pub id: String,
    pub email: String,
    pub invited_by: Option<String>,
    pub role: Role,
    pub invited_at: DateTime<Utc>,
}
