/// Invite management
///
/// Invites are single-use and scoped to an email address. The record id is
/// the invite code sent to the invitee. Saving an invite for an email that
/// already has one overwrites the pending invite in place, keeping its id,
/// so there is never more than one live invite per email.
use crate::db::models::{Invite, Role};
use crate::error::{AuthError, AuthResult};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Invite manager
#[derive(Clone)]
pub struct InviteManager {
    db: SqlitePool,
}

impl InviteManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create or overwrite the pending invite for an email address
    pub async fn save_invite(
        &self,
        email: &str,
        invited_by: Option<&str>,
        role: Role,
    ) -> AuthResult<Invite> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO invite (id, email, invited_by, role, invited_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(email) DO UPDATE SET
                invited_by = excluded.invited_by,
                role = excluded.role,
                invited_at = excluded.invited_at
            "#,
        )
        .bind(&id)
        .bind(email)
        .bind(invited_by)
        .bind(role)
        .bind(now)
        .execute(&self.db)
        .await?;

        // On conflict the original id survives; re-read to return the row
        // as stored rather than fabricating one.
        self.get_invite_by_email(email)
            .await?
            .ok_or_else(|| AuthError::Internal("Invite vanished after upsert".to_string()))
    }

    /// Look up an invite by its code
    pub async fn get_invite(&self, id: &str) -> AuthResult<Invite> {
        sqlx::query_as::<_, Invite>(
            "SELECT id, email, invited_by, role, invited_at FROM invite WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AuthError::InviteNotFound)
    }

    /// Look up the pending invite for an email address, if any
    pub async fn get_invite_by_email(&self, email: &str) -> AuthResult<Option<Invite>> {
        let invite = sqlx::query_as::<_, Invite>(
            "SELECT id, email, invited_by, role, invited_at FROM invite WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        Ok(invite)
    }

    /// Delete an invite. Idempotent: deleting an absent invite is not an
    /// error.
    pub async fn delete_invite(&self, id: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM invite WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// List all pending invites, newest first
    pub async fn list_invites(&self) -> AuthResult<Vec<Invite>> {
        let invites = sqlx::query_as::<_, Invite>(
            "SELECT id, email, invited_by, role, invited_at FROM invite ORDER BY invited_at DESC",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(invites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_manager() -> InviteManager {
        // One connection so the in-memory database is shared
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        InviteManager::new(db)
    }

    #[tokio::test]
    async fn test_save_and_get_invite() {
        let manager = test_manager().await;

        let invite = manager
            .save_invite("kid@example.com", None, Role::Child)
            .await
            .unwrap();

        assert_eq!(invite.email, "kid@example.com");
        assert_eq!(invite.role, Role::Child);

        let fetched = manager.get_invite(&invite.id).await.unwrap();
        assert_eq!(fetched.id, invite.id);
        assert_eq!(fetched.email, "kid@example.com");
    }

    #[tokio::test]
    async fn test_get_unknown_invite() {
        let manager = test_manager().await;
        assert!(matches!(
            manager.get_invite("no-such-code").await,
            Err(AuthError::InviteNotFound)
        ));
    }

    #[tokio::test]
    async fn test_second_invite_overwrites_first() {
        let manager = test_manager().await;

        let first = manager
            .save_invite("kid@example.com", None, Role::Child)
            .await
            .unwrap();
        let second = manager
            .save_invite("kid@example.com", None, Role::Parent)
            .await
            .unwrap();

        // Upsert keeps the original code but takes the new attributes
        assert_eq!(second.id, first.id);
        assert_eq!(second.role, Role::Parent);

        let all = manager.list_invites().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let manager = test_manager().await;

        let invite = manager
            .save_invite("kid@example.com", None, Role::Child)
            .await
            .unwrap();

        manager.delete_invite(&invite.id).await.unwrap();
        assert!(manager.get_invite(&invite.id).await.is_err());

        // Deleting again reports success
        manager.delete_invite(&invite.id).await.unwrap();
    }
}
