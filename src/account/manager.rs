/// Account workflows over the credential store
///
/// Registration, login/logout/refresh, and password reset. All shared
/// state lives in SQLite; every mutation that has to be race-resistant
/// (refresh rotation in particular) is a single statement.
use crate::{
    account::{
        AccountProfile, OwnerlessDataMigrator, RegisterRequest, SessionTokens, first_violation,
    },
    config::ServerConfig,
    db::models::{Account, PasswordResetToken, Role},
    error::{AuthError, AuthResult, DuplicateIdentity},
    invite::InviteManager,
    mailer::Mailer,
    password,
    token::TokenService,
};
use chrono::{Duration, Utc};
use rand::RngCore;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Length in bytes of the plaintext secret embedded in reset links
const RESET_SECRET_BYTES: usize = 32;

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    tokens: TokenService,
    invites: InviteManager,
    mailer: Arc<Mailer>,
    migrator: Arc<dyn OwnerlessDataMigrator>,
}

impl AccountManager {
    pub fn new(
        db: SqlitePool,
        config: Arc<ServerConfig>,
        invites: InviteManager,
        mailer: Arc<Mailer>,
        migrator: Arc<dyn OwnerlessDataMigrator>,
    ) -> Self {
        let tokens = TokenService::new(&config.authentication);
        Self {
            db,
            config,
            tokens,
            invites,
            mailer,
            migrator,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    // ==================== Registration ====================

    /// Register a new account.
    ///
    /// The first account ever created becomes ADMIN with no inviter and
    /// skips invite validation entirely. Otherwise, when invites are
    /// required, role and inviter come from the matching invite; when they
    /// are not, the account defaults to PARENT with no inviter.
    ///
    /// Registration implicitly opens a session: the returned pair carries
    /// an access token and the refresh token appended to the new account.
    pub async fn register(
        &self,
        req: RegisterRequest,
    ) -> AuthResult<(AccountProfile, SessionTokens)> {
        if let Err(errors) = req.validate() {
            return Err(AuthError::Validation(first_violation(&errors)));
        }

        self.check_identity_free(&req.email, &req.username).await?;

        // Atomic count query rather than cached process state, so the
        // bootstrap decision stays correct across restarts. Two truly
        // concurrent cold-start registrations can still both observe zero;
        // the unique columns keep that from producing duplicate accounts.
        let first_account = self.count_accounts().await? == 0;

        let mut consumed_invite: Option<String> = None;
        let (role, invited_by) = if first_account {
            (Role::Admin, None)
        } else if self.config.invites.required {
            let code = req.invite_code.as_deref().ok_or(AuthError::InviteNotFound)?;
            let invite = self.invites.get_invite(code).await?;

            // Case-sensitive, matching the emailed invite exactly
            if invite.email != req.email {
                return Err(AuthError::InviteMismatch);
            }

            consumed_invite = Some(invite.id);
            (invite.role, invite.invited_by)
        } else {
            (Role::Parent, None)
        };

        let account = self
            .create_account(&req, role, invited_by.as_deref())
            .await?;
        let tokens = self.open_session(&account.id).await?;

        // The account is committed. Anything that fails from here on is a
        // documented partial state: log it for the operator, never roll
        // back or retry.
        if let Some(invite_id) = consumed_invite {
            if let Err(e) = self.invites.delete_invite(&invite_id).await {
                tracing::error!(
                    invite_id = %invite_id,
                    account_id = %account.id,
                    "failed to consume invite after registration: {e}"
                );
            }
        }

        if first_account {
            tracing::info!(account_id = %account.id, "bootstrap account registered as ADMIN");
            if let Err(e) = self.migrator.assign_to(&account.id).await {
                tracing::error!(
                    account_id = %account.id,
                    "ownerless-data migration for bootstrap account failed: {e}"
                );
            }
        }

        Ok((account.into(), tokens))
    }

    /// Fail with a Conflict naming exactly which field(s) collide
    async fn check_identity_free(&self, email: &str, username: &str) -> AuthResult<()> {
        let existing = sqlx::query_as::<_, Account>(
            "SELECT id, email, username, name, password_hash, role, invited_by, created_at
             FROM account WHERE email = ?1 OR username = ?2 LIMIT 1",
        )
        .bind(email)
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        if let Some(existing) = existing {
            let which = match (existing.email == email, existing.username == username) {
                (true, true) => DuplicateIdentity::Both,
                (true, false) => DuplicateIdentity::Email,
                _ => DuplicateIdentity::Username,
            };
            return Err(AuthError::Conflict(which));
        }

        Ok(())
    }

    async fn count_accounts(&self) -> AuthResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account")
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    /// Persist the account row. The refresh-token list starts empty; the
    /// implicit session is opened by the caller afterwards.
    async fn create_account(
        &self,
        req: &RegisterRequest,
        role: Role,
        invited_by: Option<&str>,
    ) -> AuthResult<Account> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let password_hash = password::hash(&req.password)?;

        sqlx::query(
            "INSERT INTO account (id, email, username, name, password_hash, role, invited_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&id)
        .bind(&req.email)
        .bind(&req.username)
        .bind(&req.name)
        .bind(&password_hash)
        .bind(role)
        .bind(invited_by)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(Account {
            id,
            email: req.email.clone(),
            username: req.username.clone(),
            name: req.name.clone(),
            password_hash,
            role,
            invited_by: invited_by.map(str::to_string),
            created_at: now,
        })
    }

    // ==================== Sessions ====================

    /// Authenticate with email and password and open a session.
    ///
    /// "No such account" and "wrong password" collapse into the same
    /// Unauthorized.
    pub async fn login(
        &self,
        email: &str,
        plain_password: &str,
    ) -> AuthResult<(AccountProfile, SessionTokens)> {
        let account = self
            .find_by_email(email)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !password::verify(plain_password, &account.password_hash) {
            return Err(AuthError::Unauthorized);
        }

        let tokens = self.open_session(&account.id).await?;
        Ok((account.into(), tokens))
    }

    /// Issue a refresh token, append it to the account's list, and issue an
    /// access token. Multiple concurrent sessions are simply multiple rows.
    async fn open_session(&self, account_id: &str) -> AuthResult<SessionTokens> {
        let refresh_token = self.tokens.issue_refresh_token(account_id)?;

        sqlx::query(
            "INSERT INTO refresh_token (account_id, token, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(account_id)
        .bind(&refresh_token)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        let access_token = self.tokens.issue_access_token(account_id)?;

        Ok(SessionTokens {
            access_token,
            refresh_token,
        })
    }

    /// Remove the presented refresh token from the account's list.
    /// Idempotent: a token that is already gone counts as logged out.
    pub async fn logout(&self, account_id: &str, refresh_token: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM refresh_token WHERE account_id = ?1 AND token = ?2")
            .bind(account_id)
            .bind(refresh_token)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Exchange a refresh token for a fresh access/refresh pair.
    ///
    /// Rotation is replace-at-key in one statement: the consumed token's
    /// row is rewritten with the new value, keeping its slot. Of two
    /// concurrent refreshes of the same token, exactly one update matches
    /// a row; the other observes zero rows affected and fails.
    pub async fn refresh(
        &self,
        presented_token: &str,
    ) -> AuthResult<(AccountProfile, SessionTokens)> {
        let account_id = self.tokens.verify_refresh_token(presented_token)?;

        let account = self
            .get_account_opt(&account_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        let new_refresh = self.tokens.issue_refresh_token(&account_id)?;
        let rotated = sqlx::query(
            "UPDATE refresh_token SET token = ?1, created_at = ?2
             WHERE account_id = ?3 AND token = ?4",
        )
        .bind(&new_refresh)
        .bind(Utc::now())
        .bind(&account_id)
        .bind(presented_token)
        .execute(&self.db)
        .await?;

        // A validly signed token that is absent from the list is a replay
        // of a value that has already been rotated out.
        if rotated.rows_affected() == 0 {
            tracing::warn!(account_id = %account_id, "refresh token replay or unknown token rejected");
            return Err(AuthError::Unauthorized);
        }

        let access_token = self.tokens.issue_access_token(&account_id)?;

        Ok((
            account.into(),
            SessionTokens {
                access_token,
                refresh_token: new_refresh,
            },
        ))
    }

    // ==================== Password reset ====================

    /// Request a password reset link for an email address.
    ///
    /// Whether "unknown email" is revealed to the end user is the transport
    /// layer's policy call; this returns an explicit NotFound so that the
    /// decision can be made there.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let (account, secret) = self.create_reset_token(email).await?;

        let link = format!(
            "{}/reset-password?token={}&userId={}",
            self.config.service.client_url, secret, account.id
        );

        // Best-effort: the reset token exists whether or not the email
        // goes out, and the failure is the operator's to see.
        if let Err(e) = self
            .mailer
            .send_password_reset_email(&account.email, &account.name, &link)
            .await
        {
            tracing::warn!(account_id = %account.id, "failed to send password reset email: {e}");
        }

        Ok(())
    }

    /// Supersede any prior reset token for the account and store the hash
    /// of a fresh random secret. Returns the plaintext secret for the
    /// emailed link.
    async fn create_reset_token(&self, email: &str) -> AuthResult<(Account, String)> {
        let account = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::NotFound("Email does not exist".to_string()))?;

        sqlx::query("DELETE FROM password_reset_token WHERE account_id = ?1")
            .bind(&account.id)
            .execute(&self.db)
            .await?;

        let mut secret_bytes = [0u8; RESET_SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let secret = hex::encode(secret_bytes);
        let secret_hash = password::hash(&secret)?;

        sqlx::query(
            "INSERT INTO password_reset_token (account_id, secret_hash, created_at)
             VALUES (?1, ?2, ?3)",
        )
        .bind(&account.id)
        .bind(&secret_hash)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok((account, secret))
    }

    /// Consume a reset token and set a new password.
    ///
    /// Absent record and secret mismatch are the same InvalidOrExpired on
    /// purpose; callers cannot tell which occurred.
    pub async fn reset_password(
        &self,
        account_id: &str,
        secret: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let record = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT account_id, secret_hash, created_at
             FROM password_reset_token WHERE account_id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AuthError::InvalidOrExpired)?;

        if !password::verify(secret, &record.secret_hash) {
            return Err(AuthError::InvalidOrExpired);
        }

        let account = self
            .get_account_opt(account_id)
            .await?
            .ok_or(AuthError::InvalidOrExpired)?;

        let password_hash = password::hash(new_password)?;
        sqlx::query("UPDATE account SET password_hash = ?1 WHERE id = ?2")
            .bind(&password_hash)
            .bind(account_id)
            .execute(&self.db)
            .await?;

        if let Err(e) = self
            .mailer
            .send_password_changed_email(&account.email, &account.name)
            .await
        {
            tracing::warn!(account_id, "failed to send password change notice: {e}");
        }

        // Single-use: the token goes away once it has matched
        sqlx::query("DELETE FROM password_reset_token WHERE account_id = ?1")
            .bind(account_id)
            .execute(&self.db)
            .await?;

        tracing::info!(account_id, "password reset completed");

        Ok(())
    }

    // ==================== Lookups & maintenance ====================

    /// Load an account by id
    pub async fn get_account(&self, account_id: &str) -> AuthResult<Account> {
        self.get_account_opt(account_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Account not found".to_string()))
    }

    async fn get_account_opt(&self, account_id: &str) -> AuthResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, username, name, password_hash, role, invited_by, created_at
             FROM account WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, username, name, password_hash, role, invited_by, created_at
             FROM account WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    /// Delete stale reset tokens and expired refresh tokens. Expired
    /// refresh tokens would fail signature verification anyway; this keeps
    /// the tables from growing without bound and makes stale reset tokens
    /// actually invalid. Returns (reset_tokens_deleted, refresh_tokens_deleted).
    pub async fn cleanup_expired(&self) -> AuthResult<(u64, u64)> {
        let now = Utc::now();
        let reset_cutoff = now - Duration::seconds(self.config.authentication.reset_ttl_secs);
        let refresh_cutoff = now - Duration::seconds(self.config.authentication.refresh_ttl_secs);

        let reset = sqlx::query("DELETE FROM password_reset_token WHERE created_at < ?1")
            .bind(reset_cutoff)
            .execute(&self.db)
            .await?;

        let refresh = sqlx::query("DELETE FROM refresh_token WHERE created_at < ?1")
            .bind(refresh_cutoff)
            .execute(&self.db)
            .await?;

        Ok((reset.rows_affected(), refresh.rows_affected()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AuthConfig, InviteConfig, LoggingConfig, ServiceConfig, StorageConfig,
    };
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingMigrator {
        calls: AtomicUsize,
    }

    impl RecordingMigrator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OwnerlessDataMigrator for RecordingMigrator {
        async fn assign_to(&self, _account_id: &str) -> AuthResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_config(invite_required: bool) -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 3080,
                client_url: "http://localhost:3080".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                account_db: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                access_secret: "access-secret-for-testing-0123456789abcdef".to_string(),
                refresh_secret: "refresh-secret-for-testing-0123456789abcdef".to_string(),
                access_ttl_secs: 900,
                refresh_ttl_secs: 2_592_000,
                reset_ttl_secs: 3600,
            },
            email: None,
            invites: InviteConfig {
                required: invite_required,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    async fn test_manager(invite_required: bool) -> (AccountManager, Arc<RecordingMigrator>) {
        // One connection so the in-memory database is shared
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&db).await.unwrap();

        let migrator = RecordingMigrator::new();
        let manager = AccountManager::new(
            db.clone(),
            Arc::new(test_config(invite_required)),
            InviteManager::new(db),
            Arc::new(Mailer::new(None).unwrap()),
            migrator.clone(),
        );
        (manager, migrator)
    }

    fn register_req(email: &str, username: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            name: "Test Person".to_string(),
            password: "longenough1".to_string(),
            invite_code: None,
        }
    }

    async fn refresh_token_count(manager: &AccountManager, account_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM refresh_token WHERE account_id = ?1")
            .bind(account_id)
            .fetch_one(&manager.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_account_bootstraps_as_admin() {
        // Invites required, no code supplied: the bootstrap account skips
        // the invite check entirely
        let (manager, migrator) = test_manager(true).await;

        let (profile, tokens) = manager.register(register_req("a@x.com", "a")).await.unwrap();

        assert_eq!(profile.role, Role::Admin);
        assert_eq!(profile.invited_by, None);
        assert!(!tokens.access_token.is_empty());
        assert_eq!(migrator.call_count(), 1);

        // The implicit session put one refresh token in the list
        assert_eq!(refresh_token_count(&manager, &profile.id).await, 1);
    }

    #[tokio::test]
    async fn test_migrator_runs_only_for_bootstrap() {
        let (manager, migrator) = test_manager(false).await;

        manager.register(register_req("a@x.com", "a")).await.unwrap();
        manager.register(register_req("b@x.com", "b")).await.unwrap();

        assert_eq!(migrator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_open_signup_defaults_to_parent() {
        let (manager, _) = test_manager(false).await;

        manager.register(register_req("a@x.com", "a")).await.unwrap();
        let (profile, _) = manager.register(register_req("b@x.com", "b")).await.unwrap();

        assert_eq!(profile.role, Role::Parent);
        assert_eq!(profile.invited_by, None);
    }

    #[tokio::test]
    async fn test_conflict_messages_name_the_field() {
        let (manager, _) = test_manager(false).await;
        manager.register(register_req("a@x.com", "a")).await.unwrap();

        let err = manager
            .register(register_req("a@x.com", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(DuplicateIdentity::Email)));
        assert_eq!(err.to_string(), "Email is in use");

        let err = manager
            .register(register_req("other@x.com", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(DuplicateIdentity::Username)));
        assert_eq!(err.to_string(), "Username is in use");

        let err = manager
            .register(register_req("a@x.com", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(DuplicateIdentity::Both)));
        assert_eq!(err.to_string(), "Email and Username are in use");

        // No second account appeared
        assert_eq!(manager.count_accounts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_mutation() {
        let (manager, _) = test_manager(false).await;

        let err = manager
            .register(register_req("not-an-email", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(err.to_string(), "Email must be a valid email address");

        let mut short_password = register_req("a@x.com", "a");
        short_password.password = "short".to_string();
        let err = manager.register(short_password).await.unwrap_err();
        assert_eq!(err.to_string(), "Password must be 8 to 128 characters");

        assert_eq!(manager.count_accounts().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_single_character_username_is_valid() {
        let (manager, _) = test_manager(false).await;

        // One character is the floor; empty is not
        let (profile, _) = manager.register(register_req("a@x.com", "a")).await.unwrap();
        assert_eq!(profile.username, "a");

        let err = manager
            .register(register_req("b@x.com", ""))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Username must be 1 to 20 characters");
    }

    #[tokio::test]
    async fn test_invite_gated_registration() {
        let (manager, _) = test_manager(true).await;

        let (admin, _) = manager.register(register_req("a@x.com", "a")).await.unwrap();

        let invite = manager
            .invites
            .save_invite("b@x.com", Some(&admin.id), Role::Parent)
            .await
            .unwrap();

        let mut req = register_req("b@x.com", "b");
        req.invite_code = Some(invite.id.clone());
        let (profile, _) = manager.register(req).await.unwrap();

        assert_eq!(profile.role, Role::Parent);
        assert_eq!(profile.invited_by.as_deref(), Some(admin.id.as_str()));

        // The invite was consumed
        assert!(matches!(
            manager.invites.get_invite(&invite.id).await,
            Err(AuthError::InviteNotFound)
        ));

        // Redeeming the consumed code again fails
        let mut req = register_req("c@x.com", "c");
        req.invite_code = Some(invite.id);
        assert!(matches!(
            manager.register(req).await,
            Err(AuthError::InviteNotFound)
        ));
    }

    #[tokio::test]
    async fn test_invite_email_mismatch_leaves_invite_live() {
        let (manager, _) = test_manager(true).await;

        let (admin, _) = manager.register(register_req("a@x.com", "a")).await.unwrap();
        let invite = manager
            .invites
            .save_invite("b@x.com", Some(&admin.id), Role::Child)
            .await
            .unwrap();

        let mut req = register_req("c@x.com", "c");
        req.invite_code = Some(invite.id.clone());
        assert!(matches!(
            manager.register(req).await,
            Err(AuthError::InviteMismatch)
        ));

        // A failed registration never burns the invite
        assert!(manager.invites.get_invite(&invite.id).await.is_ok());
        assert_eq!(manager.count_accounts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_invite_code_when_required() {
        let (manager, _) = test_manager(true).await;
        manager.register(register_req("a@x.com", "a")).await.unwrap();

        assert!(matches!(
            manager.register(register_req("b@x.com", "b")).await,
            Err(AuthError::InviteNotFound)
        ));
    }

    #[tokio::test]
    async fn test_login_appends_refresh_token() {
        let (manager, _) = test_manager(false).await;
        let (profile, _) = manager.register(register_req("a@x.com", "a")).await.unwrap();

        let (logged_in, tokens) = manager.login("a@x.com", "longenough1").await.unwrap();
        assert_eq!(logged_in.id, profile.id);

        // Registration session + login session
        assert_eq!(refresh_token_count(&manager, &profile.id).await, 2);

        // The issued token is a member of the stored list
        let stored: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refresh_token WHERE account_id = ?1 AND token = ?2",
        )
        .bind(&profile.id)
        .bind(&tokens.refresh_token)
        .fetch_one(&manager.db)
        .await
        .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let (manager, _) = test_manager(false).await;
        manager.register(register_req("a@x.com", "a")).await.unwrap();

        assert!(matches!(
            manager.login("a@x.com", "wrong-password").await,
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            manager.login("nobody@x.com", "longenough1").await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_in_place() {
        let (manager, _) = test_manager(false).await;
        let (profile, _) = manager.register(register_req("a@x.com", "a")).await.unwrap();
        let (_, session) = manager.login("a@x.com", "longenough1").await.unwrap();

        let r1 = session.refresh_token;
        let slot_before: i64 = sqlx::query_scalar(
            "SELECT slot FROM refresh_token WHERE account_id = ?1 AND token = ?2",
        )
        .bind(&profile.id)
        .bind(&r1)
        .fetch_one(&manager.db)
        .await
        .unwrap();

        let (refreshed, rotated) = manager.refresh(&r1).await.unwrap();
        assert_eq!(refreshed.id, profile.id);

        let r2 = rotated.refresh_token;
        assert_ne!(r1, r2);

        // Same slot, rewritten in place: the list did not grow
        assert_eq!(refresh_token_count(&manager, &profile.id).await, 2);
        let row = sqlx::query_as::<_, crate::db::models::RefreshTokenRow>(
            "SELECT slot, account_id, token, created_at
             FROM refresh_token WHERE account_id = ?1 AND token = ?2",
        )
        .bind(&profile.id)
        .bind(&r2)
        .fetch_one(&manager.db)
        .await
        .unwrap();
        assert_eq!(row.slot, slot_before);

        // The consumed value is single-use
        assert!(matches!(manager.refresh(&r1).await, Err(AuthError::Unauthorized)));

        // The replacement works
        assert!(manager.refresh(&r2).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejects_garbage_and_foreign_tokens() {
        let (manager, _) = test_manager(false).await;
        manager.register(register_req("a@x.com", "a")).await.unwrap();

        assert!(matches!(
            manager.refresh("not-a-jwt").await,
            Err(AuthError::Unauthorized)
        ));

        // Validly signed but never persisted (e.g. stolen from a logout race)
        let loose = manager.tokens.issue_refresh_token("no-such-account").unwrap();
        assert!(matches!(manager.refresh(&loose).await, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (manager, _) = test_manager(false).await;
        let (profile, session) = manager.register(register_req("a@x.com", "a")).await.unwrap();

        manager.logout(&profile.id, &session.refresh_token).await.unwrap();
        assert_eq!(refresh_token_count(&manager, &profile.id).await, 0);

        // Already logged out is still success
        manager.logout(&profile.id, &session.refresh_token).await.unwrap();
        manager.logout(&profile.id, "never-issued").await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_request_unknown_email() {
        let (manager, _) = test_manager(false).await;

        assert!(matches!(
            manager.request_password_reset("nobody@x.com").await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_second_reset_request_supersedes_first() {
        let (manager, _) = test_manager(false).await;
        manager.register(register_req("a@x.com", "a")).await.unwrap();

        manager.request_password_reset("a@x.com").await.unwrap();
        manager.request_password_reset("a@x.com").await.unwrap();

        let live: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_reset_token")
            .fetch_one(&manager.db)
            .await
            .unwrap();
        assert_eq!(live, 1);
    }

    #[tokio::test]
    async fn test_reset_consumes_token_and_changes_password() {
        let (manager, _) = test_manager(false).await;
        let (profile, _) = manager.register(register_req("a@x.com", "a")).await.unwrap();

        let (_, secret) = manager.create_reset_token("a@x.com").await.unwrap();

        // Wrong secret: indistinguishable from an absent token
        assert!(matches!(
            manager.reset_password(&profile.id, "wrong-secret", "newpassword1").await,
            Err(AuthError::InvalidOrExpired)
        ));

        manager
            .reset_password(&profile.id, &secret, "newpassword1")
            .await
            .unwrap();

        assert!(manager.login("a@x.com", "newpassword1").await.is_ok());
        assert!(matches!(
            manager.login("a@x.com", "longenough1").await,
            Err(AuthError::Unauthorized)
        ));

        // Single-use: the second attempt finds nothing
        assert!(matches!(
            manager.reset_password(&profile.id, &secret, "another-pass1").await,
            Err(AuthError::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_cleanup_removes_stale_tokens() {
        let (manager, _) = test_manager(false).await;
        let (profile, _) = manager.register(register_req("a@x.com", "a")).await.unwrap();

        // Plant a reset token and a refresh token well past their windows
        let stale = Utc::now() - Duration::days(90);
        sqlx::query(
            "INSERT INTO password_reset_token (account_id, secret_hash, created_at)
             VALUES (?1, ?2, ?3)",
        )
        .bind(&profile.id)
        .bind("hash")
        .bind(stale)
        .execute(&manager.db)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO refresh_token (account_id, token, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&profile.id)
        .bind("stale-refresh-token")
        .bind(stale)
        .execute(&manager.db)
        .await
        .unwrap();

        let (reset_deleted, refresh_deleted) = manager.cleanup_expired().await.unwrap();
        assert_eq!(reset_deleted, 1);
        assert_eq!(refresh_deleted, 1);

        // The registration session's fresh token survives
        assert_eq!(refresh_token_count(&manager, &profile.id).await, 1);
    }
}
