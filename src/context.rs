/// Application context and dependency injection
use crate::{
    account::{AccountManager, NoopMigrator, OwnerlessDataMigrator},
    config::ServerConfig,
    db,
    error::{AuthError, AuthResult},
    invite::InviteManager,
    mailer::Mailer,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub invite_manager: Arc<InviteManager>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AuthResult<Self> {
        Self::with_migrator(config, Arc::new(NoopMigrator)).await
    }

    /// Create the context with a custom hook for claiming ownerless data
    /// when the bootstrap account registers
    pub async fn with_migrator(
        config: ServerConfig,
        migrator: Arc<dyn OwnerlessDataMigrator>,
    ) -> AuthResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let pool = db::create_pool(&config.storage.account_db, db::DatabaseOptions::default())
            .await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let config = Arc::new(config);
        let mailer = Arc::new(Mailer::new(config.email.clone())?);
        let invite_manager = Arc::new(InviteManager::new(pool.clone()));

        let account_manager = Arc::new(AccountManager::new(
            pool.clone(),
            Arc::clone(&config),
            InviteManager::new(pool.clone()),
            Arc::clone(&mailer),
            migrator,
        ));

        Ok(Self {
            config,
            db: pool,
            account_manager,
            invite_manager,
            mailer,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AuthResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AuthError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Base URL of the web client, used in emailed links
    pub fn client_url(&self) -> &str {
        &self.config.service.client_url
    }
}
