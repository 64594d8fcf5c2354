use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::token_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Delete stale password reset tokens and expired refresh tokens
    /// (runs every hour)
    async fn token_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            info!("Running token cleanup");

            match tasks::cleanup_expired_tokens(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired tokens (reset + refresh)", count);
                    }
                }
                Err(e) => error!("Failed to cleanup expired tokens: {}", e),
            }
        }
    }

    /// Periodic database connectivity check (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
