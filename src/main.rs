/// Hearthgate - session and identity service
///
/// Token-based sessions with rotate-on-use refresh, invite-gated
/// registration, and emailed password resets over a SQLite store.

mod account;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod invite;
mod jobs;
mod mailer;
mod password;
mod server;
mod token;

use config::ServerConfig;
use context::AppContext;
use error::AuthResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AuthResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearthgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}
