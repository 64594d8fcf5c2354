/// Background task implementations
use crate::{context::AppContext, error::AuthResult};

/// Delete tokens past their validity windows
pub async fn cleanup_expired_tokens(ctx: &AppContext) -> AuthResult<u64> {
    let (reset_deleted, refresh_deleted) = ctx.account_manager.cleanup_expired().await?;

    Ok(reset_deleted + refresh_deleted)
}

/// Verify database connectivity
pub async fn health_check(ctx: &AppContext) -> AuthResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    Ok(())
}
