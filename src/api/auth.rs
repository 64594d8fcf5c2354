/// Authentication endpoints: registration, sessions, password reset
use crate::{
    account::{
        AccountProfile, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest,
        RequestPasswordResetRequest, ResetPasswordRequest, SessionResponse,
    },
    auth::AuthContext,
    context::AppContext,
    error::AuthResult,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/requestPasswordReset", post(request_password_reset))
        .route("/api/auth/resetPassword", post(reset_password))
        .route("/api/auth/me", get(me))
}

/// POST /api/auth/register
///
/// Registration opens a session, so the response carries tokens just like
/// a login does.
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<(StatusCode, Json<SessionResponse>)> {
    let (profile, tokens) = ctx.account_manager.register(req).await?;

    tracing::info!(account_id = %profile.id, "account registered");

    Ok((StatusCode::CREATED, Json(SessionResponse::new(profile, tokens))))
}

/// POST /api/auth/login
async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<SessionResponse>> {
    let (profile, tokens) = ctx.account_manager.login(&req.email, &req.password).await?;

    Ok(Json(SessionResponse::new(profile, tokens)))
}

/// POST /api/auth/refresh
///
/// The refresh token itself authenticates this call; no access token is
/// required, since the whole point is that the old one may have expired.
async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshRequest>,
) -> AuthResult<Json<SessionResponse>> {
    let (profile, tokens) = ctx.account_manager.refresh(&req.refresh_token).await?;

    Ok(Json(SessionResponse::new(profile, tokens)))
}

/// POST /api/auth/logout
async fn logout(
    auth: AuthContext,
    State(ctx): State<AppContext>,
    Json(req): Json<LogoutRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.account_manager
        .logout(&auth.account.id, &req.refresh_token)
        .await?;

    Ok(Json(json!({ "message": "Logged out" })))
}

/// POST /api/auth/requestPasswordReset
async fn request_password_reset(
    State(ctx): State<AppContext>,
    Json(req): Json<RequestPasswordResetRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.account_manager.request_password_reset(&req.email).await?;

    Ok(Json(json!({ "message": "Password reset email sent" })))
}

/// POST /api/auth/resetPassword
async fn reset_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    ctx.account_manager
        .reset_password(&req.user_id, &req.token, &req.password)
        .await?;

    Ok(Json(json!({ "message": "Password updated" })))
}

/// GET /api/auth/me
async fn me(auth: AuthContext) -> Json<AccountProfile> {
    Json(auth.account.into())
}
