/// Invite management endpoints
use crate::{
    auth::AuthContext,
    context::AppContext,
    db::models::{Invite, Role},
    error::{AuthError, AuthResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Router,
};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/invites", get(list_invites).post(create_invites))
        .route("/api/invites/:id", delete(delete_invite))
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitesRequest {
    pub emails: Vec<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ListInvitesQuery {
    pub email: Option<String>,
}

/// POST /api/invites
///
/// Creates one invite per email, attributed to the caller. Re-inviting an
/// address overwrites the pending invite but keeps its code. Invite emails
/// are best-effort; the invites exist either way.
async fn create_invites(
    auth: AuthContext,
    State(ctx): State<AppContext>,
    Json(req): Json<CreateInvitesRequest>,
) -> AuthResult<(StatusCode, Json<Vec<Invite>>)> {
    if auth.account.role == Role::Child {
        return Err(AuthError::Unauthorized);
    }

    if req.emails.is_empty() {
        return Err(AuthError::Validation("At least one email is required".to_string()));
    }

    let mut invites = Vec::with_capacity(req.emails.len());
    for email in &req.emails {
        let invite = ctx
            .invite_manager
            .save_invite(email, Some(&auth.account.id), req.role)
            .await?;

        let register_link = format!("{}/register?invite={}", ctx.client_url(), invite.id);
        if let Err(e) = ctx
            .mailer
            .send_invite_email(email, &auth.account.name, &register_link)
            .await
        {
            tracing::warn!(invite_id = %invite.id, "failed to send invite email: {e}");
        }

        invites.push(invite);
    }

    tracing::info!(
        account_id = %auth.account.id,
        count = invites.len(),
        "invites created"
    );

    Ok((StatusCode::CREATED, Json(invites)))
}

/// GET /api/invites[?email=...]
async fn list_invites(
    _auth: AuthContext,
    State(ctx): State<AppContext>,
    Query(query): Query<ListInvitesQuery>,
) -> AuthResult<Json<Vec<Invite>>> {
    let invites = match query.email {
        Some(email) => ctx
            .invite_manager
            .get_invite_by_email(&email)
            .await?
            .into_iter()
            .collect(),
        None => ctx.invite_manager.list_invites().await?,
    };

    Ok(Json(invites))
}

/// DELETE /api/invites/:id
///
/// Idempotent: deleting an unknown or already-consumed invite succeeds.
async fn delete_invite(
    auth: AuthContext,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> AuthResult<Json<serde_json::Value>> {
    if auth.account.role == Role::Child {
        return Err(AuthError::Unauthorized);
    }

    ctx.invite_manager.delete_invite(&id).await?;

    Ok(Json(json!({ "message": "Invite deleted" })))
}
