//! Organization member management.
//!
//! Invitations are not e-mailed: the plaintext token is returned once to the
//! inviting admin, and only its hash is stored.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::auth::check_email;
use crate::api::error::{ApiError, FieldErrors};
use crate::api::types::{ApiContext, ApiJson, AuthUser};
use crate::crypto::generate_token;
use crate::db::repository::{
    delete_user_sessions, get_user, get_user_by_email, insert_invitation,
    list_invitations_by_organization, list_users_by_organization, set_user_active, utc_now,
};
use crate::models::{Invitation, User, UserRole};

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub invitation: Invitation,
    pub token: String,
}

/// `GET /api/users`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<User>>, ApiError> {
    let conn = ctx.db()?;
    Ok(Json(list_users_by_organization(&conn, &auth.organization_id())?))
}

/// `POST /api/users/invitations`
pub async fn invite(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(req): ApiJson<InviteRequest>,
) -> Result<(StatusCode, Json<InviteResponse>), ApiError> {
    auth.require_role(&[UserRole::Admin], "invite users")?;
    let mut errors = FieldErrors::new();
    check_email(&mut errors, "email", &req.email);
    errors.finish()?;

    let email = req.email.trim().to_string();
    let conn = ctx.db()?;
    if get_user_by_email(&conn, &email)?.is_some() {
        return Err(ApiError::Conflict("A user with this e-mail already exists".into()));
    }

    let token = generate_token();
    let now = utc_now();
    let invitation = Invitation {
        id: Uuid::new_v4(),
        organization_id: auth.organization_id(),
        email,
        role: req.role,
        token_hash: ctx.core.tokens().hash(&token),
        invited_by: auth.id(),
        created_at: now,
        expires_at: now + Duration::hours(ctx.core.config.invitation_ttl_hours),
        accepted_at: None,
    };
    insert_invitation(&conn, &invitation)?;
    tracing::info!(invitation_id = %invitation.id, role = %invitation.role, "Invitation created");
    Ok((StatusCode::CREATED, Json(InviteResponse { invitation, token })))
}

/// `GET /api/users/invitations`
pub async fn invitations(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Invitation>>, ApiError> {
    auth.require_role(&[UserRole::Admin], "view invitations")?;
    let conn = ctx.db()?;
    Ok(Json(list_invitations_by_organization(&conn, &auth.organization_id())?))
}

/// `POST /api/users/:id/deactivate`: also revokes every session of the user.
pub async fn deactivate(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    auth.require_role(&[UserRole::Admin], "deactivate users")?;
    if id == auth.id() {
        return Err(ApiError::BadRequest("You cannot deactivate your own account".into()));
    }
    let conn = ctx.db()?;
    let user = get_user(&conn, &id)?
        .filter(|u| u.organization_id == auth.organization_id())
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let tx = conn.unchecked_transaction()?;
    set_user_active(&tx, &id, false)?;
    let revoked = delete_user_sessions(&tx, &id)?;
    tx.commit()?;

    tracing::info!(user_id = %id, revoked, "User deactivated");
    Ok(Json(User {
        is_active: false,
        ..user
    }))
}
