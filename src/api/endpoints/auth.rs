//! Account and session endpoints.
//!
//! `POST /api/auth/register` (public): new organization plus its first admin
//! `POST /api/auth/login` (public): e-mail + password for a bearer token
//! `POST /api/auth/accept-invitation` (public): invited user sets a password
//! `POST /api/auth/logout` (protected): revoke the presented token
//! `GET /api/auth/me` (protected): caller and their organization

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, FieldErrors};
use crate::api::types::{ApiContext, ApiJson, AuthUser};
use crate::crypto::{generate_token, hash_password_with, verify_password};
use crate::db::repository::{
    delete_session, get_invitation_by_token_hash, get_organization, get_user_credentials,
    insert_organization, insert_session, insert_user, mark_invitation_accepted, update_last_login,
    utc_now,
};
use crate::models::{OrgStatus, OrgType, Organization, Session, User, UserRole};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub org_type: OrgType,
    #[serde(default)]
    pub npi: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub npi: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub organization: NewOrganization,
    pub admin: NewAccount,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub npi: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: NaiveDateTime,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub session: SessionResponse,
    pub organization: Organization,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub organization: Organization,
}

pub(crate) fn check_email(errors: &mut FieldErrors, field: &str, email: &str) {
    let email = email.trim();
    if email.is_empty() {
        errors.add(field, "is required");
    } else if !email.contains('@') || email.contains(char::is_whitespace) {
        errors.add(field, "must be an e-mail address");
    }
}

fn check_account(errors: &mut FieldErrors, prefix: &str, password: &str, first: &str, last: &str) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            &format!("{prefix}password"),
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        );
    }
    errors.require(&format!("{prefix}first_name"), first);
    errors.require(&format!("{prefix}last_name"), last);
}

/// PBKDF2 is deliberately slow; keep it off the async workers.
async fn hash_off_thread(ctx: &ApiContext, password: String) -> Result<String, ApiError> {
    let iterations = ctx.core.config.password_iterations;
    Ok(tokio::task::spawn_blocking(move || hash_password_with(&password, iterations)).await?)
}

/// Create a session row and return the plaintext token to the caller.
fn issue_session(ctx: &ApiContext, conn: &Connection, user: User) -> Result<SessionResponse, ApiError> {
    let token = generate_token();
    let now = utc_now();
    let expires_at = now + Duration::hours(ctx.core.config.session_ttl_hours);
    insert_session(
        conn,
        &Session {
            token_hash: ctx.core.tokens().hash(&token),
            user_id: user.id,
            created_at: now,
            expires_at,
        },
    )?;
    update_last_login(conn, &user.id, &now)?;
    Ok(SessionResponse {
        token,
        expires_at,
        user: User {
            last_login_at: Some(now),
            ..user
        },
    })
}

/// `POST /api/auth/register`
pub async fn register(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let mut errors = FieldErrors::new();
    errors.require("organization.name", &req.organization.name);
    check_email(&mut errors, "admin.email", &req.admin.email);
    check_account(
        &mut errors,
        "admin.",
        &req.admin.password,
        &req.admin.first_name,
        &req.admin.last_name,
    );
    errors.finish()?;

    let password_hash = hash_off_thread(&ctx, req.admin.password.clone()).await?;
    let now = utc_now();
    let organization = Organization {
        id: Uuid::new_v4(),
        name: req.organization.name.trim().to_string(),
        org_type: req.organization.org_type,
        npi: req.organization.npi,
        address: req.organization.address,
        phone: req.organization.phone,
        status: OrgStatus::Active,
        created_at: now,
    };
    let admin = User {
        id: Uuid::new_v4(),
        organization_id: organization.id,
        email: req.admin.email.trim().to_string(),
        first_name: req.admin.first_name.trim().to_string(),
        last_name: req.admin.last_name.trim().to_string(),
        role: UserRole::Admin,
        npi: req.admin.npi,
        specialty: req.admin.specialty,
        is_active: true,
        created_at: now,
        last_login_at: None,
    };

    let conn = ctx.db()?;
    let tx = conn.unchecked_transaction()?;
    insert_organization(&tx, &organization)?;
    insert_user(&tx, &admin, &password_hash)?;
    let session = issue_session(&ctx, &tx, admin)?;
    tx.commit()?;

    tracing::info!(organization_id = %organization.id, org_type = %organization.org_type, "Organization registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { session, organization })))
}

/// `POST /api/auth/login`: unknown e-mail, wrong password and deactivated
/// accounts all answer the same 401.
pub async fn login(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mut errors = FieldErrors::new();
    errors.require("email", &req.email);
    errors.require("password", &req.password);
    errors.finish()?;

    let key = req.email.trim().to_lowercase();
    {
        let mut throttle = ctx
            .login_throttle
            .lock()
            .map_err(|_| ApiError::Internal("login throttle lock".into()))?;
        throttle
            .check(&key)
            .map_err(|retry_after| ApiError::RateLimited { retry_after })?;
    }

    let credentials = {
        let conn = ctx.db()?;
        get_user_credentials(&conn, &key)?
    };

    // Unknown and inactive accounts still pay for one derivation.
    let (user, stored) = match credentials {
        Some((user, stored)) if user.is_active => (Some(user), stored),
        _ => (None, ctx.core.dummy_password_hash().to_string()),
    };
    let password = req.password.clone();
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await?
        .unwrap_or(false);
    let verified = user.filter(|_| ok);

    let Some(user) = verified else {
        if let Ok(mut throttle) = ctx.login_throttle.lock() {
            throttle.record_failure(&key);
        }
        tracing::info!("Login rejected");
        return Err(ApiError::Unauthorized);
    };

    if let Ok(mut throttle) = ctx.login_throttle.lock() {
        throttle.clear(&key);
    }
    let conn = ctx.db()?;
    let session = issue_session(&ctx, &conn, user)?;
    tracing::info!(user_id = %session.user.id, "Login succeeded");
    Ok(Json(session))
}

/// `POST /api/auth/accept-invitation`
pub async fn accept_invitation(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<AcceptInvitationRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let mut errors = FieldErrors::new();
    errors.require("token", &req.token);
    check_account(&mut errors, "", &req.password, &req.first_name, &req.last_name);
    errors.finish()?;

    let not_found = || ApiError::NotFound("Invitation not found".into());
    let token_hash = ctx
        .core
        .tokens()
        .hash_presented(req.token.trim())
        .map_err(|_| not_found())?;

    let invitation = {
        let conn = ctx.db()?;
        get_invitation_by_token_hash(&conn, &token_hash)?.ok_or_else(not_found)?
    };
    if !invitation.is_open(utc_now()) {
        return Err(ApiError::Conflict("Invitation expired or already used".into()));
    }

    let password_hash = hash_off_thread(&ctx, req.password.clone()).await?;
    let now = utc_now();
    let user = User {
        id: Uuid::new_v4(),
        organization_id: invitation.organization_id,
        email: invitation.email.clone(),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        role: invitation.role,
        npi: req.npi,
        specialty: req.specialty,
        is_active: true,
        created_at: now,
        last_login_at: None,
    };

    let conn = ctx.db()?;
    let tx = conn.unchecked_transaction()?;
    mark_invitation_accepted(&tx, &invitation.id, &now)?;
    insert_user(&tx, &user, &password_hash)?;
    let session = issue_session(&ctx, &tx, user)?;
    tx.commit()?;

    tracing::info!(invitation_id = %invitation.id, user_id = %session.user.id, "Invitation accepted");
    Ok((StatusCode::CREATED, Json(session)))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.db()?;
    delete_session(&conn, &auth.token_hash)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<MeResponse>, ApiError> {
    let conn = ctx.db()?;
    let organization = get_organization(&conn, &auth.organization_id())?
        .ok_or_else(|| ApiError::NotFound("Organization not found".into()))?;
    Ok(Json(MeResponse {
        user: auth.user,
        organization,
    }))
}
