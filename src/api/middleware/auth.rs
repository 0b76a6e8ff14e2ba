//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, looks up the unexpired session
//! by token hash, loads the user and injects `AuthUser` into request
//! extensions for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db::repository::{get_active_session, get_user, utc_now};

/// Require a valid, unexpired bearer token for an active user.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

pub(crate) fn bearer_token(req: &Request<axum::body::Body>) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;
    let token_hash = ctx
        .core
        .tokens()
        .hash_presented(token)
        .map_err(|_| ApiError::Unauthorized)?;

    // Connection dropped before the handler runs.
    let user = {
        let conn = ctx.db()?;
        let session = get_active_session(&conn, &token_hash, &utc_now())?
            .ok_or(ApiError::Unauthorized)?;
        get_user(&conn, &session.user_id)?
            .filter(|u| u.is_active)
            .ok_or(ApiError::Unauthorized)?
    };

    req.extensions_mut().insert(AuthUser { user, token_hash });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}
