//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, validates the JWT, loads the
//! user and injects `AuthUser` into request extensions for downstream
//! handlers.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::auth;
use crate::db;

/// Require a valid bearer token for any staff account.
pub async fn require_user(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next, false).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

/// Require a valid bearer token for an admin account.
pub async fn require_admin(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next, true).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
    admin_only: bool,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Invalid token!".into()))?;

    let claims = auth::decode_token(token, &ctx.core.config.auth.secret)?;

    let user = {
        let conn = ctx.core.lock_db()?;
        db::get_user(&conn, claims.user_id)?
    }
    .ok_or_else(|| ApiError::Unauthorized("Unknown user!".into()))?;

    if admin_only && !user.is_admin {
        tracing::warn!(user_id = user.id, path = %req.uri().path(), "Admin route refused");
        return Err(ApiError::Forbidden("Admin privileges required!".into()));
    }

    req.extensions_mut().insert(AuthUser { user });
    Ok(next.run(req).await)
}
