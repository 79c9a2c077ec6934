//! Staff session endpoints.
//!
//! - `POST /api/login`: exchange credentials for an access token
//! - `GET /api/user`: the authenticated account

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser, UserResponse};
use crate::auth;
use crate::db;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub access_token: String,
}

/// `POST /api/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = {
        let conn = ctx.core.lock_db()?;
        db::get_user_by_username(&conn, request.username.trim())?
    };

    let user = match user {
        Some(user) if auth::verify_password(&request.password, &user.password_hash) => user,
        _ => {
            tracing::info!(username = %request.username, "Rejected login");
            return Err(ApiError::InvalidCredentials);
        }
    };

    let settings = &ctx.core.config.auth;
    let access_token = auth::issue_token(user.id, &settings.secret, settings.token_ttl_hours)?;
    tracing::info!(user_id = user.id, "Staff login");

    Ok(Json(LoginResponse {
        user: user.into(),
        access_token,
    }))
}

/// `GET /api/user`
pub async fn current_user(Extension(auth): Extension<AuthUser>) -> Json<UserResponse> {
    Json(auth.user.into())
}
