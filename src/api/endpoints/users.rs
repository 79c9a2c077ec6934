//! Admin management of staff accounts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser, UserResponse};
use crate::auth;
use crate::db;
use crate::models::UserInput;

fn check_input(input: &UserInput) -> Result<(), ApiError> {
    if input.name.trim().is_empty() || input.username.trim().is_empty() {
        return Err(ApiError::BadRequest("Name and username are required!".into()));
    }
    Ok(())
}

/// Refuse to remove admin rights from the last remaining admin.
fn check_not_last_admin(conn: &rusqlite::Connection, id: i64) -> Result<(), ApiError> {
    let is_admin = db::get_user(conn, id)?.is_some_and(|u| u.is_admin);
    if is_admin && db::count_admins(conn)? <= 1 {
        return Err(ApiError::BadRequest("At least one admin must remain!".into()));
    }
    Ok(())
}

/// Hash a non-empty password with the configured work factor.
fn hash_new_password(ctx: &ApiContext, password: Option<&str>) -> Result<Option<String>, ApiError> {
    match password.filter(|p| !p.is_empty()) {
        Some(p) => Ok(Some(auth::hash_password(p, ctx.core.config.auth.password_rounds)?)),
        None => Ok(None),
    }
}

/// `GET /api/admin/users`
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let conn = ctx.core.lock_db()?;
    let users = db::list_users(&conn)?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// `POST /api/admin/users`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<UserInput>,
) -> Result<Json<UserResponse>, ApiError> {
    check_input(&input)?;
    let hash = hash_new_password(&ctx, input.password.as_deref())?
        .ok_or_else(|| ApiError::BadRequest("Password is required!".into()))?;

    let conn = ctx.core.lock_db()?;
    let user = db::insert_user(&conn, &input, &hash)?;
    tracing::info!(admin_id = auth.user.id, user_id = user.id, "User created");
    Ok(Json(user.into()))
}

/// `POST /api/admin/users/:id`: a missing password keeps the current one.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(input): Json<UserInput>,
) -> Result<Json<UserResponse>, ApiError> {
    check_input(&input)?;
    if id == auth.user.id && !input.is_admin {
        return Err(ApiError::BadRequest("You cannot revoke your own admin rights!".into()));
    }
    let hash = hash_new_password(&ctx, input.password.as_deref())?;

    let conn = ctx.core.lock_db()?;
    if !input.is_admin {
        check_not_last_admin(&conn, id)?;
    }
    let user = db::update_user(&conn, id, &input, hash.as_deref())?;
    tracing::info!(admin_id = auth.user.id, user_id = id, password_changed = hash.is_some(), "User updated");
    Ok(Json(user.into()))
}

/// `DELETE /api/admin/users/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if id == auth.user.id {
        return Err(ApiError::BadRequest("You cannot delete yourself!".into()));
    }
    let conn = ctx.core.lock_db()?;
    check_not_last_admin(&conn, id)?;
    if !db::delete_user(&conn, id)? {
        return Err(ApiError::NotFound("User not found!".into()));
    }
    tracing::info!(admin_id = auth.user.id, user_id = id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
