//! Admin reference-data management.
//!
//! Every reference kind shares list, delete and reorder handlers; create
//! and update differ only in their payload.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser, ReorderRequest};
use crate::db::{self, DatabaseError, NamedEntity, ReferenceEntity};
use crate::models::*;

fn require_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required!".into()));
    }
    Ok(())
}

/// `GET /api/admin/<kind>`: all rows, disabled included.
pub async fn list<T>(State(ctx): State<ApiContext>) -> Result<Json<Vec<T>>, ApiError>
where
    T: ReferenceEntity + Serialize + Send + 'static,
{
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::list_all::<T>(&conn)?))
}

/// `DELETE /api/admin/<kind>/:id`
pub async fn delete<T>(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
    T: ReferenceEntity + Send + 'static,
{
    let conn = ctx.core.lock_db()?;
    if !db::delete_entity::<T>(&conn, id)? {
        return Err(ApiError::NotFound(format!("{} not found!", T::KIND.label())));
    }
    tracing::info!(user_id = auth.user.id, kind = %T::KIND, id, "Reference entry deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/admin/<kind>/reorder`
pub async fn reorder<T>(
    State(ctx): State<ApiContext>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Vec<T>>, ApiError>
where
    T: ReferenceEntity + Serialize + Send + 'static,
{
    let conn = ctx.core.lock_db()?;
    db::reorder::<T>(&conn, &request.ordered_ids).map_err(|e| match e {
        DatabaseError::NotFound { .. } | DatabaseError::ConstraintViolation(_) => {
            ApiError::BadRequest(e.to_string())
        }
        other => other.into(),
    })?;
    Ok(Json(db::list_all::<T>(&conn)?))
}

// ── Doctors ─────────────────────────────────────────────

/// Doctors must offer at least one existing service.
fn check_doctor(conn: &rusqlite::Connection, input: &DoctorInput) -> Result<(), ApiError> {
    require_name(&input.name)?;
    if db::get_by_ids::<Service>(conn, &input.service_ids, false)?.is_empty() {
        return Err(ApiError::NotFound("No services found!".into()));
    }
    Ok(())
}

pub async fn create_doctor(
    State(ctx): State<ApiContext>,
    Json(input): Json<DoctorInput>,
) -> Result<Json<Doctor>, ApiError> {
    let conn = ctx.core.lock_db()?;
    check_doctor(&conn, &input)?;
    Ok(Json(db::insert_doctor(&conn, &input)?))
}

pub async fn update_doctor(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(input): Json<DoctorInput>,
) -> Result<Json<Doctor>, ApiError> {
    let conn = ctx.core.lock_db()?;
    check_doctor(&conn, &input)?;
    Ok(Json(db::update_doctor(&conn, id, &input)?))
}

// ── Services ────────────────────────────────────────────

pub async fn create_service(
    State(ctx): State<ApiContext>,
    Json(input): Json<ServiceInput>,
) -> Result<Json<Service>, ApiError> {
    require_name(&input.name)?;
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::insert_service(&conn, &input)?))
}

pub async fn update_service(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(input): Json<ServiceInput>,
) -> Result<Json<Service>, ApiError> {
    require_name(&input.name)?;
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::update_service(&conn, id, &input)?))
}

// ── Aspects, sources, reasons ───────────────────────────

pub async fn create_named<T>(
    State(ctx): State<ApiContext>,
    Json(input): Json<NamedInput>,
) -> Result<Json<T>, ApiError>
where
    T: NamedEntity + Serialize + Send + 'static,
{
    require_name(&input.name)?;
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::insert_named::<T>(&conn, &input)?))
}

pub async fn update_named<T>(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(input): Json<NamedInput>,
) -> Result<Json<T>, ApiError>
where
    T: NamedEntity + Serialize + Send + 'static,
{
    require_name(&input.name)?;
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::update_named::<T>(&conn, id, &input)?))
}

// ── Rewards ─────────────────────────────────────────────

pub async fn create_reward(
    State(ctx): State<ApiContext>,
    Json(input): Json<RewardInput>,
) -> Result<Json<Reward>, ApiError> {
    require_name(&input.name)?;
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::insert_reward(&conn, &input)?))
}

pub async fn update_reward(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(input): Json<RewardInput>,
) -> Result<Json<Reward>, ApiError> {
    require_name(&input.name)?;
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::update_reward(&conn, id, &input)?))
}

// ── Platforms ───────────────────────────────────────────

fn check_platform(input: &PlatformInput) -> Result<(), ApiError> {
    require_name(&input.name)?;
    match url::Url::parse(input.url.trim()) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
        _ => Err(ApiError::BadRequest(format!("Invalid platform url: {}", input.url))),
    }
}

pub async fn create_platform(
    State(ctx): State<ApiContext>,
    Json(input): Json<PlatformInput>,
) -> Result<Json<Platform>, ApiError> {
    check_platform(&input)?;
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::insert_platform(&conn, &input)?))
}

pub async fn update_platform(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(input): Json<PlatformInput>,
) -> Result<Json<Platform>, ApiError> {
    check_platform(&input)?;
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::update_platform(&conn, id, &input)?))
}

// ── Owner ───────────────────────────────────────────────

/// `POST /api/admin/owner`
pub async fn set_owner(
    State(ctx): State<ApiContext>,
    Json(owner): Json<Owner>,
) -> Result<Json<Owner>, ApiError> {
    require_name(&owner.name)?;
    let conn = ctx.core.lock_db()?;
    db::set_owner(&conn, &owner)?;
    Ok(Json(owner))
}
