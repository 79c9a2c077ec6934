//! Public catalog endpoints: enabled reference data in display order.

use axum::extract::{RawQuery, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::{self, ReferenceEntity};
use crate::models::{Owner, Service};

/// `GET /api/<kind>` for any reference entity.
pub async fn list_enabled<T>(State(ctx): State<ApiContext>) -> Result<Json<Vec<T>>, ApiError>
where
    T: ReferenceEntity + serde::Serialize + Send + 'static,
{
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::list_enabled::<T>(&conn)?))
}

/// `GET /api/services/doctors?doctor_ids=1&doctor_ids=2` (or `doctor_ids=1,2`).
pub async fn services_for_doctors(
    State(ctx): State<ApiContext>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<Service>>, ApiError> {
    let doctor_ids = parse_id_list(query.as_deref().unwrap_or(""), "doctor_ids")?;
    if doctor_ids.is_empty() {
        return Err(ApiError::BadRequest("doctor_ids is required".into()));
    }
    let conn = ctx.core.lock_db()?;
    Ok(Json(db::services_for_doctors(&conn, &doctor_ids)?))
}

/// `GET /api/owner`
pub async fn owner(State(ctx): State<ApiContext>) -> Result<Json<Owner>, ApiError> {
    let conn = ctx.core.lock_db()?;
    db::get_owner(&conn)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Owner not found!".into()))
}

/// Collect every value of `key`, accepting both repeated keys and
/// comma-separated lists.
pub(crate) fn parse_id_list(query: &str, key: &str) -> Result<Vec<i64>, ApiError> {
    let mut ids = Vec::new();
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if name != key {
            continue;
        }
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let id = part
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("Invalid {key} value: {part}")))?;
            ids.push(id);
        }
    }
    Ok(ids)
}
