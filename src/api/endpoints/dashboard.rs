//! Staff dashboard and spreadsheet export.
//!
//! - `GET /api/dashboard`: reviews, complaints and counters
//! - `GET /api/export/reviews` / `GET /api/export/complaints`: xlsx download

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db;
use crate::export::{self, XLSX_CONTENT_TYPE};
use crate::models::{Complaint, DateRange, Review};

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub date_after: Option<String>,
    pub date_before: Option<String>,
}

impl RangeQuery {
    pub fn to_range(&self) -> Result<DateRange, ApiError> {
        let bound = |value: &Option<String>, name: &str, upper: bool| match value.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => DateRange::parse_bound(raw, upper)
                .map(Some)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid {name}: {raw}"))),
        };
        Ok(DateRange::new(
            bound(&self.date_after, "date_after", false)?,
            bound(&self.date_before, "date_before", true)?,
        ))
    }
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub total_reviews: usize,
    pub total_generated: usize,
    pub total_published: usize,
    pub total_complaints: usize,
    pub reviews: Vec<Review>,
    pub complaints: Vec<Complaint>,
}

/// `GET /api/dashboard`
pub async fn dashboard(
    State(ctx): State<ApiContext>,
    Extension(_auth): Extension<AuthUser>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let range = query.to_range()?;
    let conn = ctx.core.lock_db()?;
    let reviews = db::list_reviews(&conn, &range)?;
    let complaints = db::list_complaints(&conn, &range)?;

    Ok(Json(DashboardResponse {
        total_reviews: reviews.len(),
        total_generated: reviews.iter().filter(|r| r.is_generated()).count(),
        total_published: reviews.iter().filter(|r| r.is_published()).count(),
        total_complaints: complaints.len(),
        reviews,
        complaints,
    }))
}

fn xlsx_download(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// `GET /api/export/reviews`
pub async fn export_reviews(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let range = query.to_range()?;
    let reviews = {
        let conn = ctx.core.lock_db()?;
        db::list_reviews(&conn, &range)?
    };
    let bytes = export::reviews_workbook(&reviews)?;
    tracing::info!(user_id = auth.user.id, rows = reviews.len(), "Reviews exported");
    Ok(xlsx_download(bytes, "reviews.xlsx"))
}

/// `GET /api/export/complaints`
pub async fn export_complaints(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let range = query.to_range()?;
    let complaints = {
        let conn = ctx.core.lock_db()?;
        db::list_complaints(&conn, &range)?
    };
    let bytes = export::complaints_workbook(&complaints)?;
    tracing::info!(user_id = auth.user.id, rows = complaints.len(), "Complaints exported");
    Ok(xlsx_download(bytes, "complaints.xlsx"))
}
