//! `POST /api/complaints`: patient complaint intake.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, IdResponse};
use crate::db;
use crate::models::ComplaintInput;
use crate::notify::complaint_message;

pub async fn create(
    State(ctx): State<ApiContext>,
    Json(input): Json<ComplaintInput>,
) -> Result<Json<IdResponse>, ApiError> {
    let text = input.complaint_text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Complaint text is empty!".into()));
    }
    let contact = |v: &Option<String>| {
        v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
    };

    let complaint = {
        let conn = ctx.core.lock_db()?;
        let id = db::create_complaint(
            &conn,
            contact(&input.contact_name).as_deref(),
            contact(&input.contact_phone).as_deref(),
            text,
            &input.reason_ids,
        )?;
        db::get_complaint(&conn, id)?.ok_or_else(|| ApiError::Internal(format!("complaint {id} vanished")))?
    };
    tracing::info!(complaint_id = complaint.id, reasons = complaint.selected_reasons.len(), "Complaint received");

    if let Err(e) = ctx.core.notify_staff(&complaint_message(&complaint)).await {
        tracing::warn!(complaint_id = complaint.id, error = %e, "Complaint notification skipped");
    }

    Ok(Json(IdResponse { id: complaint.id }))
}
