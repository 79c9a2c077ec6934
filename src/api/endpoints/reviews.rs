//! Patient review workflow.
//!
//! A review is created empty and filled step by step by the patient-facing
//! client: doctors, services, aspects, source, contacts, generated text,
//! reward and finally the platforms it was published to.

use axum::extract::{Path, State};
use axum::Json;
use rusqlite::Connection;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, IdResponse};
use crate::db::{self, ReferenceEntity};
use crate::llm::{build_review_request, default_review_prompt, ReviewNames, DEFAULT_PROMPT_ID};
use crate::models::{Aspect, Doctor, Platform, Review, Reward, Service, Source};
use crate::notify::review_message;

#[derive(Deserialize)]
pub struct DoctorsRequest {
    pub doctor_ids: Vec<i64>,
}

#[derive(Deserialize)]
pub struct ServicesRequest {
    pub service_ids: Vec<i64>,
}

#[derive(Deserialize)]
pub struct AspectsRequest {
    pub aspect_ids: Vec<i64>,
}

#[derive(Deserialize)]
pub struct SourceRequest {
    pub source_id: i64,
}

#[derive(Deserialize)]
pub struct RewardRequest {
    pub reward_id: i64,
}

#[derive(Deserialize)]
pub struct ContactsRequest {
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Deserialize)]
pub struct TextRequest {
    pub review_text: String,
}

fn load_review(conn: &Connection, id: i64) -> Result<Review, ApiError> {
    db::get_review(conn, id)?.ok_or_else(|| ApiError::NotFound("Review request not found!".into()))
}

/// Fetch the enabled rows among `ids`. Fails when none resolve.
fn resolve_enabled<T: ReferenceEntity>(
    conn: &Connection,
    ids: &[i64],
    missing: &str,
) -> Result<Vec<T>, ApiError> {
    let found = db::get_by_ids::<T>(conn, ids, true)?;
    if found.is_empty() {
        return Err(ApiError::BadRequest(missing.to_string()));
    }
    Ok(found)
}

/// Fetch one enabled row.
fn enabled_one<T: ReferenceEntity>(conn: &Connection, id: i64, missing: &str) -> Result<T, ApiError> {
    resolve_enabled::<T>(conn, &[id], missing)?
        .pop()
        .ok_or_else(|| ApiError::BadRequest(missing.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// `POST /api/reviews`
pub async fn create(State(ctx): State<ApiContext>) -> Result<Json<IdResponse>, ApiError> {
    let conn = ctx.core.lock_db()?;
    let id = db::create_review(&conn)?;
    tracing::info!(review_id = id, "Review started");
    Ok(Json(IdResponse { id }))
}

/// `GET /api/reviews/:id`
pub async fn get(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<Json<Review>, ApiError> {
    let conn = ctx.core.lock_db()?;
    Ok(Json(load_review(&conn, id)?))
}

/// `POST /api/reviews/:id/doctors`
pub async fn set_doctors(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(request): Json<DoctorsRequest>,
) -> Result<Json<Review>, ApiError> {
    let conn = ctx.core.lock_db()?;
    load_review(&conn, id)?;
    let doctors = resolve_enabled::<Doctor>(&conn, &request.doctor_ids, "No request doctors found!")?;
    let ids: Vec<i64> = doctors.iter().map(|d| d.id).collect();
    db::set_review_doctors(&conn, id, &ids)?;
    Ok(Json(load_review(&conn, id)?))
}

/// `POST /api/reviews/:id/services`
pub async fn set_services(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(request): Json<ServicesRequest>,
) -> Result<Json<Review>, ApiError> {
    let conn = ctx.core.lock_db()?;
    load_review(&conn, id)?;
    let services =
        resolve_enabled::<Service>(&conn, &request.service_ids, "No request services found!")?;
    let ids: Vec<i64> = services.iter().map(|s| s.id).collect();
    db::set_review_services(&conn, id, &ids)?;
    Ok(Json(load_review(&conn, id)?))
}

/// `POST /api/reviews/:id/aspects`
pub async fn set_aspects(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(request): Json<AspectsRequest>,
) -> Result<Json<Review>, ApiError> {
    let conn = ctx.core.lock_db()?;
    load_review(&conn, id)?;
    let aspects = resolve_enabled::<Aspect>(&conn, &request.aspect_ids, "No request aspects found!")?;
    let ids: Vec<i64> = aspects.iter().map(|a| a.id).collect();
    db::set_review_aspects(&conn, id, &ids)?;
    Ok(Json(load_review(&conn, id)?))
}

/// `POST /api/reviews/:id/source`
pub async fn set_source(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(request): Json<SourceRequest>,
) -> Result<Json<Review>, ApiError> {
    let conn = ctx.core.lock_db()?;
    load_review(&conn, id)?;
    let source = enabled_one::<Source>(&conn, request.source_id, "Source not found!")?;
    db::set_review_source(&conn, id, source.id)?;
    Ok(Json(load_review(&conn, id)?))
}

/// `POST /api/reviews/:id/contacts`
pub async fn set_contacts(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(request): Json<ContactsRequest>,
) -> Result<Json<Review>, ApiError> {
    let name = non_blank(request.contact_name);
    let phone = non_blank(request.contact_phone);
    let conn = ctx.core.lock_db()?;
    load_review(&conn, id)?;
    db::set_review_contacts(&conn, id, name.as_deref(), phone.as_deref())?;
    Ok(Json(load_review(&conn, id)?))
}

/// `POST /api/reviews/:id/generate`: draft the review text with the LLM.
pub async fn generate(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<Json<Review>, ApiError> {
    let request = {
        let conn = ctx.core.lock_db()?;
        let review = load_review(&conn, id)?;
        if !review.ready_for_generation() {
            return Err(ApiError::BadRequest("Doctors, services or aspects not filled!".into()));
        }
        let prompt = db::get_prompt(&conn, DEFAULT_PROMPT_ID)?.unwrap_or_else(default_review_prompt);
        build_review_request(&prompt, &ReviewNames::from_review(&review), &ctx.core.config.llm.model)
    };

    let text = ctx.core.generator.generate(&request).await?;
    tracing::info!(review_id = id, chars = text.chars().count(), "Review text generated");

    let conn = ctx.core.lock_db()?;
    db::set_review_text(&conn, id, &text)?;
    Ok(Json(load_review(&conn, id)?))
}

/// `POST /api/reviews/:id/text`: the patient's own edit of the draft.
pub async fn set_text(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(request): Json<TextRequest>,
) -> Result<Json<Review>, ApiError> {
    let text = request.review_text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Review text is empty!".into()));
    }
    let conn = ctx.core.lock_db()?;
    load_review(&conn, id)?;
    db::set_review_text(&conn, id, text)?;
    Ok(Json(load_review(&conn, id)?))
}

/// `POST /api/reviews/:id/reward`
pub async fn set_reward(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(request): Json<RewardRequest>,
) -> Result<Json<Review>, ApiError> {
    let conn = ctx.core.lock_db()?;
    load_review(&conn, id)?;
    let reward = enabled_one::<Reward>(&conn, request.reward_id, "Reward not found!")?;
    db::set_review_reward(&conn, id, reward.id)?;
    Ok(Json(load_review(&conn, id)?))
}

/// `POST /api/reviews/:id/platforms/:platform_id/publish`
///
/// The first publish of a review announces it to every linked staff chat.
/// The review is claimed before sending and released again if the
/// announcement fails, so a later publish retries it.
pub async fn publish(
    State(ctx): State<ApiContext>,
    Path((id, platform_id)): Path<(i64, i64)>,
) -> Result<Json<Review>, ApiError> {
    let (mut review, announce) = {
        let conn = ctx.core.lock_db()?;
        load_review(&conn, id)?;
        let platform = enabled_one::<Platform>(&conn, platform_id, "Platform not found!")?;
        if db::add_published_platform(&conn, id, platform.id)? {
            tracing::info!(review_id = id, platform_id, "Review published");
        }
        let announce = db::mark_review_notified(&conn, id)?;
        (load_review(&conn, id)?, announce)
    };

    if announce {
        match ctx.core.notify_staff(&review_message(&review)).await {
            Ok(report) => tracing::info!(
                review_id = id,
                delivered = report.delivered,
                failed = report.failed,
                "Staff notified about review"
            ),
            Err(e) => {
                tracing::warn!(review_id = id, error = %e, "Review notification failed, will retry");
                db::clear_review_notified(&*ctx.core.lock_db()?, id)?;
                review.notified = false;
            }
        }
    }

    Ok(Json(review))
}
