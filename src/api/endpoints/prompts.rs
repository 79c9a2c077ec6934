//! Admin management of LLM prompt templates.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db;
use crate::llm::{build_review_request, default_review_prompt, ReviewNames, DEFAULT_PROMPT_ID};
use crate::models::Prompt;

#[derive(Deserialize)]
pub struct PromptInput {
    pub prompt_text: String,
    pub temperature: f64,
    pub frequency_penalty: f64,
}

#[derive(Deserialize)]
pub struct PromptTestRequest {
    #[serde(default)]
    pub doctor_names: Vec<String>,
    #[serde(default)]
    pub service_names: Vec<String>,
    #[serde(default)]
    pub aspect_names: Vec<String>,
    pub source_name: Option<String>,
}

#[derive(Serialize)]
pub struct PromptTestResponse {
    pub generated_text: String,
}

impl PromptInput {
    fn validate(&self) -> Result<(), ApiError> {
        if self.prompt_text.trim().is_empty() {
            return Err(ApiError::BadRequest("Prompt text is empty!".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ApiError::BadRequest("temperature must be between 0 and 2".into()));
        }
        if !(-2.0..=2.0).contains(&self.frequency_penalty) {
            return Err(ApiError::BadRequest("frequency_penalty must be between -2 and 2".into()));
        }
        Ok(())
    }
}

/// Stored prompt, or the built-in default for the review prompt.
fn load_prompt(conn: &rusqlite::Connection, id: &str) -> Result<Prompt, ApiError> {
    match db::get_prompt(conn, id)? {
        Some(prompt) => Ok(prompt),
        None if id == DEFAULT_PROMPT_ID => Ok(default_review_prompt()),
        None => Err(ApiError::NotFound("Prompt not found!".into())),
    }
}

/// `GET /api/admin/prompts`: the review prompt is always listed.
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<Prompt>>, ApiError> {
    let conn = ctx.core.lock_db()?;
    let mut prompts = db::list_prompts(&conn)?;
    if !prompts.iter().any(|p| p.id == DEFAULT_PROMPT_ID) {
        prompts.insert(0, default_review_prompt());
    }
    Ok(Json(prompts))
}

/// `POST /api/admin/prompts/:id`
pub async fn upsert(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(input): Json<PromptInput>,
) -> Result<Json<Prompt>, ApiError> {
    input.validate()?;
    let prompt = Prompt {
        id,
        prompt_text: input.prompt_text,
        temperature: input.temperature,
        frequency_penalty: input.frequency_penalty,
    };
    let conn = ctx.core.lock_db()?;
    db::upsert_prompt(&conn, &prompt)?;
    tracing::info!(prompt_id = %prompt.id, "Prompt saved");
    Ok(Json(prompt))
}

/// `POST /api/admin/prompts/:id/test`: run a prompt against sample names
/// without touching any review.
pub async fn test(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(request): Json<PromptTestRequest>,
) -> Result<Json<PromptTestResponse>, ApiError> {
    let prompt = {
        let conn = ctx.core.lock_db()?;
        load_prompt(&conn, &id)?
    };
    let names = ReviewNames {
        doctors: request.doctor_names,
        services: request.service_names,
        aspects: request.aspect_names,
        source: request.source_name,
    };
    let completion = build_review_request(&prompt, &names, &ctx.core.config.llm.model);
    let generated_text = ctx.core.generator.generate(&completion).await?;
    Ok(Json(PromptTestResponse { generated_text }))
}
