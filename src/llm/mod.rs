//! Review text generation through an OpenAI-compatible chat-completion API.

pub mod client;
pub mod prompt;

pub use client::{MockReviewGenerator, OpenAiClient};
pub use prompt::{build_review_request, default_review_prompt, ReviewNames, DEFAULT_PROMPT_ID};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM endpoint unreachable at {0}")]
    Connection(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("LLM returned an empty completion")]
    EmptyCompletion,
}

/// A fully rendered chat-completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub frequency_penalty: f64,
}

/// Seam between the review workflow and the text model.
#[async_trait]
pub trait ReviewTextGenerator: Send + Sync {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}
