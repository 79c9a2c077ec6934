use serde::{Deserialize, Serialize};

/// LLM prompt template stored under a string key (e.g. `review`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub prompt_text: String,
    pub temperature: f64,
    pub frequency_penalty: f64,
}
