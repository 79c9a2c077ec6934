//! Prompt templates for review drafting.
//!
//! A stored prompt is plain text with `{doctors}`, `{services}`, `{aspects}`
//! and `{source}` placeholders. Rendering substitutes the selected names
//! joined with ", ".

use crate::models::{Prompt, Review};

use super::CompletionRequest;

/// Key of the prompt used by the review workflow.
pub const DEFAULT_PROMPT_ID: &str = "review";

const SYSTEM_MESSAGE: &str = "Ты помогаешь пациентам стоматологической клиники написать \
короткий искренний отзыв от первого лица. Пиши по-русски, без приветствий, \
без хештегов и без выдуманных фактов.";

const DEFAULT_TEMPLATE: &str = "Напиши отзыв о визите в клинику.\n\
Врачи: {doctors}.\n\
Услуги: {services}.\n\
Что особенно понравилось: {aspects}.\n\
Как пациент узнал о клинике: {source}.\n\
Объём: 3-5 предложений.";

/// Prompt used until an admin saves their own under [`DEFAULT_PROMPT_ID`].
pub fn default_review_prompt() -> Prompt {
    Prompt {
        id: DEFAULT_PROMPT_ID.into(),
        prompt_text: DEFAULT_TEMPLATE.into(),
        temperature: 0.8,
        frequency_penalty: 0.3,
    }
}

/// Names substituted into a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewNames {
    pub doctors: Vec<String>,
    pub services: Vec<String>,
    pub aspects: Vec<String>,
    pub source: Option<String>,
}

impl ReviewNames {
    pub fn from_review(review: &Review) -> Self {
        Self {
            doctors: review.selected_doctors.iter().map(|d| d.name.clone()).collect(),
            services: review.selected_services.iter().map(|s| s.name.clone()).collect(),
            aspects: review.selected_aspects.iter().map(|a| a.name.clone()).collect(),
            source: review.selected_source.as_ref().map(|s| s.name.clone()),
        }
    }

    fn value(&self, key: &str) -> Option<String> {
        match key {
            "doctors" => Some(self.doctors.join(", ")),
            "services" => Some(self.services.join(", ")),
            "aspects" => Some(self.aspects.join(", ")),
            "source" => Some(self.source.clone().unwrap_or_else(|| "не указано".into())),
            _ => None,
        }
    }
}

/// Substitute placeholders in a single pass. Substituted names are never
/// expanded again; unknown placeholders are left as-is.
pub fn render_template(template: &str, names: &ReviewNames) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            rest = tail;
            break;
        };
        let key = &tail[1..close];
        if key.contains('{') {
            out.push('{');
            rest = &tail[1..];
            continue;
        }
        match names.value(key) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }
    out.push_str(rest);
    out
}

pub fn build_review_request(prompt: &Prompt, names: &ReviewNames, model: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        system: SYSTEM_MESSAGE.to_string(),
        user: render_template(&prompt.prompt_text, names),
        temperature: prompt.temperature,
        frequency_penalty: prompt.frequency_penalty,
    }
}
