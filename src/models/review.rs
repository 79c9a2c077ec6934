use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Aspect, Doctor, Platform, Reward, Service, Source};

/// A patient review assembled step by step, fully hydrated with its
/// selections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub created_at: NaiveDateTime,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub review_text: Option<String>,
    pub selected_doctors: Vec<Doctor>,
    pub selected_services: Vec<Service>,
    pub selected_aspects: Vec<Aspect>,
    pub selected_source: Option<Source>,
    pub selected_reward: Option<Reward>,
    pub published_platforms: Vec<Platform>,
    /// Staff have been notified about this review.
    pub notified: bool,
}

impl Review {
    /// Everything the text generator needs has been selected.
    pub fn ready_for_generation(&self) -> bool {
        !self.selected_doctors.is_empty()
            && !self.selected_services.is_empty()
            && !self.selected_aspects.is_empty()
    }

    pub fn is_generated(&self) -> bool {
        self.review_text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn is_published(&self) -> bool {
        !self.published_platforms.is_empty()
    }
}
