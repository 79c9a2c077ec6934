use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Reason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: i64,
    pub created_at: NaiveDateTime,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub complaint_text: Option<String>,
    pub selected_reasons: Vec<Reason>,
}

/// Patient complaint submission.
#[derive(Debug, Clone, Deserialize)]
pub struct ComplaintInput {
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub complaint_text: String,
    #[serde(default)]
    pub reason_ids: Vec<i64>,
}
