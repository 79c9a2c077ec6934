use serde::{Deserialize, Serialize};

/// The clinic's public-facing figure. Exactly one row exists once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub avatar_url: Option<String>,
}
