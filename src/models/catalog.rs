//! Admin-curated reference data. Every entity carries an enable flag and a
//! manual sort position.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub is_enabled: bool,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub avatar_url: Option<String>,
    pub is_enabled: bool,
    pub position: i64,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aspect {
    pub id: i64,
    pub name: String,
    pub is_enabled: bool,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub is_enabled: bool,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: i64,
    pub name: String,
    pub image_url: Option<String>,
    pub is_enabled: bool,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub image_url: Option<String>,
    pub is_enabled: bool,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub id: i64,
    pub name: String,
    pub is_enabled: bool,
    pub position: i64,
}

// ── Write payloads ──────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DoctorInput {
    pub name: String,
    pub role: String,
    pub avatar_url: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
    pub service_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
}

/// Shared payload for the name-only entities (aspects, sources, reasons).
#[derive(Debug, Clone, Deserialize)]
pub struct NamedInput {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardInput {
    pub name: String,
    pub image_url: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformInput {
    pub name: String,
    pub url: String,
    pub image_url: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}
