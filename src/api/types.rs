//! Shared types for the HTTP API layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core_state::CoreState;
use crate::models::User;

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// Authenticated staff member, injected into request extensions by the
/// auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

/// Public view of a staff account.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub is_admin: bool,
    pub avatar_url: Option<String>,
    pub telegram_name: Option<String>,
    pub telegram_linked: bool,
    pub max_name: Option<String>,
    pub max_linked: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            telegram_linked: user.telegram_id.is_some(),
            max_linked: user.max_id.is_some(),
            id: user.id,
            name: user.name,
            username: user.username,
            is_admin: user.is_admin,
            avatar_url: user.avatar_url,
            telegram_name: user.telegram_name,
            max_name: user.max_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: i64,
}

/// Body of every `/reorder` endpoint.
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ordered_ids: Vec<i64>,
}
