use serde::{Deserialize, Serialize};

use super::Channel;

/// Staff account. Admins curate reference data; every user can see the
/// dashboard and link a messenger chat for notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_admin: bool,
    pub avatar_url: Option<String>,
    pub telegram_id: Option<i64>,
    pub telegram_name: Option<String>,
    pub max_id: Option<i64>,
    pub max_name: Option<String>,
}

impl User {
    /// Chat id linked for the given channel, if any.
    pub fn chat_id(&self, channel: Channel) -> Option<i64> {
        match channel {
            Channel::Telegram => self.telegram_id,
            Channel::Max => self.max_id,
        }
    }
}

/// Admin payload for creating or updating a user. `password` may be omitted
/// on update to keep the current one.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInput {
    pub name: String,
    pub username: String,
    pub password: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub avatar_url: Option<String>,
}

/// A linked messenger chat that receives staff notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: i64,
    pub channel: Channel,
    pub chat_id: i64,
}
