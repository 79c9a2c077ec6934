//! MAX messenger Bot API client, staff notifier and chat-linking poller.
//!
//! MAX identifies a private chat by the user's id, so linked chats store the
//! MAX `user_id` and messages are sent with `?user_id=`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use super::linking::{self, unlink_callback_data, BotCommand, BotReply, UNLINK_BUTTON_TEXT};
use super::{Notifier, NotifyError};
use crate::config::BotConfig;
use crate::core_state::CoreState;
use crate::db::DatabaseError;
use crate::models::{Channel, Recipient};

const API_BASE: &str = "https://platform-api.max.ru";
const POLL_TIMEOUT_SECS: u64 = 25;
const HTTP_TIMEOUT_SECS: u64 = 60;
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Deep link that opens the bot with `payload` as the start parameter.
pub fn start_link(bot_username: &str, payload: &str) -> String {
    format!(
        "https://max.ru/{}?start={payload}",
        bot_username.trim_start_matches('@')
    )
}

// ── Wire types ──────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MaxUser {
    pub user_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl MaxUser {
    pub fn full_name(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaxMessage {
    pub sender: Option<MaxUser>,
    pub body: MessageBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Callback {
    pub callback_id: String,
    #[serde(default)]
    pub payload: Option<String>,
    pub user: MaxUser,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "update_type", rename_all = "snake_case")]
pub enum Update {
    BotStarted {
        user: MaxUser,
        #[serde(default)]
        payload: Option<String>,
    },
    MessageCreated {
        message: MaxMessage,
    },
    MessageCallback {
        callback: Callback,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    updates: Vec<Value>,
    marker: Option<i64>,
}

fn message_body(reply: &BotReply) -> Value {
    let mut body = json!({
        "text": reply.text,
        "format": "html",
    });
    if let Some(user_id) = reply.unlink_button {
        body["attachments"] = json!([{
            "type": "inline_keyboard",
            "payload": {
                "buttons": [[{
                    "type": "callback",
                    "text": UNLINK_BUTTON_TEXT,
                    "payload": unlink_callback_data(user_id),
                }]]
            }
        }]);
    }
    body
}

// ── Update handling ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum MaxAction {
    Send { user_id: i64, reply: BotReply },
    /// Replace the message the callback came from.
    Answer { callback_id: String, reply: BotReply },
}

/// Decide the response to one update, applying link changes to the database.
pub fn plan_update(
    conn: &Connection,
    secret: &str,
    update: &Update,
) -> Result<Option<MaxAction>, DatabaseError> {
    match update {
        Update::BotStarted {
            user,
            payload: Some(payload),
        } => {
            let reply = linking::handle_start(
                conn,
                Channel::Max,
                secret,
                payload,
                user.user_id,
                user.full_name().as_deref(),
            )?;
            Ok(reply.map(|reply| MaxAction::Send {
                user_id: user.user_id,
                reply,
            }))
        }
        Update::MessageCreated { message } => {
            let Some(sender) = &message.sender else {
                return Ok(None);
            };
            match message.body.text.as_deref().and_then(BotCommand::parse_text) {
                Some(BotCommand::Start { payload: Some(payload) }) => {
                    let reply = linking::handle_start(
                        conn,
                        Channel::Max,
                        secret,
                        &payload,
                        sender.user_id,
                        sender.full_name().as_deref(),
                    )?;
                    Ok(reply.map(|reply| MaxAction::Send {
                        user_id: sender.user_id,
                        reply,
                    }))
                }
                Some(BotCommand::Start { payload: None }) => {
                    let reply = linking::handle_confirm(conn, Channel::Max, sender.user_id)?;
                    Ok(reply.map(|reply| MaxAction::Send {
                        user_id: sender.user_id,
                        reply,
                    }))
                }
                _ => Ok(None),
            }
        }
        Update::MessageCallback { callback } => {
            let command = callback.payload.as_deref().and_then(BotCommand::parse_callback);
            let Some(BotCommand::Unlink { user_id }) = command else {
                return Ok(None);
            };
            let reply = linking::handle_unlink(conn, Channel::Max, user_id, callback.user.user_id)?;
            Ok(reply.map(|reply| MaxAction::Answer {
                callback_id: callback.callback_id.clone(),
                reply,
            }))
        }
        _ => Ok(None),
    }
}

// ── Client ──────────────────────────────────────────────

pub struct MaxBot {
    api_base: String,
    token: String,
    bot_username: String,
    client: reqwest::Client,
}

impl MaxBot {
    pub fn new(config: &BotConfig) -> Result<Self, NotifyError> {
        Self::with_api_base(config, API_BASE)
    }

    pub fn with_api_base(config: &BotConfig, api_base: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| NotifyError::HttpClient(e.to_string()))?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            bot_username: config.bot_username.clone(),
            client,
        })
    }

    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, NotifyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Api {
            channel: Channel::Max,
            status: status.as_u16(),
            body,
        })
    }

    fn connection_error(e: reqwest::Error) -> NotifyError {
        NotifyError::Connection {
            channel: Channel::Max,
            reason: e.to_string(),
        }
    }

    pub async fn send_message(&self, user_id: i64, reply: &BotReply) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("Authorization", &self.token)
            .query(&[("user_id", user_id)])
            .json(&message_body(reply))
            .send()
            .await
            .map_err(Self::connection_error)?;
        Self::check(response).await.map(|_| ())
    }

    pub async fn answer_callback(&self, callback_id: &str, reply: &BotReply) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/answers", self.api_base))
            .header("Authorization", &self.token)
            .query(&[("callback_id", callback_id)])
            .json(&json!({ "message": message_body(reply) }))
            .send()
            .await
            .map_err(Self::connection_error)?;
        Self::check(response).await.map(|_| ())
    }

    /// Fetch updates after `marker`. Returns the parsed updates and the next
    /// marker. Update kinds this bot does not know are dropped.
    pub async fn get_updates(&self, marker: Option<i64>) -> Result<(Vec<Update>, Option<i64>), NotifyError> {
        let mut request = self
            .client
            .get(format!("{}/updates", self.api_base))
            .header("Authorization", &self.token)
            .query(&[
                ("timeout", POLL_TIMEOUT_SECS.to_string()),
                ("types", "bot_started,message_created,message_callback".to_string()),
            ]);
        if let Some(marker) = marker {
            request = request.query(&[("marker", marker)]);
        }
        let response = request.send().await.map_err(Self::connection_error)?;
        let parsed: UpdatesResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| NotifyError::ResponseParsing(e.to_string()))?;
        Ok((parse_updates(parsed.updates), parsed.marker))
    }

    async fn execute(&self, action: &MaxAction) -> Result<(), NotifyError> {
        match action {
            MaxAction::Send { user_id, reply } => self.send_message(*user_id, reply).await,
            MaxAction::Answer { callback_id, reply } => self.answer_callback(callback_id, reply).await,
        }
    }

    async fn handle_update(&self, state: &CoreState, update: &Update) -> Result<(), NotifyError> {
        let action = {
            let conn = state
                .lock_db()
                .map_err(|e| NotifyError::State(e.to_string()))?;
            plan_update(&conn, &state.config.auth.secret, update)?
        };
        if let Some(action) = action {
            self.execute(&action).await?;
        }
        Ok(())
    }
}

fn parse_updates(raw: Vec<Value>) -> Vec<Update> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(update) => Some(update),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed MAX update");
                None
            }
        })
        .collect()
}

#[async_trait]
impl Notifier for MaxBot {
    async fn send(&self, recipient: &Recipient, html: &str) -> Result<(), NotifyError> {
        self.send_message(
            recipient.chat_id,
            &BotReply {
                text: html.to_string(),
                unlink_button: None,
            },
        )
        .await
    }
}

/// Long-poll `/updates` until the task is aborted.
pub async fn run_polling(bot: Arc<MaxBot>, state: Arc<CoreState>) {
    tracing::info!(bot = %bot.bot_username(), "MAX bot polling started");
    let mut marker = None;
    loop {
        match bot.get_updates(marker).await {
            Ok((updates, next)) => {
                if next.is_some() {
                    marker = next;
                }
                for update in &updates {
                    if let Err(e) = bot.handle_update(&state, update).await {
                        tracing::warn!(error = %e, "MAX update failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "MAX updates request failed");
                tokio::time::sleep(POLL_ERROR_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::encode_link_payload;
    use crate::db::{self, open_memory_database};
    use crate::models::UserInput;

    const SECRET: &str = "max-secret-0123456789";

    fn user(conn: &Connection) -> i64 {
        db::insert_user(
            conn,
            &UserInput {
                name: "Vera".into(),
                username: "vera".into(),
                password: None,
                is_admin: false,
                avatar_url: None,
            },
            "h",
        )
        .unwrap()
        .id
    }

    #[test]
    fn parses_known_and_unknown_updates() {
        let updates = parse_updates(vec![
            json!({"update_type": "bot_started", "timestamp": 1, "chat_id": 9,
                   "user": {"user_id": 42, "name": "Vera"}, "payload": "abc"}),
            json!({"update_type": "message_created", "timestamp": 2,
                   "message": {"sender": {"user_id": 42, "first_name": "Vera"},
                               "recipient": {"chat_id": 9}, "body": {"mid": "m1", "text": "/start"}}}),
            json!({"update_type": "user_added", "timestamp": 3}),
            json!({"update_type": "message_callback"}),
        ]);
        assert_eq!(updates.len(), 3);
        assert!(matches!(&updates[0], Update::BotStarted { payload: Some(p), .. } if p == "abc"));
        assert!(matches!(&updates[1], Update::MessageCreated { .. }));
        assert!(matches!(&updates[2], Update::Other));
    }

    #[test]
    fn link_confirm_unlink_flow() {
        let conn = open_memory_database().unwrap();
        let id = user(&conn);
        let payload = encode_link_payload(id, SECRET);

        let started: Update = serde_json::from_value(json!({
            "update_type": "bot_started",
            "user": {"user_id": 42, "name": "Vera P"},
            "payload": payload
        }))
        .unwrap();
        let Some(MaxAction::Send { user_id, reply }) = plan_update(&conn, SECRET, &started).unwrap() else {
            panic!("expected a send action");
        };
        assert_eq!(user_id, 42);
        assert!(reply.unlink_button.is_none());
        assert_eq!(db::get_user(&conn, id).unwrap().unwrap().max_id, Some(42));

        let confirm: Update = serde_json::from_value(json!({
            "update_type": "message_created",
            "message": {"sender": {"user_id": 42}, "body": {"text": "/start"}}
        }))
        .unwrap();
        let Some(MaxAction::Send { reply, .. }) = plan_update(&conn, SECRET, &confirm).unwrap() else {
            panic!("expected a confirmation");
        };
        assert_eq!(reply.unlink_button, Some(id));
        let body = message_body(&reply);
        assert_eq!(body["format"], "html");
        assert_eq!(
            body["attachments"][0]["payload"]["buttons"][0][0]["payload"],
            format!("unlink_user:{id}")
        );

        let unlink: Update = serde_json::from_value(json!({
            "update_type": "message_callback",
            "callback": {"callback_id": "cb", "payload": format!("unlink_user:{id}"),
                         "user": {"user_id": 42}}
        }))
        .unwrap();
        let action = plan_update(&conn, SECRET, &unlink).unwrap();
        assert!(matches!(action, Some(MaxAction::Answer { ref callback_id, .. }) if callback_id == "cb"));
        assert!(db::get_user(&conn, id).unwrap().unwrap().max_id.is_none());
    }

    #[test]
    fn full_name_prefers_name_field() {
        let u: MaxUser = serde_json::from_value(json!({"user_id": 1, "first_name": "A", "last_name": "B"})).unwrap();
        assert_eq!(u.full_name().as_deref(), Some("A B"));
        let u: MaxUser = serde_json::from_value(json!({"user_id": 1, "name": "Full"})).unwrap();
        assert_eq!(u.full_name().as_deref(), Some("Full"));
        let u: MaxUser = serde_json::from_value(json!({"user_id": 1})).unwrap();
        assert!(u.full_name().is_none());
    }

    #[test]
    fn start_link_format() {
        assert_eq!(start_link("clinic_bot", "p"), "https://max.ru/clinic_bot?start=p");
    }
}
