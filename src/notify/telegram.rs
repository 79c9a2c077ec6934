//! Telegram Bot API client, staff notifier and chat-linking poller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::linking::{self, unlink_callback_data, BotCommand, BotReply, UNLINK_BUTTON_TEXT};
use super::{Notifier, NotifyError};
use crate::config::BotConfig;
use crate::core_state::CoreState;
use crate::db::DatabaseError;
use crate::models::{Channel, Recipient};

const API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 25;
const HTTP_TIMEOUT_SECS: u64 = 60;
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Deep link that opens the bot with `payload` as the start parameter.
pub fn start_link(bot_username: &str, payload: &str) -> String {
    format!(
        "https://t.me/{}?start={payload}",
        bot_username.trim_start_matches('@')
    )
}

// ── Wire types ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<TelegramUser>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl TelegramUser {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<Message>,
    pub data: Option<String>,
}

fn reply_markup(reply: &BotReply) -> Option<Value> {
    reply.unlink_button.map(|user_id| {
        json!({
            "inline_keyboard": [[{
                "text": UNLINK_BUTTON_TEXT,
                "callback_data": unlink_callback_data(user_id),
            }]]
        })
    })
}

// ── Update handling ─────────────────────────────────────

/// What the bot should do in response to an update.
#[derive(Debug, Clone, PartialEq)]
pub enum TelegramAction {
    Send { chat_id: i64, reply: BotReply },
    Edit { chat_id: i64, message_id: i64, reply: BotReply },
    AnswerCallback { callback_id: String },
}

/// Decide the response to one update, applying link changes to the database.
pub fn plan_update(
    conn: &Connection,
    secret: &str,
    update: &Update,
) -> Result<Vec<TelegramAction>, DatabaseError> {
    let mut actions = Vec::new();

    if let Some(message) = &update.message {
        let command = message.text.as_deref().and_then(BotCommand::parse_text);
        if let Some(BotCommand::Start { payload: Some(payload) }) = command {
            let display_name = message.from.as_ref().map(TelegramUser::full_name);
            let reply = linking::handle_start(
                conn,
                Channel::Telegram,
                secret,
                &payload,
                message.chat.id,
                display_name.as_deref(),
            )?;
            if let Some(reply) = reply {
                actions.push(TelegramAction::Send {
                    chat_id: message.chat.id,
                    reply,
                });
            }
        }
    }

    if let Some(callback) = &update.callback_query {
        let command = callback.data.as_deref().and_then(BotCommand::parse_callback);
        if let (Some(BotCommand::Unlink { user_id }), Some(message)) = (command, &callback.message) {
            if let Some(reply) = linking::handle_unlink(conn, Channel::Telegram, user_id, message.chat.id)? {
                actions.push(TelegramAction::Edit {
                    chat_id: message.chat.id,
                    message_id: message.message_id,
                    reply,
                });
            }
        }
        actions.push(TelegramAction::AnswerCallback {
            callback_id: callback.id.clone(),
        });
    }

    Ok(actions)
}

// ── Client ──────────────────────────────────────────────

pub struct TelegramBot {
    api_base: String,
    bot_username: String,
    client: reqwest::Client,
}

impl TelegramBot {
    pub fn new(config: &BotConfig) -> Result<Self, NotifyError> {
        Self::with_api_base(config, API_BASE)
    }

    pub fn with_api_base(config: &BotConfig, api_base: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| NotifyError::HttpClient(e.to_string()))?;
        Ok(Self {
            api_base: format!("{}/bot{}", api_base.trim_end_matches('/'), config.token),
            bot_username: config.bot_username.clone(),
            client,
        })
    }

    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, NotifyError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.api_base))
            .json(body)
            .send()
            .await
            .map_err(|e| NotifyError::Connection {
                channel: Channel::Telegram,
                reason: e.without_url().to_string(),
            })?;

        let status = response.status();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| NotifyError::ResponseParsing(e.to_string()))?;
        if !status.is_success() || !parsed.ok {
            return Err(NotifyError::Api {
                channel: Channel::Telegram,
                status: status.as_u16(),
                body: parsed.description.unwrap_or_default(),
            });
        }
        parsed
            .result
            .ok_or_else(|| NotifyError::ResponseParsing(format!("{method}: missing result")))
    }

    pub async fn send_message(&self, chat_id: i64, reply: &BotReply) -> Result<(), NotifyError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": reply.text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = reply_markup(reply) {
            body["reply_markup"] = markup;
        }
        self.call::<Value>("sendMessage", &body).await.map(|_| ())
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        reply: &BotReply,
    ) -> Result<(), NotifyError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": reply.text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = reply_markup(reply) {
            body["reply_markup"] = markup;
        }
        self.call::<Value>("editMessageText", &body).await.map(|_| ())
    }

    pub async fn answer_callback_query(&self, callback_id: &str) -> Result<(), NotifyError> {
        self.call::<bool>("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))
            .await
            .map(|_| ())
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, NotifyError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    async fn execute(&self, action: &TelegramAction) -> Result<(), NotifyError> {
        match action {
            TelegramAction::Send { chat_id, reply } => self.send_message(*chat_id, reply).await,
            TelegramAction::Edit {
                chat_id,
                message_id,
                reply,
            } => self.edit_message_text(*chat_id, *message_id, reply).await,
            TelegramAction::AnswerCallback { callback_id } => {
                self.answer_callback_query(callback_id).await
            }
        }
    }

    async fn handle_update(&self, state: &CoreState, update: &Update) -> Result<(), NotifyError> {
        let actions = {
            let conn = state
                .lock_db()
                .map_err(|e| NotifyError::State(e.to_string()))?;
            plan_update(&conn, &state.config.auth.secret, update)?
        };
        for action in &actions {
            self.execute(action).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramBot {
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

/// Long-poll `getUpdates` until the task is aborted.
pub async fn run_polling(bot: Arc<TelegramBot>, state: Arc<CoreState>) {
    tracing::info!(bot = %bot.bot_username(), "Telegram bot polling started");
    let mut offset = 0;
    loop {
        match bot.get_updates(offset).await {
            Ok(updates) => {
                for update in updates {
                    offset = update.update_id + 1;
                    if let Err(e) = bot.handle_update(&state, &update).await {
                        tracing::warn!(update_id = update.update_id, error = %e, "Telegram update failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Telegram getUpdates failed");
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

    const SECRET: &str = "telegram-secret-0123456789";

    fn update(raw: Value) -> Update {
        serde_json::from_value(raw).unwrap()
    }

    fn user(conn: &Connection) -> i64 {
        db::insert_user(
            conn,
            &UserInput {
                name: "Oleg".into(),
                username: "oleg".into(),
                password: None,
                is_admin: true,
                avatar_url: None,
            },
            "h",
        )
        .unwrap()
        .id
    }

    #[test]
    fn start_link_format() {
        assert_eq!(start_link("@clinic_bot", "abc"), "https://t.me/clinic_bot?start=abc");
    }

    #[test]
    fn start_with_payload_links_chat() {
        let conn = open_memory_database().unwrap();
        let id = user(&conn);
        let payload = encode_link_payload(id, SECRET);
        let upd = update(json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "chat": {"id": 321},
                "from": {"id": 321, "first_name": "Oleg", "last_name": "K"},
                "text": format!("/start {payload}")
            }
        }));

        let actions = plan_update(&conn, SECRET, &upd).unwrap();
        assert_eq!(actions.len(), 1);
        let TelegramAction::Send { chat_id, reply } = &actions[0] else {
            panic!("expected send, got {actions:?}");
        };
        assert_eq!(*chat_id, 321);
        assert_eq!(reply.unlink_button, Some(id));
        let markup = reply_markup(reply).unwrap();
        assert_eq!(
            markup["inline_keyboard"][0][0]["callback_data"],
            format!("unlink_user:{id}")
        );

        let stored = db::get_user(&conn, id).unwrap().unwrap();
        assert_eq!(stored.telegram_id, Some(321));
        assert_eq!(stored.telegram_name.as_deref(), Some("Oleg K"));
    }

    #[test]
    fn bare_start_and_chatter_are_ignored() {
        let conn = open_memory_database().unwrap();
        for text in ["/start", "hello"] {
            let upd = update(json!({
                "update_id": 2,
                "message": {"message_id": 1, "chat": {"id": 5}, "text": text}
            }));
            assert!(plan_update(&conn, SECRET, &upd).unwrap().is_empty());
        }
    }

    #[test]
    fn unlink_callback_edits_and_answers() {
        let conn = open_memory_database().unwrap();
        let id = user(&conn);
        db::set_messenger_link(&conn, id, Channel::Telegram, 321, None).unwrap();
        let upd = update(json!({
            "update_id": 3,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 321, "first_name": "Oleg"},
                "message": {"message_id": 10, "chat": {"id": 321}},
                "data": format!("unlink_user:{id}")
            }
        }));

        let actions = plan_update(&conn, SECRET, &upd).unwrap();
        assert!(matches!(actions[0], TelegramAction::Edit { chat_id: 321, message_id: 10, .. }));
        assert_eq!(actions[1], TelegramAction::AnswerCallback { callback_id: "cb-1".into() });
        assert!(db::get_user(&conn, id).unwrap().unwrap().telegram_id.is_none());
    }

    #[test]
    fn api_error_envelope_parses() {
        let parsed: ApiResponse<Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        )
        .unwrap();
        assert!(!parsed.ok);
        assert!(parsed.result.is_none());
        assert!(parsed.description.unwrap().contains("blocked"));
    }
}
