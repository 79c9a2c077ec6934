//! Chat linking conversation shared by both bots.
//!
//! Bots translate their wire updates into [`BotCommand`]s and call the
//! `handle_*` functions, which update the database and return the
//! [`BotReply`] to send. Nothing here touches the network.

use rusqlite::Connection;

use super::escape_html;
use crate::auth::decode_link_payload;
use crate::db::{self, DatabaseError};
use crate::models::{Channel, User};

/// Callback payload prefix of the unlink button.
pub const UNLINK_CALLBACK_PREFIX: &str = "unlink_user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `/start`, optionally carrying a deep-link payload.
    Start { payload: Option<String> },
    /// Unlink button pressed for a user.
    Unlink { user_id: i64 },
}

impl BotCommand {
    /// Parse a text message. Accepts `/start`, `/start <payload>` and
    /// `/start@bot_name <payload>`.
    pub fn parse_text(text: &str) -> Option<Self> {
        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let command = parts.next()?;
        let name = command.split('@').next()?;
        if name != "/start" {
            return None;
        }
        let payload = parts
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Some(Self::Start { payload })
    }

    /// Parse callback data (`unlink_user:<id>`).
    pub fn parse_callback(data: &str) -> Option<Self> {
        let (prefix, id) = data.split_once(':')?;
        if prefix != UNLINK_CALLBACK_PREFIX {
            return None;
        }
        id.trim().parse().ok().map(|user_id| Self::Unlink { user_id })
    }
}

pub fn unlink_callback_data(user_id: i64) -> String {
    format!("{UNLINK_CALLBACK_PREFIX}:{user_id}")
}

/// Message for the bot to send, with an optional unlink button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
    pub text: String,
    /// User id the unlink button refers to.
    pub unlink_button: Option<i64>,
}

impl BotReply {
    fn text(text: String) -> Self {
        Self {
            text,
            unlink_button: None,
        }
    }
}

pub const UNLINK_BUTTON_TEXT: &str = "❌ Отвязать";

fn channel_title(channel: Channel) -> &'static str {
    match channel {
        Channel::Telegram => "Telegram",
        Channel::Max => "MAX",
    }
}

fn linked_reply(channel: Channel, user: &User) -> BotReply {
    match channel {
        Channel::Telegram => BotReply {
            text: format!(
                "✨ Telegram успешно привязан к аккаунту <b>«{}»</b>!\n\
                 Теперь все уведомления о новых отзывах и жалобах будут направляться сюда.",
                escape_html(&user.name)
            ),
            unlink_button: Some(user.id),
        },
        // MAX asks for an explicit /start before showing the unlink button.
        Channel::Max => BotReply::text(format!(
            "✨ Привязываем MAX к аккаунту <b>«{}»</b>!\n\
             Отправь мне /start, чтобы подтвердить привязку аккаунта.",
            escape_html(&user.name)
        )),
    }
}

/// Link the chat to the user named by a deep-link payload.
///
/// Returns `None` when the payload is forged or the user no longer exists;
/// the bot then stays silent.
pub fn handle_start(
    conn: &Connection,
    channel: Channel,
    secret: &str,
    payload: &str,
    chat_id: i64,
    display_name: Option<&str>,
) -> Result<Option<BotReply>, DatabaseError> {
    let Some(user_id) = decode_link_payload(payload, secret) else {
        tracing::warn!(channel = %channel, chat_id, "Rejected messenger link payload");
        return Ok(None);
    };
    let Some(user) = db::get_user(conn, user_id)? else {
        return Ok(None);
    };
    db::set_messenger_link(conn, user.id, channel, chat_id, display_name)?;
    tracing::info!(user_id = user.id, channel = %channel, "Messenger chat linked");
    Ok(Some(linked_reply(channel, &user)))
}

/// Plain `/start` from a chat: confirm the link if there is one.
pub fn handle_confirm(
    conn: &Connection,
    channel: Channel,
    chat_id: i64,
) -> Result<Option<BotReply>, DatabaseError> {
    let reply = match db::get_user_by_chat(conn, channel, chat_id)? {
        Some(user) => BotReply {
            text: format!(
                "✨ Привязка {} аккаунта подтверждена!\n\
                 Теперь все уведомления о новых отзывах и жалобах будут направляться сюда.",
                channel_title(channel)
            ),
            unlink_button: Some(user.id),
        },
        None => BotReply::text(
            "Аккаунт не привязан. Откройте ссылку привязки в панели управления клиники.".into(),
        ),
    };
    Ok(Some(reply))
}

/// Unlink button pressed. Only the chat that is linked can unlink itself.
pub fn handle_unlink(
    conn: &Connection,
    channel: Channel,
    user_id: i64,
    chat_id: i64,
) -> Result<Option<BotReply>, DatabaseError> {
    let Some(user) = db::get_user(conn, user_id)? else {
        return Ok(None);
    };
    let linked = user.chat_id(channel) == Some(chat_id);
    if !linked || !db::unlink_chat(conn, user.id, channel, chat_id)? {
        return Ok(Some(BotReply::text(format!(
            "ℹ️ Этот чат не привязан к аккаунту <b>«{}»</b>.",
            escape_html(&user.name)
        ))));
    }
    tracing::info!(user_id = user.id, channel = %channel, "Messenger chat unlinked");
    Ok(Some(BotReply::text(format!(
        "🛑 {} успешно отвязан от аккаунта <b>«{}»</b>.\n\
         Вы больше не будете получать уведомления о новых отзывах и жалобах.",
        channel_title(channel),
        escape_html(&user.name)
    ))))
}
