//! Messenger linking for staff notifications.
//!
//! The link endpoints hand out a bot deep link carrying a signed payload;
//! the bot completes the link when the staff member presses Start.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::auth;
use crate::db;
use crate::models::Channel;
use crate::notify::{max, telegram};

#[derive(Serialize)]
pub struct LinkResponse {
    pub start_link: String,
}

fn start_link(ctx: &ApiContext, user_id: i64, channel: Channel) -> Result<LinkResponse, ApiError> {
    let config = &ctx.core.config;
    let bot = match channel {
        Channel::Telegram => config.telegram.as_ref(),
        Channel::Max => config.max.as_ref(),
    }
    .ok_or_else(|| ApiError::NotConfigured(format!("{channel} bot is not configured")))?;

    let payload = auth::encode_link_payload(user_id, &config.auth.secret);
    let start_link = match channel {
        Channel::Telegram => telegram::start_link(&bot.bot_username, &payload),
        Channel::Max => max::start_link(&bot.bot_username, &payload),
    };
    Ok(LinkResponse { start_link })
}

fn unlink(ctx: &ApiContext, user_id: i64, channel: Channel) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.lock_db()?;
    if db::clear_messenger_link(&conn, user_id, channel)? {
        tracing::info!(user_id, channel = %channel, "Messenger unlinked");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/telegram/link`
pub async fn telegram_link(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<LinkResponse>, ApiError> {
    start_link(&ctx, auth.user.id, Channel::Telegram).map(Json)
}

/// `POST /api/telegram/unlink`
pub async fn telegram_unlink(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    unlink(&ctx, auth.user.id, Channel::Telegram)
}

/// `GET /api/max/link`
pub async fn max_link(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<LinkResponse>, ApiError> {
    start_link(&ctx, auth.user.id, Channel::Max).map(Json)
}

/// `POST /api/max/unlink`
pub async fn max_unlink(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    unlink(&ctx, auth.user.id, Channel::Max)
}
