//! Staff notifications over the messenger bots.
//!
//! Each bot implements [`Notifier`] for its own channel; the
//! [`NotificationHub`] fans a message out to every linked chat. Delivery is
//! best effort: failures are logged and counted, never returned to the
//! patient-facing request.

pub mod linking;
pub mod max;
pub mod message;
pub mod telegram;

pub use linking::{BotCommand, BotReply};
pub use message::{complaint_message, escape_html, review_message};

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::{Channel, Recipient};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("{channel} API unreachable: {reason}")]
    Connection { channel: Channel, reason: String },

    #[error("{channel} API returned error (status {status}): {body}")]
    Api {
        channel: Channel,
        status: u16,
        body: String,
    },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("State unavailable: {0}")]
    State(String),
}

/// Sends an HTML message to a chat on one channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &Recipient, html: &str) -> Result<(), NotifyError>;
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    /// Recipients on a channel with no configured bot.
    pub skipped: usize,
}

/// Routes messages to the configured bot for each recipient's channel.
#[derive(Clone, Default)]
pub struct NotificationHub {
    telegram: Option<Arc<dyn Notifier>>,
    max: Option<Arc<dyn Notifier>>,
}

impl NotificationHub {
    pub fn new(telegram: Option<Arc<dyn Notifier>>, max: Option<Arc<dyn Notifier>>) -> Self {
        Self { telegram, max }
    }

    fn notifier(&self, channel: Channel) -> Option<&Arc<dyn Notifier>> {
        match channel {
            Channel::Telegram => self.telegram.as_ref(),
            Channel::Max => self.max.as_ref(),
        }
    }

    pub fn is_configured(&self, channel: Channel) -> bool {
        self.notifier(channel).is_some()
    }

    /// Send `html` to every recipient. Never fails.
    pub async fn broadcast(&self, recipients: &[Recipient], html: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for recipient in recipients {
            let Some(notifier) = self.notifier(recipient.channel) else {
                report.skipped += 1;
                continue;
            };
            match notifier.send(recipient, html).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id = recipient.user_id,
                        channel = %recipient.channel,
                        error = %e,
                        "Failed to deliver staff notification"
                    );
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Staff notification broadcast"
        );
        report
    }
}

/// Test double that records every message and can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Recipient, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<(Recipient, String)> {
        self.sent.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &Recipient, html: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Connection {
                channel: recipient.channel,
                reason: "recording notifier set to fail".into(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipient.clone(), html.to_string()));
        }
        Ok(())
    }
}
