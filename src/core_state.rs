//! Shared application state for the HTTP handlers and the bot pollers.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::auth::{self, AuthError};
use crate::config::AppConfig;
use crate::db;
use crate::llm::ReviewTextGenerator;
use crate::models::{User, UserInput};
use crate::notify::{DeliveryReport, NotificationHub};

/// Wrapped in `Arc` at startup and shared by the router and both bots.
///
/// The connection sits behind a `std::sync::Mutex`; guards are taken in a
/// block and dropped before any `.await`.
pub struct CoreState {
    pub config: AppConfig,
    db: Mutex<Connection>,
    pub generator: Arc<dyn ReviewTextGenerator>,
    pub notifier: NotificationHub,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl CoreState {
    pub fn new(
        config: AppConfig,
        conn: Connection,
        generator: Arc<dyn ReviewTextGenerator>,
        notifier: NotificationHub,
    ) -> Self {
        Self {
            config,
            db: Mutex::new(conn),
            generator,
            notifier,
        }
    }

    /// Lock the database connection.
    pub fn lock_db(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.db.lock().map_err(|_| CoreError::LockPoisoned)
    }

    /// Send `html` to every linked staff chat. Delivery failures are counted
    /// in the report; only a database failure is an error.
    pub async fn notify_staff(&self, html: &str) -> Result<DeliveryReport, CoreError> {
        let recipients = {
            let conn = self.lock_db()?;
            db::list_recipients(&conn)?
        };
        if recipients.is_empty() {
            tracing::debug!("No linked staff chats, notification skipped");
            return Ok(DeliveryReport::default());
        }
        Ok(self.notifier.broadcast(&recipients, html).await)
    }

    /// Create the first admin from the configured bootstrap credentials.
    ///
    /// Does nothing once any user exists or when credentials are missing.
    pub fn bootstrap_admin(&self) -> Result<Option<User>, CoreError> {
        let (Some(username), Some(password)) = (
            self.config.auth.bootstrap_username.as_deref(),
            self.config.auth.bootstrap_password.as_deref(),
        ) else {
            return Ok(None);
        };

        let conn = self.lock_db()?;
        if db::count_users(&conn)? > 0 {
            return Ok(None);
        }
        let hash = auth::hash_password(password, self.config.auth.password_rounds)?;
        let user = db::insert_user(
            &conn,
            &UserInput {
                name: username.to_string(),
                username: username.to_string(),
                password: None,
                is_admin: true,
                avatar_url: None,
            },
            &hash,
        )?;
        tracing::info!(user_id = user.id, username = %user.username, "Bootstrap admin created");
        Ok(Some(user))
    }
}
