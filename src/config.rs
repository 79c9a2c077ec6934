//! Service configuration, loaded from a TOML file with environment overrides
//! for secrets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const APP_NAME: &str = "clinic-reviews";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "CLINIC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";
const MIN_SECRET_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    ReadError { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub images: ImagesConfig,
    /// Absent section disables the Telegram bot.
    pub telegram: Option<BotConfig>,
    /// Absent section disables the MAX bot.
    pub max: Option<BotConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Externally visible base URL, used to build image links.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".into(),
            public_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/clinic.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for access tokens and messenger link payloads.
    pub secret: String,
    pub token_ttl_hours: u64,
    /// PBKDF2 iteration count for new password hashes.
    pub password_rounds: u32,
    pub bootstrap_username: Option<String>,
    pub bootstrap_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_hours: 24 * 7,
            password_rounds: 100_000,
            bootstrap_username: None,
            bootstrap_password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/images"),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub token: String,
    /// Bot handle used in deep links (`https://t.me/<bot_username>?start=...`).
    pub bot_username: String,
}

impl AppConfig {
    /// Load from the file named by `CLINIC_CONFIG` (default `config.toml`),
    /// then apply environment overrides. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Override secrets and deployment paths from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup("CLINIC_AUTH_SECRET") {
            self.auth.secret = secret;
        }
        if let Some(key) = lookup("CLINIC_LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(path) = lookup("CLINIC_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(bind) = lookup("CLINIC_BIND") {
            self.server.bind = bind;
        }
        if let (Some(token), Some(bot)) = (lookup("CLINIC_TELEGRAM_TOKEN"), self.telegram.as_mut()) {
            bot.token = token;
        }
        if let (Some(token), Some(bot)) = (lookup("CLINIC_MAX_TOKEN"), self.max.as_mut()) {
            bot.token = token;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret.chars().count() < MIN_SECRET_LEN {
            return Err(ConfigError::ValidationError(format!(
                "auth.secret must be at least {MIN_SECRET_LEN} characters"
            )));
        }
        if self.auth.token_ttl_hours == 0 {
            return Err(ConfigError::ValidationError(
                "auth.token_ttl_hours must be positive".into(),
            ));
        }
        if self.auth.password_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "auth.password_rounds must be positive".into(),
            ));
        }
        for (name, bot) in [("telegram", &self.telegram), ("max", &self.max)] {
            if let Some(bot) = bot {
                if bot.token.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!("{name}.token is empty")));
                }
            }
        }
        Ok(())
    }
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "clinic_reviews=info,tower_http=info"
}
