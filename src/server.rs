//! Server lifecycle: wire the shared state, mount the API router and run
//! the messenger pollers next to it.
//!
//! bind → spawn bot pollers → serve until the shutdown future resolves →
//! abort pollers.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::api_router;
use crate::config::AppConfig;
use crate::core_state::CoreState;
use crate::db::{self, DatabaseError};
use crate::llm::{LlmError, OpenAiClient};
use crate::notify::max::{self, MaxBot};
use crate::notify::telegram::{self, TelegramBot};
use crate::notify::{NotificationHub, Notifier, NotifyError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),
    #[error("Messenger client error: {0}")]
    Notify(#[from] NotifyError),
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the process runs: shared state plus the configured bots.
pub struct AppServices {
    pub core: Arc<CoreState>,
    pub telegram: Option<Arc<TelegramBot>>,
    pub max: Option<Arc<MaxBot>>,
}

/// Open the database and build the LLM client and the configured bots.
pub fn build_state(config: AppConfig) -> Result<AppServices, ServerError> {
    let conn = db::open_database(&config.database.path)?;
    let generator = Arc::new(OpenAiClient::new(&config.llm)?);

    let telegram = config
        .telegram
        .as_ref()
        .map(TelegramBot::new)
        .transpose()?
        .map(Arc::new);
    let max = config.max.as_ref().map(MaxBot::new).transpose()?.map(Arc::new);

    let hub = NotificationHub::new(
        telegram.clone().map(|b| b as Arc<dyn Notifier>),
        max.clone().map(|b| b as Arc<dyn Notifier>),
    );
    tracing::info!(
        telegram = telegram.is_some(),
        max = max.is_some(),
        model = %config.llm.model,
        "Services configured"
    );

    Ok(AppServices {
        core: Arc::new(CoreState::new(config, conn, generator, hub)),
        telegram,
        max,
    })
}

/// The API router with CORS and request tracing.
pub fn app(core: Arc<CoreState>) -> axum::Router {
    api_router(core)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

fn spawn_pollers(services: &AppServices) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();
    if let Some(bot) = &services.telegram {
        tasks.push(tokio::spawn(telegram::run_polling(bot.clone(), services.core.clone())));
    }
    if let Some(bot) = &services.max {
        tasks.push(tokio::spawn(max::run_polling(bot.clone(), services.core.clone())));
    }
    tasks
}

/// Bind `server.bind` and serve until `shutdown` resolves.
pub async fn serve<F>(services: AppServices, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = services.core.config.server.bind.clone();
    let listener = TcpListener::bind(&addr).await.map_err(|e| ServerError::Bind {
        addr: addr.clone(),
        reason: e.to_string(),
    })?;
    serve_on(listener, services, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_on<F>(listener: TcpListener, services: AppServices, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let pollers = spawn_pollers(&services);
    tracing::info!(%addr, pollers = pollers.len(), "Clinic API server started");

    let result = axum::serve(listener, app(services.core.clone()))
        .with_graceful_shutdown(shutdown)
        .await;

    for task in pollers {
        task.abort();
    }
    tracing::info!("Clinic API server stopped");
    result.map_err(ServerError::from)
}
