pub mod api; // HTTP router, middleware and handlers
pub mod auth; // Passwords, access tokens, signed link payloads
pub mod config;
pub mod core_state; // Shared state for the router and bots
pub mod db;
pub mod export; // Dashboard xlsx export
pub mod images;
pub mod llm; // Review text generation
pub mod models;
pub mod notify; // Telegram and MAX bots
pub mod server;

use tracing_subscriber::EnvFilter;

/// Startup failures that stop the process.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error(transparent)]
    Server(#[from] server::ServerError),
}

/// Run the service until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::load()?;
    config.validate()?;

    let services = server::build_state(config)?;
    if let Some(admin) = services.core.bootstrap_admin()? {
        tracing::warn!(username = %admin.username, "Created bootstrap admin, change its password");
    }

    server::serve(services, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    })
    .await?;
    Ok(())
}
