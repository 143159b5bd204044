mod api;
mod bootstrap;
mod events;
mod health;

use std::time::Duration;

use anyhow::Result;
use forcage_core::config::{AppConfig, LoadOptions};
use tokio::net::TcpListener;

fn init_logging(config: &AppConfig) {
    use forcage_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes up before bootstrap so connection and migration failures are visible.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let bind = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let state = api::ApiState::new(app.lifecycle, app.config.server.api_token.clone());
    let routes = api::router(state).merge(health::router(app.db_pool.clone()));

    let listener = TcpListener::bind(&bind).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind = %bind,
        "forcage-server listening"
    );

    axum::serve(listener, routes).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "forcage-server stopping"
    );

    // The router owned the last lifecycle handle, so the audit channel is now closed.
    match tokio::time::timeout(grace, app.audit).await {
        Ok(Ok(flushed)) => tracing::info!(
            event_name = "system.audit.flushed",
            correlation_id = "shutdown",
            flushed,
            "audit subscriber drained"
        ),
        Ok(Err(error)) => tracing::warn!(
            event_name = "system.audit.failed",
            correlation_id = "shutdown",
            error = %error,
            "audit subscriber ended abnormally"
        ),
        Err(_) => tracing::warn!(
            event_name = "system.audit.timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "audit subscriber did not drain before the grace period ended"
        ),
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.server.signal_failed",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c; shutting down"
        );
    }
}
