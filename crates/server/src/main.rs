mod bootstrap;
mod health;
mod orchestrator;
mod sync;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use quotelink_core::config::{AppConfig, LoadOptions};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

fn init_logging(config: &AppConfig) {
    use quotelink_core::config::LogFormat::*;
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
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.gateway.clone(),
    )
    .await?;

    let router = sync::router(Arc::clone(&app.orchestrator)).layer(TraceLayer::new_for_http());
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "quotelink-server started"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
    });

    tokio::signal::ctrl_c().await?;
    shutdown.cancel();
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "quotelink-server stopping, draining connections"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_elapsed) => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                grace_secs = app.config.server.graceful_shutdown_secs,
                "graceful shutdown grace period elapsed, exiting"
            );
        }
    }

    Ok(())
}
