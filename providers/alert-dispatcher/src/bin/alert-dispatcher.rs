//! # Alert Dispatcher Binary
//!
//! Loads configuration from the environment, prepares the PostgreSQL schema,
//! registers the configured channels and runs until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use alert_dispatcher::{AlertDispatcher, DispatcherConfig, PostgresStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with environment filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("alert_dispatcher=info".parse()?),
        )
        .init();

    info!("🌟 Starting Alert Dispatcher");

    let config = DispatcherConfig::from_env().context("Failed to load configuration")?;
    info!(
        alert_interval_secs = config.alert_interval_secs,
        status_interval_secs = config.status_interval_secs,
        max_attempts = config.max_attempts,
        "Configuration loaded"
    );

    let store = Arc::new(
        PostgresStore::connect(
            &config.database_url,
            config.db_pool_size,
            config.db_wait_timeout(),
        )
            .context("Failed to create database pool")?,
    );
    store.migrate().await.context("Failed to prepare database schema")?;

    let dispatcher =
        AlertDispatcher::new(&config, store).context("Failed to build alert dispatcher")?;
    let registered = dispatcher
        .register_configured_channels(&config)
        .await
        .context("Failed to register notification channels")?;
    if registered == 0 {
        warn!("No notification channels enabled, alerts will be marked sent without delivery");
    }

    dispatcher.start().await.context("Failed to start alert dispatcher")?;
    info!("🎯 Dispatcher ready - waiting for alerts");

    shutdown_signal().await;
    info!("Shutdown signal received");

    dispatcher.close().await;
    info!("👋 Alert Dispatcher shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
