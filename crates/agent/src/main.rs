//! Accelerator Agent Entry Point

use accel_agent::{router, AgentManager, Config, ConfigError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = Config::from_env();

    // Initialize logging; RUST_LOG overrides the configured level
    let level = loaded
        .as_ref()
        .map(|config| config.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting accelerator agent...");

    let config = load_config(loaded)?;
    let addr = config.listen_socket_addr()?;
    info!(
        "Configuration loaded: host={}, catalog={}, listen={}",
        config.host, config.catalog_url, addr
    );

    let manager = Arc::new(AgentManager::from_config(config)?);
    let (stop_tx, stop_rx) = watch::channel(false);

    let sweeper = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run_periodic(stop_rx).await })
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Agent RPC listening on {}", addr);

    axum::serve(listener, router(manager.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Agent shutting down");
    stop_tx.send_replace(true);
    manager.shutdown().await;
    if let Err(e) = sweeper.await {
        error!("Periodic update task ended abnormally: {}", e);
    }

    Ok(())
}

fn load_config(loaded: std::result::Result<Config, ConfigError>) -> Result<Config> {
    match loaded {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
