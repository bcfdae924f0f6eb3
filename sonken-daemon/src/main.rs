use anyhow::Context;
use clap::Parser;
use sonken_core::{
    init_observability, shutdown_observability, Broadcaster, Config, MonitorManager, StateManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod api;
mod shutdown;

/// Sonken project monitoring daemon.
#[derive(Parser, Debug)]
#[command(name = "sonkend", version, about)]
struct Args {
    /// Path to config.json (defaults to the data directory)
    #[arg(long, env = "SONKEN_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the live-update and health endpoints
    #[arg(long)]
    listen: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    // Initialize observability FIRST
    init_observability(&config.log_level, config.metrics_port)
        .map_err(|e| anyhow::anyhow!("failed to initialize observability: {}", e))?;

    info!("Sonken daemon starting");

    info!("Initializing state manager at {}", config.db_path);
    let state = Arc::new(
        StateManager::new(&config.db_path).await.context("failed to initialize state manager")?,
    );

    let manager =
        Arc::new(MonitorManager::new(state.clone(), Broadcaster::new(), config.monitor.clone()));
    let started = manager.start_all().await.context("failed to start monitoring")?;
    info!(projects = started, "Monitoring bootstrapped");

    let shutdown = shutdown::shutdown_signal();
    let app = api::router(api::AppState { manager: manager.clone(), shutdown: shutdown.clone() });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Sonken daemon ready");

    axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    shutdown::ShutdownManager::new(manager, state).shutdown().await;

    info!("Sonken daemon shut down");
    shutdown_observability();
    Ok(())
}
