//! Snapshot Agent - Main entry point

use anyhow::Result;
use clap::Parser;
use snapshot_agent::daemon::{recovery::spawn_startup_recovery, shutdown::ShutdownCoordinator};
use snapshot_agent::fs::{BtrfsSnapshots, SnapshotLayout};
use snapshot_agent::remote::RenterClient;
use snapshot_agent::service::BackupService;
use snapshot_agent::settings::SettingsStore;
use snapshot_agent::{api, config::Config, utils};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting snapshot-agent v{} (agent_id: {})",
        env!("CARGO_PKG_VERSION"),
        config.agent.id
    );

    let settings = SettingsStore::new(&config.paths.settings_file);
    match settings.claim_maintenance(chrono::Utc::now().timestamp()).await {
        Ok(true) => tracing::info!("Maintenance window recorded"),
        Ok(false) => tracing::debug!("Maintenance ran within the last day"),
        Err(e) => tracing::warn!("Could not update {}: {}", settings.path().display(), e),
    }

    let remote = Arc::new(RenterClient::new(&config.storage)?);
    let snapshots = Arc::new(BtrfsSnapshots::new(
        SnapshotLayout::from_config(&config.paths),
        config.paths.storage_mount.clone(),
        config.pipeline.trim_before_snapshot,
    ));
    let service = Arc::new(BackupService::from_config(&config, remote, snapshots));

    // Create shutdown coordinator
    let shutdown_coordinator = ShutdownCoordinator::new();

    let recovery_handle = if config.agent.resume_on_startup {
        Some(spawn_startup_recovery(service.clone(), shutdown_coordinator.token()))
    } else {
        None
    };

    // Determine port
    let port = args.port.unwrap_or(config.agent.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app = api::create_router(api::AppState::new(service.clone(), config.agent.id.as_str()));

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Renter daemon: {}", config.storage.url);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_token = shutdown_coordinator.token();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await });
    let server_handle = tokio::spawn(async move { server.await });

    // Wait for shutdown signal
    shutdown_coordinator.wait_for_signal().await;

    // Graceful shutdown
    shutdown_coordinator
        .shutdown(service.tracker(), Duration::from_secs(5))
        .await;

    if let Some(handle) = recovery_handle {
        let _ = tokio::time::timeout(Duration::from_secs(3), handle).await;
    }

    // Wait for server to finish (with timeout)
    match tokio::time::timeout(Duration::from_secs(5), server_handle).await {
        Ok(Ok(Ok(()))) => tracing::info!("Server shutdown complete"),
        Ok(Ok(Err(e))) => tracing::error!("Server error during shutdown: {}", e),
        Ok(Err(e)) => tracing::error!("Server task panicked: {}", e),
        Err(_) => tracing::warn!("Server shutdown timeout, forcing exit"),
    }

    Ok(())
}
