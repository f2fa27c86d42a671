//! Resume interrupted runs after startup.

use crate::service::BackupService;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Resume every run the recovery plan names, in the background.
pub fn spawn_startup_recovery(
    service: Arc<BackupService>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match service.recover(&shutdown).await {
            Ok(completed) if completed.is_empty() => info!("No backups resumed at startup"),
            Ok(completed) => info!("Resumed backups at startup: {:?}", completed),
            Err(e) => error!("Startup recovery failed: {}", e),
        }
    })
}
