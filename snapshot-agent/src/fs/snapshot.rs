//! Read-only volume snapshots.
//!
//! Every data volume keeps its snapshots in `<root>/snapshots/<name>`. Data
//! files sit one directory below the snapshot root (`<name>/<seed>/*.dat`).

use super::walker::{walk_directory, FileInfo, WalkOptions};
use crate::config::PathsConfig;
use crate::{AgentError, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

const BTRFS: &str = "/usr/sbin/btrfs";
const FSTRIM: &str = "/usr/sbin/fstrim";
const SYNC: &str = "/usr/bin/sync";

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Flush pending writes before snapshotting. Failures are not fatal.
    async fn prepare(&self);

    async fn create(&self, name: &str) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    fn exists(&self, name: &str) -> bool;

    /// Data files of a snapshot, including empty ones.
    async fn data_files(&self, name: &str) -> Result<Vec<FileInfo>>;
}

/// Where snapshots and their data files live.
#[derive(Debug, Clone)]
pub struct SnapshotLayout {
    pub data_roots: Vec<PathBuf>,
    pub extension: String,
}

impl SnapshotLayout {
    pub fn new(data_roots: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            data_roots,
            extension: extension.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(paths.data_roots.clone(), paths.data_file_extension.clone())
    }

    pub fn snapshots_dir(root: &Path) -> PathBuf {
        root.join("snapshots")
    }

    /// Snapshot directories of `name` that currently exist.
    pub fn snapshot_dirs(&self, name: &str) -> Vec<PathBuf> {
        self.data_roots
            .iter()
            .map(|root| Self::snapshots_dir(root).join(name))
            .filter(|dir| dir.is_dir())
            .collect()
    }

    pub fn exists(&self, name: &str) -> bool {
        !self.snapshot_dirs(name).is_empty()
    }

    pub fn scan(&self, name: &str) -> std::io::Result<Vec<FileInfo>> {
        let options = WalkOptions {
            min_depth: 2,
            max_depth: Some(2),
            extension: Some(self.extension.clone()),
            ..WalkOptions::default()
        };
        let mut files = Vec::new();
        for dir in self.snapshot_dirs(name) {
            files.extend(walk_directory(&dir, &options)?);
        }
        Ok(files)
    }
}

/// Snapshots taken with `btrfs subvolume snapshot -r`.
pub struct BtrfsSnapshots {
    layout: SnapshotLayout,
    storage_mount: PathBuf,
    trim: bool,
}

impl BtrfsSnapshots {
    pub fn new(layout: SnapshotLayout, storage_mount: PathBuf, trim: bool) -> Self {
        Self {
            layout,
            storage_mount,
            trim,
        }
    }
}

#[async_trait]
impl SnapshotProvider for BtrfsSnapshots {
    async fn prepare(&self) {
        if self.trim {
            info!("Trimming {} to drop deleted blocks from the virtual disk", self.storage_mount.display());
            if let Err(e) = run(FSTRIM, &[self.storage_mount.as_os_str()]).await {
                warn!("fstrim failed: {}", e);
            }
        }
        info!("Flushing file system caches");
        if let Err(e) = run(SYNC, &[]).await {
            warn!("sync failed: {}", e);
        }
    }

    async fn create(&self, name: &str) -> Result<()> {
        info!(snapshot = %name, "Creating read-only data snapshots");
        for root in &self.layout.data_roots {
            let snapshots = SnapshotLayout::snapshots_dir(root);
            tokio::fs::create_dir_all(&snapshots).await?;
            let target = snapshots.join(name);
            if target.is_dir() {
                info!(snapshot = %name, "Snapshot already present in {}", root.display());
                continue;
            }
            run(
                BTRFS,
                &[
                    OsStr::new("subvolume"),
                    OsStr::new("snapshot"),
                    OsStr::new("-r"),
                    root.as_os_str(),
                    target.as_os_str(),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        info!(snapshot = %name, "Removing data snapshots");
        for dir in self.layout.snapshot_dirs(name) {
            run(BTRFS, &[OsStr::new("subvolume"), OsStr::new("delete"), dir.as_os_str()]).await?;
        }
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.layout.exists(name)
    }

    async fn data_files(&self, name: &str) -> Result<Vec<FileInfo>> {
        let layout = self.layout.clone();
        let name = name.to_string();
        let files = tokio::task::spawn_blocking(move || layout.scan(&name))
            .await
            .map_err(|e| AgentError::Snapshot(format!("snapshot scan panicked: {}", e)))??;
        Ok(files)
    }
}

async fn run(program: &str, args: &[&OsStr]) -> Result<()> {
    let status = Command::new(program).args(args).status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(AgentError::Snapshot(format!("{} exited with {}", program, status)))
    }
}
