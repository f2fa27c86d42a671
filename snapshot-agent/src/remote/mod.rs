//! Remote storage boundary.
//!
//! The renter daemon is an eventually-consistent store: every query returns a
//! full, possibly stale view of the files it knows about, and uploads run
//! asynchronously after they are submitted.

pub mod memory;
pub mod renter;
pub mod retry;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub use memory::MemoryStorage;
pub use renter::RenterClient;
pub use retry::RetryPolicy;

/// Point-in-time view of one remote file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFileState {
    pub name: String,
    pub size: u64,
    /// Upload progress in percent (0-100)
    pub progress: f64,
    /// Fully redundant on the network
    pub available: bool,
}

impl RemoteFileState {
    /// Bytes of this file the network already holds.
    pub fn uploaded_bytes(&self) -> f64 {
        self.size as f64 * self.progress / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusState {
    pub synced: bool,
}

#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn consensus(&self) -> Result<ConsensusState>;

    /// Full listing of every file the renter knows.
    async fn list_files(&self) -> Result<Vec<RemoteFileState>>;

    /// Start an asynchronous upload of `source` under `remote_name`.
    async fn submit_upload(&self, remote_name: &str, source: &Path) -> Result<()>;
}

/// Remote listing keyed by exact remote name.
#[derive(Debug, Default, Clone)]
pub struct RemoteIndex {
    files: HashMap<String, RemoteFileState>,
}

impl RemoteIndex {
    pub fn new(files: Vec<RemoteFileState>) -> Self {
        Self {
            files: files.into_iter().map(|f| (f.name.clone(), f)).collect(),
        }
    }

    pub fn get(&self, remote_name: &str) -> Option<&RemoteFileState> {
        self.files.get(remote_name)
    }
}
