//! In-memory renter used for dry runs and tests.
//!
//! Submitted uploads appear immediately with zero progress; callers advance
//! them with [`MemoryStorage::set_progress`].

use super::{ConsensusState, RemoteFileState, RemoteStorage};
use crate::{AgentError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<String, RemoteFileState>,
    submissions: Vec<(String, PathBuf)>,
    unsynced: bool,
    unreachable: bool,
    failing_queries: bool,
    rejected: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add or replace a file in the listing.
    pub fn insert(&self, file: RemoteFileState) {
        self.lock().files.insert(file.name.clone(), file);
    }

    pub fn remove(&self, remote_name: &str) {
        self.lock().files.remove(remote_name);
    }

    /// Update progress of a known file. Returns false if it is unknown.
    pub fn set_progress(&self, remote_name: &str, progress: f64, available: bool) -> bool {
        match self.lock().files.get_mut(remote_name) {
            Some(file) => {
                file.progress = progress;
                file.available = available;
                true
            }
            None => false,
        }
    }

    /// Mark every known file fully uploaded and available.
    pub fn complete_all(&self) {
        for file in self.lock().files.values_mut() {
            file.progress = 100.0;
            file.available = true;
        }
    }

    /// Every accepted submission in order.
    pub fn submissions(&self) -> Vec<(String, PathBuf)> {
        self.lock().submissions.clone()
    }

    pub fn set_synced(&self, synced: bool) {
        self.lock().unsynced = !synced;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().unreachable = !reachable;
    }

    /// Make file listings fail until reset.
    pub fn set_failing_queries(&self, failing: bool) {
        self.lock().failing_queries = failing;
    }

    /// Reject submissions for this remote name.
    pub fn reject(&self, remote_name: &str) {
        self.lock().rejected.insert(remote_name.to_string());
    }

    /// Accept submissions for a previously rejected name again.
    pub fn allow(&self, remote_name: &str) {
        self.lock().rejected.remove(remote_name);
    }
}

#[async_trait]
impl RemoteStorage for MemoryStorage {
    async fn consensus(&self) -> Result<ConsensusState> {
        let inner = self.lock();
        if inner.unreachable {
            return Err(AgentError::PreconditionFailed("renter daemon is not reachable".into()));
        }
        Ok(ConsensusState {
            synced: !inner.unsynced,
        })
    }

    async fn list_files(&self) -> Result<Vec<RemoteFileState>> {
        let inner = self.lock();
        if inner.unreachable || inner.failing_queries {
            return Err(AgentError::QueryFailed("renter file listing unavailable".into()));
        }
        Ok(inner.files.values().cloned().collect())
    }

    async fn submit_upload(&self, remote_name: &str, source: &Path) -> Result<()> {
        let size = std::fs::metadata(source).map(|m| m.len()).unwrap_or(0);
        let mut inner = self.lock();
        if inner.rejected.contains(remote_name) {
            return Err(AgentError::SubmissionFailed {
                remote_name: remote_name.to_string(),
                message: "400 Bad Request: upload rejected".into(),
            });
        }
        inner
            .submissions
            .push((remote_name.to_string(), source.to_path_buf()));
        inner.files.insert(
            remote_name.to_string(),
            RemoteFileState {
                name: remote_name.to_string(),
                size,
                progress: 0.0,
                available: false,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submission_shows_up_in_listing() {
        let storage = MemoryStorage::new();
        storage
            .submit_upload("a.1.dat", Path::new("/nonexistent/a.dat"))
            .await
            .unwrap();

        let files = storage.list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].progress, 0.0);
        assert!(!files[0].available);

        assert!(storage.set_progress("a.1.dat", 100.0, true));
        assert!(storage.list_files().await.unwrap()[0].available);
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let storage = MemoryStorage::new();
        storage.reject("bad.1.dat");
        let err = storage
            .submit_upload("bad.1.dat", Path::new("/tmp/bad.dat"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SubmissionFailed { .. }));
        assert!(storage.submissions().is_empty());
    }
}
