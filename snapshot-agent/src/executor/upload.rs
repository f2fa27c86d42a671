//! Decides which snapshot files need uploading and submits them.
//!
//! Remote names are derived from file name and mtime, so a retried run finds
//! its earlier submissions in the renter listing and does not submit them
//! again.

use super::context::{FileEntry, UploadPlan};
use crate::fs::{FileInfo, ManifestStore};
use crate::naming::RemoteName;
use crate::remote::{RemoteIndex, RemoteStorage};
use crate::transfer::progress::format_bytes;
use crate::Result;
use std::collections::HashSet;
use tracing::{info, warn};

pub struct UploadCoordinator<'a> {
    remote: &'a dyn RemoteStorage,
    manifests: &'a ManifestStore,
}

impl<'a> UploadCoordinator<'a> {
    pub fn new(remote: &'a dyn RemoteStorage, manifests: &'a ManifestStore) -> Self {
        Self { remote, manifests }
    }

    /// Submit every file the renter does not know yet and record the full
    /// file set as the run's in-progress manifest.
    ///
    /// A rejected submission aborts the stage; submissions already issued
    /// stay in flight and are picked up by the next attempt.
    pub async fn initiate(&self, run_name: &str, files: &[FileInfo]) -> Result<UploadPlan> {
        let index = RemoteIndex::new(self.remote.list_files().await?);
        let mut plan = UploadPlan::default();
        let mut seen = HashSet::new();

        for file in files {
            if file.size == 0 {
                continue;
            }

            let remote_name = RemoteName::from_file_name(&file.file_name(), file.modified).encode();
            if !seen.insert(remote_name.clone()) {
                warn!(
                    run = %run_name,
                    "{} maps to remote name {} already used in this run, skipping",
                    file.path.display(),
                    remote_name
                );
                continue;
            }
            plan.backup_size += file.size;

            match index.get(&remote_name) {
                Some(state) if state.available => {
                    info!(run = %run_name, "{} is part of the set but already uploaded", remote_name);
                }
                Some(_) => {
                    info!(
                        run = %run_name,
                        "{} is part of the set but the upload is already in progress",
                        remote_name
                    );
                }
                None => {
                    info!(run = %run_name, "{} has to be uploaded, starting that", remote_name);
                    self.remote.submit_upload(&remote_name, &file.path).await?;
                    plan.upload_size += file.size;
                    plan.submitted.insert(remote_name.clone());
                }
            }

            plan.files.push(FileEntry {
                remote_name,
                size: file.size,
            });
        }

        self.manifests.write_in_progress(run_name, &plan.remote_names())?;

        info!(
            run = %run_name,
            "Tracking {} files ({}), {} submitted ({})",
            plan.files.len(),
            format_bytes(plan.backup_size),
            plan.submitted.len(),
            format_bytes(plan.upload_size)
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryStorage, RemoteFileState};
    use crate::AgentError;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn info(name: &str, size: u64, modified: i64) -> FileInfo {
        FileInfo {
            path: PathBuf::from(format!("/mnt/lower1/data/snapshots/1500000000/seed/{}", name)),
            relative_path: PathBuf::from(format!("seed/{}", name)),
            size,
            modified,
        }
    }

    #[tokio::test]
    async fn test_zero_size_files_are_ignored() -> Result<()> {
        let dir = TempDir::new()?;
        let manifests = ManifestStore::new(dir.path());
        let remote = MemoryStorage::new();

        let plan = UploadCoordinator::new(&remote, &manifests)
            .initiate("1500000000", &[info("empty.dat", 0, 1), info("full.dat", 10, 2)])
            .await?;

        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.backup_size, 10);
        assert_eq!(plan.upload_size, 10);
        let submitted: Vec<String> = remote.submissions().into_iter().map(|(n, _)| n).collect();
        assert_eq!(submitted, vec!["full.2.dat".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_known_files_are_recorded_but_not_submitted() -> Result<()> {
        let dir = TempDir::new()?;
        let manifests = ManifestStore::new(dir.path());
        let remote = MemoryStorage::new();
        remote.insert(RemoteFileState {
            name: "done.1.dat".into(),
            size: 100,
            progress: 100.0,
            available: true,
        });
        remote.insert(RemoteFileState {
            name: "busy.2.dat".into(),
            size: 50,
            progress: 30.0,
            available: false,
        });

        let files = [info("done.dat", 100, 1), info("busy.dat", 50, 2), info("new.dat", 25, 3)];
        let plan = UploadCoordinator::new(&remote, &manifests)
            .initiate("1500000000", &files)
            .await?;

        assert_eq!(plan.backup_size, 175);
        assert_eq!(plan.upload_size, 25);
        assert_eq!(plan.submitted.len(), 1);
        assert!(plan.submitted.contains("new.3.dat"));
        assert_eq!(remote.submissions().len(), 1);

        let manifest = manifests.load("1500000000")?.unwrap();
        assert_eq!(manifest.files, vec!["done.1.dat", "busy.2.dat", "new.3.dat"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_initiation_submits_nothing() -> Result<()> {
        let dir = TempDir::new()?;
        let manifests = ManifestStore::new(dir.path());
        let remote = MemoryStorage::new();
        let files = [info("a.dat", 10, 1), info("b.dat", 20, 2)];
        let coordinator = UploadCoordinator::new(&remote, &manifests);

        coordinator.initiate("1500000000", &files).await?;
        assert_eq!(remote.submissions().len(), 2);

        let again = coordinator.initiate("1500000000", &files).await?;
        assert_eq!(remote.submissions().len(), 2);
        assert_eq!(again.upload_size, 0);
        assert_eq!(again.backup_size, 30);
        assert_eq!(again.files.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_submission_aborts_without_manifest() -> Result<()> {
        let dir = TempDir::new()?;
        let manifests = ManifestStore::new(dir.path());
        let remote = MemoryStorage::new();
        remote.reject("b.2.dat");

        let files = [info("a.dat", 10, 1), info("b.dat", 20, 2), info("c.dat", 30, 3)];
        let err = UploadCoordinator::new(&remote, &manifests)
            .initiate("1500000000", &files)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::SubmissionFailed { .. }));
        // a.dat stays in flight, c.dat was never attempted
        assert_eq!(remote.submissions().len(), 1);
        assert!(manifests.load("1500000000")?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_changed_mtime_gets_new_remote_name() -> Result<()> {
        let dir = TempDir::new()?;
        let manifests = ManifestStore::new(dir.path());
        let remote = MemoryStorage::new();
        let coordinator = UploadCoordinator::new(&remote, &manifests);

        coordinator.initiate("1500000000", &[info("a.dat", 10, 1)]).await?;
        let plan = coordinator.initiate("1500000100", &[info("a.dat", 10, 5)]).await?;

        assert!(plan.submitted.contains("a.5.dat"));
        assert_eq!(remote.submissions().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let manifests = ManifestStore::new(dir.path());
        let remote = MemoryStorage::new();
        remote.set_failing_queries(true);

        let err = UploadCoordinator::new(&remote, &manifests)
            .initiate("1500000000", &[info("a.dat", 10, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::QueryFailed(_)));
    }
}
