//! Status of a single backup run, merged from its manifest and a fresh
//! remote listing.

use crate::fs::{Manifest, ManifestStore};
use crate::naming::is_tracked;
use crate::remote::{RemoteIndex, RemoteStorage};
use crate::transfer::ProgressTally;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, warn};

/// Size reported before uploads are scheduled or when the remote is unusable.
pub const UNKNOWN_SIZE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatus {
    Pending,
    Uploading,
    Finished,
    Damaged,
    Error,
}

impl BackupStatus {
    /// Decision table over the manifest form and the merged remote view.
    pub fn decide(finished: bool, fully_available: bool, any_progress: bool) -> Self {
        match (finished, fully_available, any_progress) {
            (true, true, _) => BackupStatus::Finished,
            (true, false, _) => BackupStatus::Damaged,
            (false, _, true) => BackupStatus::Uploading,
            (false, _, false) => BackupStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub name: String,
    pub time_snapshot: String,
    pub status: BackupStatus,
    /// PENDING for every report built from sentinels, ERROR included
    pub metadata: BackupStatus,
    #[serde(rename = "numFiles")]
    pub num_files: i64,
    pub size: i64,
    pub progress: f64,
    pub relative_size: i64,
    pub relative_progress: f64,
}

impl StatusReport {
    fn unknown(name: &str, status: BackupStatus) -> Self {
        Self {
            name: name.to_string(),
            time_snapshot: name.to_string(),
            status,
            metadata: BackupStatus::Pending,
            num_files: UNKNOWN_SIZE,
            size: UNKNOWN_SIZE,
            progress: 0.0,
            relative_size: UNKNOWN_SIZE,
            relative_progress: 0.0,
        }
    }

    /// Run exists but has not scheduled any uploads yet.
    pub fn pending(name: &str) -> Self {
        Self::unknown(name, BackupStatus::Pending)
    }

    /// The remote listing could not be obtained.
    pub fn error(name: &str) -> Self {
        Self::unknown(name, BackupStatus::Error)
    }
}

/// Manifest entries merged with the remote listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub files: u64,
    pub absolute: ProgressTally,
    /// Files not present in the previous run
    pub relative: ProgressTally,
    pub fully_available: bool,
}

impl Summary {
    pub fn any_progress(&self) -> bool {
        self.absolute.uploaded_bytes > 0.0
    }
}

/// Merge `files` with `index`. `previous` is the file set of the run before,
/// `None` when there is none.
pub fn summarize(
    files: &[String],
    previous: Option<&HashSet<&str>>,
    index: &RemoteIndex,
    extension: &str,
) -> Summary {
    let mut summary = Summary {
        files: 0,
        absolute: ProgressTally::new(),
        relative: ProgressTally::new(),
        fully_available: true,
    };

    for remote_name in files {
        match index.get(remote_name) {
            Some(state) => {
                summary.files += 1;
                summary.absolute.add(state);
                if previous.map_or(true, |prev| !prev.contains(remote_name.as_str())) {
                    summary.relative.add(state);
                }
                if !state.available {
                    summary.fully_available = false;
                }
            }
            None if is_tracked(remote_name, extension) => {
                summary.files += 1;
                summary.fully_available = false;
                warn!(file = %remote_name, "File not found on the renter");
            }
            None => {
                debug!(file = %remote_name, "File not on the renter and not tracked");
            }
        }
    }

    summary
}

pub struct StatusResolver<'a> {
    manifests: &'a ManifestStore,
    remote: &'a dyn RemoteStorage,
    extension: &'a str,
}

impl<'a> StatusResolver<'a> {
    pub fn new(manifests: &'a ManifestStore, remote: &'a dyn RemoteStorage, extension: &'a str) -> Self {
        Self {
            manifests,
            remote,
            extension,
        }
    }

    /// Status of run `name`, `None` when no such run exists.
    pub async fn resolve(&self, name: &str) -> Result<Option<StatusReport>> {
        let Some(manifest) = self.manifests.load(name)? else {
            return Ok(None);
        };
        if manifest.is_empty() && !manifest.finished {
            return Ok(Some(StatusReport::pending(name)));
        }

        let previous = self.previous_manifest(name)?;
        let index = match self.remote.list_files().await {
            Ok(files) => RemoteIndex::new(files),
            Err(e) => {
                error!(run = %name, "Error getting renter files: {}", e);
                return Ok(Some(StatusReport::error(name)));
            }
        };

        let previous_names = previous.as_ref().map(Manifest::name_set);
        let summary = summarize(&manifest.files, previous_names.as_ref(), &index, self.extension);

        Ok(Some(StatusReport {
            name: name.to_string(),
            time_snapshot: name.to_string(),
            status: BackupStatus::decide(manifest.finished, summary.fully_available, summary.any_progress()),
            // Metadata is not uploaded yet
            metadata: BackupStatus::Pending,
            num_files: summary.files as i64,
            size: summary.absolute.total_bytes as i64,
            progress: summary.absolute.percent(),
            relative_size: summary.relative.total_bytes as i64,
            relative_progress: summary.relative.percent(),
        }))
    }

    fn previous_manifest(&self, name: &str) -> Result<Option<Manifest>> {
        match self.manifests.previous(name)? {
            Some(prev) => self.manifests.load(&prev),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryStorage, RemoteFileState};
    use tempfile::TempDir;

    fn state(name: &str, size: u64, progress: f64, available: bool) -> RemoteFileState {
        RemoteFileState {
            name: name.to_string(),
            size,
            progress,
            available,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(BackupStatus::decide(true, true, true), BackupStatus::Finished);
        assert_eq!(BackupStatus::decide(true, true, false), BackupStatus::Finished);
        assert_eq!(BackupStatus::decide(true, false, true), BackupStatus::Damaged);
        assert_eq!(BackupStatus::decide(false, true, true), BackupStatus::Uploading);
        assert_eq!(BackupStatus::decide(false, false, false), BackupStatus::Pending);
    }

    #[test]
    fn test_summarize_partial_availability() {
        let index = RemoteIndex::new(vec![
            state("a.1.dat", 100, 100.0, true),
            state("b.2.dat", 50, 40.0, false),
        ]);
        let summary = summarize(&names(&["a.1.dat", "b.2.dat"]), None, &index, ".dat");

        assert_eq!(summary.files, 2);
        assert_eq!(summary.absolute.total_bytes, 150);
        assert!((summary.absolute.percent() - 80.0).abs() < 1e-9);
        assert!(!summary.fully_available);
        assert_eq!(summary.relative, summary.absolute);
    }

    #[test]
    fn test_summarize_missing_files() {
        let index = RemoteIndex::new(vec![state("a.1.dat", 10, 100.0, true)]);
        let summary = summarize(&names(&["a.1.dat", "gone.2.dat", "notes.txt"]), None, &index, ".dat");

        assert_eq!(summary.files, 2);
        assert_eq!(summary.absolute.total_bytes, 10);
        assert!(!summary.fully_available);
    }

    #[test]
    fn test_summarize_relative_excludes_previous_files() {
        let index = RemoteIndex::new(vec![
            state("old.1.dat", 100, 100.0, true),
            state("new.2.dat", 40, 50.0, false),
        ]);
        let previous: HashSet<&str> = ["old.1.dat"].into_iter().collect();
        let summary = summarize(&names(&["old.1.dat", "new.2.dat"]), Some(&previous), &index, ".dat");

        assert_eq!(summary.absolute.total_bytes, 140);
        assert_eq!(summary.relative.total_bytes, 40);
        assert!((summary.relative.percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_zero_size_is_complete() {
        let index = RemoteIndex::new(vec![state("old.1.dat", 0, 0.0, true)]);
        let previous: HashSet<&str> = ["old.1.dat"].into_iter().collect();
        let summary = summarize(&names(&["old.1.dat"]), Some(&previous), &index, ".dat");

        assert_eq!(summary.absolute.percent(), 100.0);
        assert_eq!(summary.relative.total_bytes, 0);
        assert_eq!(summary.relative.percent(), 100.0);
        assert!(!summary.any_progress());
    }

    async fn resolve(
        store: &ManifestStore,
        remote: &MemoryStorage,
        name: &str,
    ) -> Option<StatusReport> {
        StatusResolver::new(store, remote, ".dat").resolve(name).await.unwrap()
    }

    fn two_files() -> MemoryStorage {
        let remote = MemoryStorage::new();
        remote.insert(state("a.1.dat", 100, 100.0, true));
        remote.insert(state("b.2.dat", 50, 40.0, false));
        remote
    }

    #[tokio::test]
    async fn test_resolve_uploading_and_damaged() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path());
        let remote = two_files();
        let files = names(&["a.1.dat", "b.2.dat"]);

        store.write_in_progress("1000", &files).unwrap();
        let report = resolve(&store, &remote, "1000").await.unwrap();
        assert_eq!(report.status, BackupStatus::Uploading);
        assert_eq!(report.metadata, BackupStatus::Pending);
        assert_eq!(report.num_files, 2);
        assert_eq!(report.size, 150);
        assert!((report.progress - 80.0).abs() < 1e-9);

        store.finalize("1000", &files).unwrap();
        let report = resolve(&store, &remote, "1000").await.unwrap();
        assert_eq!(report.status, BackupStatus::Damaged);
        assert!((report.progress - 80.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_resolve_finished() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path());
        let remote = two_files();
        remote.complete_all();

        store.finalize("1000", &names(&["a.1.dat", "b.2.dat"])).unwrap();
        let report = resolve(&store, &remote, "1000").await.unwrap();
        assert_eq!(report.status, BackupStatus::Finished);
        assert_eq!(report.progress, 100.0);
    }

    #[tokio::test]
    async fn test_resolve_pending_without_files() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path());
        let remote = MemoryStorage::new();
        remote.set_reachable(false);

        store.begin("1000").unwrap();
        let report = resolve(&store, &remote, "1000").await.unwrap();
        assert_eq!(report.status, BackupStatus::Pending);
        assert_eq!(report.size, UNKNOWN_SIZE);
        assert_eq!(report.num_files, UNKNOWN_SIZE);
        assert_eq!(report.relative_size, UNKNOWN_SIZE);
    }

    #[tokio::test]
    async fn test_resolve_pending_without_progress() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path());
        let remote = MemoryStorage::new();
        remote.insert(state("a.1.dat", 100, 0.0, false));

        store.write_in_progress("1000", &names(&["a.1.dat"])).unwrap();
        let report = resolve(&store, &remote, "1000").await.unwrap();
        assert_eq!(report.status, BackupStatus::Pending);
        assert_eq!(report.size, 100);
        assert_eq!(report.progress, 0.0);
    }

    #[tokio::test]
    async fn test_resolve_error_on_query_failure() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path());
        let remote = two_files();
        remote.set_failing_queries(true);

        store.finalize("1000", &names(&["a.1.dat"])).unwrap();
        let report = resolve(&store, &remote, "1000").await.unwrap();
        assert_eq!(report.status, BackupStatus::Error);
        assert_eq!(report.metadata, BackupStatus::Pending);
        assert_eq!(report.size, UNKNOWN_SIZE);
        assert_eq!(report.progress, 0.0);
    }

    #[tokio::test]
    async fn test_resolve_relative_to_previous_run() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path());
        let remote = two_files();

        store.finalize("1000", &names(&["a.1.dat"])).unwrap();
        store.write_in_progress("2000", &names(&["a.1.dat", "b.2.dat"])).unwrap();

        let report = resolve(&store, &remote, "2000").await.unwrap();
        assert_eq!(report.size, 150);
        assert_eq!(report.relative_size, 50);
        assert!((report.relative_progress - 40.0).abs() < 1e-9);

        let oldest = resolve(&store, &remote, "1000").await.unwrap();
        assert_eq!(oldest.relative_size, 100);
    }

    #[tokio::test]
    async fn test_resolve_unknown_run() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path());
        let remote = MemoryStorage::new();

        assert!(resolve(&store, &remote, "1000").await.is_none());
    }

    #[test]
    fn test_report_serializes_wire_names() {
        let json = serde_json::to_value(StatusReport::pending("1000")).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["numFiles"], -1);
        assert_eq!(json["relative_size"], -1);
        assert_eq!(json["time_snapshot"], "1000");
    }
}
