//! Mutable state of one backup run, threaded through the pipeline stages.

use super::tracker::RunProgress;
use std::collections::HashSet;

/// One data file of the run's snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub remote_name: String,
    pub size: u64,
}

/// What the upload stage decided for the run's snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadPlan {
    /// Every non-empty data file, uploaded or not
    pub files: Vec<FileEntry>,

    /// Remote names this run submitted itself
    pub submitted: HashSet<String>,

    /// Sum of all tracked file sizes
    pub backup_size: u64,

    /// Sum of the sizes this run submitted
    pub upload_size: u64,
}

impl UploadPlan {
    pub fn remote_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.remote_name.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_name: String,
    pub snapshot_name: String,
    pub plan: UploadPlan,
    progress: RunProgress,
}

impl RunContext {
    pub fn new(run_name: impl Into<String>, progress: RunProgress) -> Self {
        let run_name = run_name.into();
        Self {
            snapshot_name: run_name.clone(),
            run_name,
            plan: UploadPlan::default(),
            progress,
        }
    }

    pub fn message(&self) -> String {
        self.progress.message()
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.progress.set_message(message);
    }

    pub fn progress(&self) -> &RunProgress {
        &self.progress
    }
}
