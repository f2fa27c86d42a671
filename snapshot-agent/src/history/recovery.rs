//! Which interrupted runs to resume.
//!
//! Scanning from the newest run: the newest run is resumed if it is
//! unfinished and its snapshot still exists. The scan stops at the first
//! finished run; the run right before that stop point (the oldest unfinished
//! one) is resumed as well. If no run is finished, the oldest run is that
//! candidate. Runs in between are not resumed. A run without a snapshot
//! cannot be resumed and is left for abandonment.

use crate::fs::{ManifestStore, SnapshotProvider};
use crate::Result;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub name: String,
    pub finished: bool,
    pub snapshot_exists: bool,
}

impl RunInfo {
    fn resumable(&self) -> bool {
        !self.finished && self.snapshot_exists
    }
}

/// Runs to resume, most recent first. `history` must be most recent first.
pub fn plan_recovery(history: &[RunInfo]) -> Vec<String> {
    let mut plan: Vec<String> = Vec::new();
    let Some(newest) = history.first() else {
        return plan;
    };
    if newest.resumable() {
        plan.push(newest.name.clone());
    }

    let candidate = match history.iter().position(|run| run.finished) {
        Some(0) => None,
        Some(stop) => history.get(stop - 1),
        None => history.last(),
    };
    if let Some(run) = candidate {
        if run.resumable() && !plan.contains(&run.name) {
            plan.push(run.name.clone());
        }
    }

    plan
}

pub struct RecoveryPlanner<'a> {
    manifests: &'a ManifestStore,
    snapshots: &'a dyn SnapshotProvider,
}

impl<'a> RecoveryPlanner<'a> {
    pub fn new(manifests: &'a ManifestStore, snapshots: &'a dyn SnapshotProvider) -> Self {
        Self {
            manifests,
            snapshots,
        }
    }

    pub fn history(&self) -> Result<Vec<RunInfo>> {
        Ok(self
            .manifests
            .list()?
            .into_iter()
            .map(|name| RunInfo {
                finished: self.manifests.is_finished(&name),
                snapshot_exists: self.snapshots.exists(&name),
                name,
            })
            .collect())
    }

    pub fn plan(&self) -> Result<Vec<String>> {
        let plan = plan_recovery(&self.history()?);
        if !plan.is_empty() {
            info!("Backups to resume: {:?}", plan);
        }
        Ok(plan)
    }
}
