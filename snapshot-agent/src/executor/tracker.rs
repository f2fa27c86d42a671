//! Tracks running backup runs, serializes them per run name and provides
//! cancellation. The last outcome of recently finished runs is kept so
//! callers can still see why a run stopped.

use crate::{AgentError, Result};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

/// Finished runs remembered after their lease is released
pub const FINISHED_RUNS_KEPT: usize = 32;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressState {
    pub message: String,
    /// Upload progress of the files this run submitted, once polling started
    pub upload_percent: Option<f64>,
    /// Set when the run stopped on an error
    pub error: Option<String>,
}

/// Shared, cheaply cloneable progress of one run.
#[derive(Debug, Clone, Default)]
pub struct RunProgress {
    state: Arc<RwLock<ProgressState>>,
}

impl RunProgress {
    pub fn message(&self) -> String {
        self.snapshot().message
    }

    pub fn set_message(&self, message: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            state.message = message.into();
        }
    }

    pub fn set_upload_percent(&self, percent: f64) {
        if let Ok(mut state) = self.state.write() {
            state.upload_percent = Some(percent);
        }
    }

    /// Record the error that stopped the run; it also becomes the message.
    pub fn fail(&self, error: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            let error = error.into();
            state.message = error.clone();
            state.error = Some(error);
        }
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunningRun {
    pub name: String,
    #[serde(flatten)]
    pub progress: ProgressState,
}

struct ActiveRun {
    cancel: CancellationToken,
    progress: RunProgress,
}

#[derive(Default)]
struct Runs {
    active: HashMap<String, ActiveRun>,
    /// Oldest first
    finished: VecDeque<RunningRun>,
}

impl Runs {
    fn release(&mut self, name: &str) {
        if let Some(run) = self.active.remove(name) {
            self.finished.retain(|r| r.name != name);
            if self.finished.len() == FINISHED_RUNS_KEPT {
                self.finished.pop_front();
            }
            self.finished.push_back(RunningRun {
                name: name.to_string(),
                progress: run.progress.snapshot(),
            });
        }
    }
}

type SharedRuns = Arc<Mutex<Runs>>;

fn lock_runs(runs: &SharedRuns) -> MutexGuard<'_, Runs> {
    runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of active runs. At most one lease per run name exists at a time.
#[derive(Clone, Default)]
pub struct RunTracker {
    runs: SharedRuns,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Runs> {
        lock_runs(&self.runs)
    }

    /// Take the lease for `name`; fails if another run holds it.
    pub fn acquire(&self, name: &str) -> Result<RunLease> {
        let mut runs = self.lock();
        if runs.active.contains_key(name) {
            return Err(AgentError::RunInProgress(name.to_string()));
        }
        let cancel = CancellationToken::new();
        let progress = RunProgress::default();
        runs.active.insert(
            name.to_string(),
            ActiveRun {
                cancel: cancel.clone(),
                progress: progress.clone(),
            },
        );
        Ok(RunLease {
            name: name.to_string(),
            cancel,
            progress,
            runs: Arc::clone(&self.runs),
        })
    }

    /// Cancel a running run by its name
    pub fn cancel(&self, name: &str) -> bool {
        match self.lock().active.get(name) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for run in self.lock().active.values() {
            run.cancel.cancel();
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock().active.contains_key(name)
    }

    pub fn running(&self) -> Vec<RunningRun> {
        let mut runs: Vec<RunningRun> = self
            .lock()
            .active
            .iter()
            .map(|(name, run)| RunningRun {
                name: name.clone(),
                progress: run.progress.snapshot(),
            })
            .collect();
        runs.sort_by(|a, b| b.name.cmp(&a.name));
        runs
    }

    pub fn running_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Recently finished runs, most recent first.
    pub fn finished(&self) -> Vec<RunningRun> {
        self.lock().finished.iter().rev().cloned().collect()
    }

    /// Current progress of an active run, else the final state of a
    /// recently finished one.
    pub fn last_state(&self, name: &str) -> Option<RunningRun> {
        let runs = self.lock();
        if let Some(run) = runs.active.get(name) {
            return Some(RunningRun {
                name: name.to_string(),
                progress: run.progress.snapshot(),
            });
        }
        runs.finished.iter().rev().find(|r| r.name == name).cloned()
    }
}

/// Exclusive right to run the pipeline for one run name. Released on drop.
pub struct RunLease {
    name: String,
    cancel: CancellationToken,
    progress: RunProgress,
    runs: SharedRuns,
}

impl RunLease {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn progress(&self) -> RunProgress {
        self.progress.clone()
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        lock_runs(&self.runs).release(&self.name);
    }
}
