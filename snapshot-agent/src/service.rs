//! Backup service - the operations the HTTP layer and the daemon call.

use crate::config::Config;
use crate::executor::context::RunContext;
use crate::executor::poller::Clock;
use crate::executor::tracker::RunningRun;
use crate::executor::{PipelineController, PipelineSettings, RunLease, RunTracker, TokioClock};
use crate::fs::{ManifestStore, SnapshotProvider};
use crate::history::{RecoveryPlanner, StatusReport, StatusResolver};
use crate::remote::RemoteStorage;
use crate::{AgentError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct BackupService {
    pipeline: PipelineController,
    tracker: RunTracker,
    manifests: ManifestStore,
    remote: Arc<dyn RemoteStorage>,
    snapshots: Arc<dyn SnapshotProvider>,
    extension: String,
}

impl BackupService {
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        snapshots: Arc<dyn SnapshotProvider>,
        manifests: ManifestStore,
        clock: Arc<dyn Clock>,
        settings: PipelineSettings,
    ) -> Self {
        let extension = settings.extension.clone();
        let pipeline = PipelineController::new(
            Arc::clone(&remote),
            Arc::clone(&snapshots),
            manifests.clone(),
            clock,
            settings,
        );
        Self {
            pipeline,
            tracker: RunTracker::new(),
            manifests,
            remote,
            snapshots,
            extension,
        }
    }

    pub fn from_config(
        config: &Config,
        remote: Arc<dyn RemoteStorage>,
        snapshots: Arc<dyn SnapshotProvider>,
    ) -> Self {
        Self::new(
            remote,
            snapshots,
            ManifestStore::new(&config.paths.metadata_dir),
            Arc::new(TokioClock),
            PipelineSettings::from_config(config),
        )
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    /// Name for a run started now.
    pub fn new_run_name() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    /// Start a new run in the background and return its name.
    pub fn start(self: &Arc<Self>) -> Result<String> {
        self.start_run(Self::new_run_name())
    }

    fn start_run(self: &Arc<Self>, name: String) -> Result<String> {
        if self.tracker.is_running(&name) {
            return Err(AgentError::RunInProgress(name));
        }
        if self.manifests.load(&name)?.is_some() {
            return Err(AgentError::RunExists(name));
        }
        let lease = self.tracker.acquire(&name)?;

        let service = Arc::clone(self);
        let run = name.clone();
        tokio::spawn(async move {
            match service.execute(lease).await {
                Ok(()) => info!(run = %run, "Backup run completed"),
                Err(e) => warn!(run = %run, "Backup run stopped: {}", e),
            }
        });
        Ok(name)
    }

    /// Run the pipeline for an existing run to completion.
    pub async fn resume(&self, name: &str) -> Result<()> {
        if self.manifests.load(name)?.is_none() {
            return Err(AgentError::NotFound(name.to_string()));
        }
        let lease = self.tracker.acquire(name)?;
        info!(run = %name, "Resuming backup");
        self.execute(lease).await
    }

    async fn execute(&self, lease: RunLease) -> Result<()> {
        let mut ctx = RunContext::new(lease.name(), lease.progress());
        self.pipeline.run(&mut ctx, lease.cancel_token()).await
    }

    pub fn cancel(&self, name: &str) -> bool {
        self.tracker.cancel(name)
    }

    /// Progress of a running run, or how a recently finished one ended.
    pub fn outcome(&self, name: &str) -> Option<RunningRun> {
        self.tracker.last_state(name)
    }

    pub async fn status(&self, name: &str) -> Result<Option<StatusReport>> {
        StatusResolver::new(&self.manifests, self.remote.as_ref(), &self.extension)
            .resolve(name)
            .await
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.manifests.list()
    }

    pub fn latest(&self) -> Result<Option<String>> {
        self.manifests.latest()
    }

    /// Runs to resume, most recent first.
    pub fn recovery_plan(&self) -> Result<Vec<String>> {
        RecoveryPlanner::new(&self.manifests, self.snapshots.as_ref()).plan()
    }

    /// Resume every planned run, oldest first, one after another. Returns
    /// the runs that completed.
    pub async fn recover(&self, shutdown: &CancellationToken) -> Result<Vec<String>> {
        let mut plan = self.recovery_plan()?;
        plan.reverse();

        let mut completed = Vec::new();
        for name in plan {
            if shutdown.is_cancelled() {
                warn!("Shutdown requested, stopping recovery");
                break;
            }
            match self.resume(&name).await {
                Ok(()) => completed.push(name),
                Err(e) => error!(run = %name, "Resuming backup failed: {}", e),
            }
        }
        Ok(completed)
    }
}
