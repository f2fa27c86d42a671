//! Backup pipeline - drives a run from snapshot to completed upload.
//!
//! Stages run in a fixed order against one [`RunContext`]. The first failing
//! stage stops the run; nothing already done is rolled back; a later resume
//! of the same run name picks up from what the renter and the manifest
//! already hold.

pub mod context;
pub mod poller;
pub mod tracker;
pub mod upload;

use crate::config::Config;
use crate::fs::{ManifestStore, SnapshotProvider};
use crate::remote::RemoteStorage;
use crate::{AgentError, Result};
use context::RunContext;
use poller::{Clock, UploadPoller};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use upload::UploadCoordinator;

pub use context::{FileEntry, UploadPlan};
pub use poller::TokioClock;
pub use tracker::{RunLease, RunProgress, RunTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    VerifyPrerequisites,
    CreateSnapshot,
    InitiateUploads,
    WaitForUploads,
    SaveMetadata,
    RemoveSnapshot,
    PruneRuns,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::VerifyPrerequisites,
        Stage::CreateSnapshot,
        Stage::InitiateUploads,
        Stage::WaitForUploads,
        Stage::SaveMetadata,
        Stage::RemoveSnapshot,
        Stage::PruneRuns,
    ];

    /// Progress message shown while the stage runs.
    pub fn message(self) -> &'static str {
        match self {
            Stage::VerifyPrerequisites => "Checking prerequisites",
            Stage::CreateSnapshot => "Creating backup files",
            Stage::InitiateUploads => "Starting uploads",
            Stage::WaitForUploads => "Waiting for uploads to complete",
            Stage::SaveMetadata => "Saving metadata",
            Stage::RemoveSnapshot => "Cleaning up backup data",
            Stage::PruneRuns => "Cleaning up old backups",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::VerifyPrerequisites => "verify-prerequisites",
            Stage::CreateSnapshot => "create-snapshot",
            Stage::InitiateUploads => "initiate-uploads",
            Stage::WaitForUploads => "wait-for-uploads",
            Stage::SaveMetadata => "save-metadata",
            Stage::RemoveSnapshot => "remove-snapshot",
            Stage::PruneRuns => "prune-runs",
        };
        f.write_str(name)
    }
}

/// Pipeline knobs taken from the configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub poll_interval: Duration,
    pub extension: String,
    pub keep_finished_runs: usize,
    pub finalize_manifests: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            extension: config.paths.data_file_extension.clone(),
            keep_finished_runs: config.pipeline.keep_finished_runs,
            finalize_manifests: config.pipeline.finalize_manifests,
        }
    }
}

pub struct PipelineController {
    remote: Arc<dyn RemoteStorage>,
    snapshots: Arc<dyn SnapshotProvider>,
    manifests: ManifestStore,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

impl PipelineController {
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        snapshots: Arc<dyn SnapshotProvider>,
        manifests: ManifestStore,
        clock: Arc<dyn Clock>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            remote,
            snapshots,
            manifests,
            clock,
            settings,
        }
    }

    /// Run every stage in order, stopping at the first failure.
    pub async fn run(&self, ctx: &mut RunContext, cancel: &CancellationToken) -> Result<()> {
        info!(run = %ctx.run_name, "Starting backup pipeline");

        for stage in Stage::ALL {
            if cancel.is_cancelled() {
                warn!(run = %ctx.run_name, "Cancelled before {}", stage);
                let e = AgentError::Cancelled(ctx.run_name.clone());
                ctx.progress().fail(e.to_string());
                return Err(e);
            }

            ctx.set_message(stage.message());
            if let Err(e) = self.run_stage(stage, ctx, cancel).await {
                error!(run = %ctx.run_name, stage = %stage, "Backup stage failed: {}", e);
                ctx.progress().fail(e.to_string());
                return Err(e);
            }
        }

        ctx.set_message("Finished");
        info!(run = %ctx.run_name, "Backup pipeline finished");
        Ok(())
    }

    async fn run_stage(&self, stage: Stage, ctx: &mut RunContext, cancel: &CancellationToken) -> Result<()> {
        match stage {
            Stage::VerifyPrerequisites => self.verify_prerequisites().await,
            Stage::CreateSnapshot => self.create_snapshot(ctx).await,
            Stage::InitiateUploads => self.initiate_uploads(ctx).await,
            Stage::WaitForUploads => self.wait_for_uploads(ctx, cancel).await,
            Stage::SaveMetadata => self.save_metadata(ctx),
            Stage::RemoveSnapshot => self.snapshots.delete(&ctx.snapshot_name).await,
            Stage::PruneRuns => self.prune_runs(&ctx.run_name),
        }
    }

    /// The renter must be up and synced before anything is touched.
    pub async fn verify_prerequisites(&self) -> Result<()> {
        match self.remote.consensus().await {
            Ok(consensus) if consensus.synced => Ok(()),
            Ok(_) => Err(AgentError::PreconditionFailed(
                "ERROR: the renter is not synced. Please try again when the consensus is synced.".into(),
            )),
            Err(e) => {
                warn!("Consensus query failed: {}", e);
                Err(AgentError::PreconditionFailed(
                    "ERROR: the renter daemon needs to be running for any uploads.".into(),
                ))
            }
        }
    }

    async fn create_snapshot(&self, ctx: &RunContext) -> Result<()> {
        self.manifests.begin(&ctx.run_name)?;

        if self.snapshots.exists(&ctx.snapshot_name) {
            info!(run = %ctx.run_name, "Snapshot {} already exists, reusing it", ctx.snapshot_name);
            return Ok(());
        }
        self.snapshots.prepare().await;
        self.snapshots.create(&ctx.snapshot_name).await
    }

    async fn initiate_uploads(&self, ctx: &mut RunContext) -> Result<()> {
        if !self.snapshots.exists(&ctx.snapshot_name) {
            return Err(AgentError::Snapshot(format!(
                "snapshot {} does not exist",
                ctx.snapshot_name
            )));
        }
        let files = self.snapshots.data_files(&ctx.snapshot_name).await?;
        let coordinator = UploadCoordinator::new(self.remote.as_ref(), &self.manifests);
        ctx.plan = coordinator.initiate(&ctx.run_name, &files).await?;
        Ok(())
    }

    async fn wait_for_uploads(&self, ctx: &RunContext, cancel: &CancellationToken) -> Result<()> {
        let poller = UploadPoller::new(
            self.remote.as_ref(),
            self.clock.as_ref(),
            self.settings.poll_interval,
            &self.settings.extension,
        );
        poller
            .wait(&ctx.run_name, &ctx.plan, ctx.progress(), cancel)
            .await?;
        Ok(())
    }

    fn save_metadata(&self, ctx: &RunContext) -> Result<()> {
        if self.settings.finalize_manifests {
            self.manifests.finalize(&ctx.run_name, &ctx.plan.remote_names())?;
        }
        Ok(())
    }

    /// Drop finalized manifests beyond the configured number of finished runs.
    fn prune_runs(&self, current: &str) -> Result<()> {
        let keep = self.settings.keep_finished_runs;
        if keep == 0 {
            debug!("Pruning disabled, keeping every backup");
            return Ok(());
        }

        let finished: Vec<String> = self
            .manifests
            .list()?
            .into_iter()
            .filter(|name| name != current && self.manifests.is_finished(name))
            .collect();

        for name in finished.iter().skip(keep) {
            info!(run = %name, "Pruning old backup manifest");
            self.manifests.remove(name)?;
        }
        Ok(())
    }
}
