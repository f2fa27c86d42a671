//! Read-only views over the backup history: per-run status and the set of
//! runs to resume after an interruption.

pub mod recovery;
pub mod status;

pub use recovery::{plan_recovery, RecoveryPlanner, RunInfo};
pub use status::{BackupStatus, StatusReport, StatusResolver};
