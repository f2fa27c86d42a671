//! Local filesystem: snapshot volumes and per-run manifests.

pub mod manifest;
pub mod snapshot;
pub mod walker;

pub use manifest::{Manifest, ManifestStore};
pub use snapshot::{BtrfsSnapshots, SnapshotLayout, SnapshotProvider};
pub use walker::FileInfo;
