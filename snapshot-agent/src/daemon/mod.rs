//! Process lifecycle: startup recovery and graceful shutdown.

pub mod recovery;
pub mod shutdown;
