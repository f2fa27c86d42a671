//! Snapshot Agent Library
//!
//! Snapshots local data volumes, uploads their files to a renter daemon and
//! tracks each backup run until the network holds every file.

pub mod api;
pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod history;
pub mod naming;
pub mod remote;
pub mod service;
pub mod settings;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::AgentError;
pub type Result<T> = std::result::Result<T, AgentError>;
