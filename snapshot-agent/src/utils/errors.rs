//! Custom error types for the snapshot agent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// Renter daemon unreachable or its consensus is not synced.
    #[error("{0}")]
    PreconditionFailed(String),

    /// The renter refused an upload request.
    #[error("Upload submission failed for {remote_name}: {message}")]
    SubmissionFailed { remote_name: String, message: String },

    /// Listing the renter's files failed.
    #[error("Remote query failed: {0}")]
    QueryFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Manifest archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Backup run already finalized: {0}")]
    Finalized(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Backup run already in progress: {0}")]
    RunInProgress(String),

    /// A run with this name already exists but is not running.
    #[error("Backup run {0} already exists, resume it or retry later")]
    RunExists(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No backup found with name: {0}")]
    NotFound(String),

    #[error("Backup run cancelled: {0}")]
    Cancelled(String),
}

impl AgentError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            AgentError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_is_not_transient() {
        assert!(!AgentError::PreconditionFailed("not synced".into()).is_transient());
        assert!(!AgentError::QueryFailed("boom".into()).is_transient());
        assert!(!AgentError::SubmissionFailed {
            remote_name: "a.1.dat".into(),
            message: "rejected".into(),
        }
        .is_transient());
    }

    #[test]
    fn test_io_timeout_is_transient() {
        let err = AgentError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(err.is_transient());
        let err = AgentError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_precondition_message_is_verbatim() {
        let err = AgentError::PreconditionFailed("ERROR: renter not synced".into());
        assert_eq!(err.to_string(), "ERROR: renter not synced");
    }
}
