//! Configuration management for the snapshot agent.
//!
//! Loaded once from a TOML file at startup and shared by reference. A reload
//! produces a new value; nothing re-reads the file behind the caller's back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent identifier
    #[serde(default = "default_agent_id")]
    pub id: String,

    /// HTTP status API port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Resume interrupted runs when the daemon starts
    #[serde(default = "default_true")]
    pub resume_on_startup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the renter daemon API
    #[serde(default = "default_storage_url")]
    pub url: String,

    /// User agent the renter daemon insists on
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for list/consensus queries
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for upload submissions
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per request, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Data volumes; snapshots live in `<root>/snapshots/<name>`
    #[serde(default = "default_data_roots")]
    pub data_roots: Vec<PathBuf>,

    /// Extension of the data files that get uploaded and tracked
    #[serde(default = "default_data_file_extension")]
    pub data_file_extension: String,

    /// Directory holding the per-run manifests
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,

    /// Mount point trimmed before snapshots are taken
    #[serde(default = "default_storage_mount")]
    pub storage_mount: PathBuf,

    /// Box settings file (upload limit, currency, maintenance timestamp)
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Seconds between two upload progress polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Finished runs kept by the prune stage (0 = never prune)
    #[serde(default)]
    pub keep_finished_runs: usize,

    /// Run fstrim and sync before snapshotting
    #[serde(default = "default_true")]
    pub trim_before_snapshot: bool,

    /// Write the finalized manifest once uploads complete
    #[serde(default)]
    pub finalize_manifests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_agent_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "snapshot-agent-01".to_string())
}

fn default_port() -> u16 {
    5100
}

fn default_true() -> bool {
    true
}

fn default_storage_url() -> String {
    "http://localhost:9980".to_string()
}

fn default_user_agent() -> String {
    "Sia-Agent".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_upload_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_data_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/mnt/lower1/data")]
}

fn default_data_file_extension() -> String {
    ".dat".to_string()
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("/mnt/lower1/mineboxmeta")
}

fn default_storage_mount() -> PathBuf {
    PathBuf::from("/mnt/storage")
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("/etc/minebox/minebox_settings.json")
}

fn default_poll_interval_secs() -> u64 {
    5 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            port: default_port(),
            resume_on_startup: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: default_storage_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_roots: default_data_roots(),
            data_file_extension: default_data_file_extension(),
            metadata_dir: default_metadata_dir(),
            storage_mount: default_storage_mount(),
            settings_file: default_settings_file(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            keep_finished_runs: 0,
            trim_before_snapshot: true,
            finalize_manifests: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agent: AgentConfig::default(),
            storage: StorageConfig::default(),
            paths: PathsConfig::default(),
            pipeline: PipelineConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Re-read the file and return the new configuration for the caller to swap in.
    pub fn reload(&self, path: &Path) -> anyhow::Result<Self> {
        let fresh = Self::from_file(path)?;
        if fresh.paths.metadata_dir != self.paths.metadata_dir {
            tracing::warn!(
                old = %self.paths.metadata_dir.display(),
                new = %fresh.paths.metadata_dir.display(),
                "Metadata directory changed on reload; existing history will not be visible"
            );
        }
        Ok(fresh)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.paths.data_roots.is_empty() {
            anyhow::bail!("paths.data_roots must name at least one data volume");
        }
        if !self.paths.data_file_extension.starts_with('.') {
            anyhow::bail!(
                "paths.data_file_extension must start with a dot, got {:?}",
                self.paths.data_file_extension
            );
        }
        if self.storage.retry.max_attempts == 0 {
            anyhow::bail!("storage.retry.max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline.poll_interval_secs)
    }
}
