//! HTTP client for the renter daemon API.
//!
//! Endpoints used:
//! - `GET /consensus` - `{"synced": bool}`
//! - `GET /renter/files` - `{"files": [{"siapath", "filesize", "uploadprogress", "available"}]}`
//! - `POST /renter/upload/<siapath>` with form field `source` - 204 on success
//!
//! Error responses carry `{"message": "..."}`.

use super::{ConsensusState, RemoteFileState, RemoteStorage, RetryPolicy};
use crate::config::StorageConfig;
use crate::{AgentError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ConsensusResponse {
    synced: bool,
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
    // The daemon sends `null` instead of an empty list.
    #[serde(default)]
    files: Option<Vec<RenterFile>>,
}

#[derive(Debug, Deserialize)]
struct RenterFile {
    siapath: String,
    filesize: u64,
    uploadprogress: f64,
    available: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl From<RenterFile> for RemoteFileState {
    fn from(f: RenterFile) -> Self {
        RemoteFileState {
            name: f.siapath,
            size: f.filesize,
            progress: f.uploadprogress.clamp(0.0, 100.0),
            available: f.available,
        }
    }
}

pub struct RenterClient {
    base_url: Url,
    client: Client,
    upload_timeout: Duration,
    retry: RetryPolicy,
}

impl RenterClient {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AgentError::Config(format!("invalid renter url {}: {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AgentError::Config(format!("renter url {} cannot take a path", config.url)));
        }

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            client,
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            retry: RetryPolicy::from_config(&config.retry),
        })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_consensus(&self) -> Result<ConsensusState> {
        let resp = self.client.get(self.endpoint(&["consensus"])).send().await?;
        let resp = check_status(resp, AgentError::PreconditionFailed).await?;
        let body: ConsensusResponse = resp.json().await?;
        Ok(ConsensusState { synced: body.synced })
    }

    async fn get_files(&self) -> Result<Vec<RemoteFileState>> {
        let resp = self.client.get(self.endpoint(&["renter", "files"])).send().await?;
        let resp = check_status(resp, AgentError::QueryFailed).await?;
        let body: FilesResponse = resp.json().await?;
        Ok(body
            .files
            .unwrap_or_default()
            .into_iter()
            .map(RemoteFileState::from)
            .collect())
    }

    async fn post_upload(&self, remote_name: &str, source: &Path) -> Result<()> {
        let source = source.to_string_lossy().to_string();
        let resp = self
            .client
            .post(self.endpoint(&["renter", "upload", remote_name]))
            .timeout(self.upload_timeout)
            .form(&[("source", source.as_str())])
            .send()
            .await?;

        if resp.status() == StatusCode::NO_CONTENT || resp.status().is_success() {
            return Ok(());
        }
        let message = error_message(resp).await;
        Err(AgentError::SubmissionFailed {
            remote_name: remote_name.to_string(),
            message,
        })
    }
}

#[async_trait]
impl RemoteStorage for RenterClient {
    async fn consensus(&self) -> Result<ConsensusState> {
        self.retry
            .run("consensus query", || self.get_consensus(), AgentError::is_transient)
            .await
    }

    async fn list_files(&self) -> Result<Vec<RemoteFileState>> {
        let files = self
            .retry
            .run("renter file listing", || self.get_files(), AgentError::is_transient)
            .await
            .map_err(|e| match e {
                AgentError::QueryFailed(_) => e,
                other => AgentError::QueryFailed(other.to_string()),
            })?;
        debug!("Renter reports {} files", files.len());
        Ok(files)
    }

    async fn submit_upload(&self, remote_name: &str, source: &Path) -> Result<()> {
        // Only retry when the request never reached the daemon; a timed out
        // upload may already be registered.
        self.retry
            .run(
                "upload submission",
                || self.post_upload(remote_name, source),
                |e| matches!(e, AgentError::Http(http) if http.is_connect()),
            )
            .await
            .map_err(|e| match e {
                AgentError::SubmissionFailed { .. } => e,
                other => AgentError::SubmissionFailed {
                    remote_name: remote_name.to_string(),
                    message: other.to_string(),
                },
            })
    }
}

/// Pass successful responses through. Server errors stay `Http` errors so
/// the retry policy treats them as transient; anything else is turned into
/// `fail` with the daemon's message.
async fn check_status(resp: Response, fail: fn(String) -> AgentError) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.is_server_error() {
        if let Err(e) = resp.error_for_status_ref() {
            return Err(AgentError::Http(e));
        }
    }
    Err(fail(error_message(resp).await))
}

async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) => format!("{}: {}", status, body.message),
        Err(_) => format!("{}", status),
    }
}
