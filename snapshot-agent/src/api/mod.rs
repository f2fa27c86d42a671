//! HTTP API module for the snapshot agent.

pub mod backup;
pub mod error;
pub mod health;

use crate::service::BackupService;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BackupService>,
    pub agent_id: Arc<str>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<BackupService>, agent_id: impl Into<Arc<str>>) -> Self {
        Self {
            service,
            agent_id: agent_id.into(),
            started_at: Instant::now(),
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        // Backup endpoints
        .route("/backup/list", get(backup::list))
        .route("/backup/latest", get(backup::latest))
        .route("/backup/running", get(backup::running))
        .route("/backup/start", post(backup::start))
        .route("/backup/{name}/status", get(backup::status))
        .route("/backup/{name}/cancel", post(backup::cancel))
        .route("/backup/{name}/result", get(backup::result))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
