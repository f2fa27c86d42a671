//! Backup run endpoints.

use super::error::ApiError;
use super::AppState;
use crate::executor::tracker::RunningRun;
use crate::fs::manifest::is_run_name;
use crate::history::{BackupStatus, StatusReport};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub name: String,
    pub status: String,
}

fn not_found(state: &AppState, name: &str) -> ApiError {
    let message = "No backup found with that name.".to_string();
    match state.service.outcome(name) {
        Some(run) => ApiError::NotFoundWithRun { message, run },
        None => ApiError::NotFound(message),
    }
}

fn checked_name(name: String) -> Result<String, ApiError> {
    if is_run_name(&name) {
        Ok(name)
    } else {
        Err(ApiError::BadRequest(format!("invalid backup name: {}", name)))
    }
}

/// GET /backup/list - All runs, most recent first
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.service.list()?))
}

/// GET /backup/latest - Most recent run
pub async fn latest(State(state): State<AppState>) -> Result<Json<RunResponse>, ApiError> {
    let name = state
        .service
        .latest()?
        .ok_or_else(|| ApiError::NotFound("No backup found.".into()))?;
    let status = if state.service.manifests().is_finished(&name) {
        "finished"
    } else {
        "unfinished"
    };
    Ok(Json(RunResponse {
        name,
        status: status.to_string(),
    }))
}

/// GET /backup/{name}/status - Merged manifest and renter status
pub async fn status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<StatusReport>), ApiError> {
    let name = checked_name(name)?;
    let report = match state.service.status(&name).await? {
        Some(report) => report,
        None => return Err(not_found(&state, &name)),
    };

    let code = if report.status == BackupStatus::Error {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    Ok((code, Json(report)))
}

/// POST /backup/start - Start a new run in the background
pub async fn start(State(state): State<AppState>) -> Result<(StatusCode, Json<RunResponse>), ApiError> {
    let name = state.service.start()?;
    tracing::info!(run = %name, "Backup started");
    Ok((
        StatusCode::ACCEPTED,
        Json(RunResponse {
            name,
            status: "started".to_string(),
        }),
    ))
}

/// POST /backup/{name}/cancel - Cancel an active run
pub async fn cancel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let name = checked_name(name)?;
    if !state.service.cancel(&name) {
        tracing::warn!(run = %name, "Run not active, nothing to cancel");
        return Err(ApiError::NotFound(format!("backup {} is not running", name)));
    }
    tracing::info!(run = %name, "Backup cancelled");
    Ok(Json(RunResponse {
        name,
        status: "cancelled".to_string(),
    }))
}

/// GET /backup/running - Active runs and their current stage
pub async fn running(State(state): State<AppState>) -> Json<Vec<RunningRun>> {
    Json(state.service.tracker().running())
}

/// GET /backup/{name}/result - Current or last known state of a run
pub async fn result(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RunningRun>, ApiError> {
    let name = checked_name(name)?;
    state
        .service
        .outcome(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("backup {} has not run since startup", name)))
}
