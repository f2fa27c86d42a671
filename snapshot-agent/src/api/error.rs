use crate::executor::tracker::RunningRun;
use crate::AgentError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    /// Not found, but the tracker still knows how the run ended.
    #[error("{message}")]
    NotFoundWithRun { message: String, run: RunningRun },

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) | ApiError::NotFoundWithRun { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Agent(e) => match e {
                AgentError::NotFound(_) => StatusCode::NOT_FOUND,
                AgentError::RunInProgress(_) | AgentError::RunExists(_) => StatusCode::CONFLICT,
                AgentError::PreconditionFailed(_) | AgentError::QueryFailed(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::NotFoundWithRun { message, run } = self {
            return (status, Json(json!({ "error": message, "run": run }))).into_response();
        }
        let msg = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(AgentError::RunInProgress("1".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AgentError::RunExists("1".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AgentError::PreconditionFailed("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(AgentError::Snapshot("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
