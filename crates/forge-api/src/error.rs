//! API error types and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use forge_engine::EngineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Engine-layer refusal, carrying the taxonomy tag when present.
    #[error("{0}")]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(err) => match err {
                EngineError::JobNotFound(_) => StatusCode::NOT_FOUND,
                e if e.is_client_error() => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Taxonomy tag for the response body, when the failure carries one.
    fn code(&self) -> Option<String> {
        match self {
            ApiError::Engine(EngineError::Validation(v)) => Some(v.tag.as_str().to_string()),
            ApiError::Engine(EngineError::WorkerLimitExceeded { .. }) => {
                Some("license.worker_limit_exceeded".to_string())
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommended_action: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let recommended_action = match &self {
            ApiError::Engine(EngineError::Validation(v)) => v.recommended_action.clone(),
            _ => None,
        };
        let body = ErrorResponse {
            detail: self.to_string(),
            code,
            recommended_action,
        };
        (status, Json(body)).into_response()
    }
}
