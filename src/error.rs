use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the monitoring core
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MonitorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::Conflict(_) => StatusCode::CONFLICT,
            MonitorError::Forbidden(_) => StatusCode::FORBIDDEN,
            MonitorError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            MonitorError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            MonitorError::Gone(_) => StatusCode::GONE,
            MonitorError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MonitorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Malformed or mistyped JSON bodies are client errors like any other bad argument
impl From<JsonRejection> for MonitorError {
    fn from(rejection: JsonRejection) -> Self {
        MonitorError::InvalidArgument(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {:#}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
