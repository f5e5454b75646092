// Scout error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("A job is already running")]
    AlreadyRunning,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ScoutError {
    /// Bad time input surfaces as a parameter error once it reaches `start`.
    pub fn into_invalid_parameters(self) -> Self {
        match self {
            ScoutError::InvalidFormat(msg) | ScoutError::InvalidRange(msg) => {
                ScoutError::InvalidParameters(msg)
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;

impl IntoResponse for ScoutError {
    fn into_response(self) -> Response {
        let status = match &self {
            ScoutError::InvalidFormat(_)
            | ScoutError::InvalidRange(_)
            | ScoutError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            ScoutError::AlreadyRunning => StatusCode::CONFLICT,
            ScoutError::NotFound(_) => StatusCode::NOT_FOUND,
            ScoutError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("Request failed: {self:#}");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
