//! Error types for the control endpoint and callback delivery.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use dbgbridge_dap::DapError;

/// A failed control request. Every variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed query parameter.
    #[error("{0}")]
    Validation(String),

    /// The addressed breakpoint does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The debug session refused or failed the operation.
    #[error("debug session error: {0}")]
    Facade(#[from] DapError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Facade(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::debug!(status = status.as_u16(), "{self}");
        }
        (status, self.to_string()).into_response()
    }
}

/// A callback that could not be delivered.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The HTTP request failed (connection refused, bad URL, ...).
    #[error("callback request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The receiver did not answer in time.
    #[error("callback to {url} timed out")]
    Timeout {
        /// Substituted callback URL.
        url: String,
    },
}
