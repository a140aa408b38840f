//! Error types for the tweetgate service.
//!
//! Every fallible operation in the crate returns [`AppError`]. HTTP handlers
//! hand it straight back to axum, which renders it through [`IntoResponse`].

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// The Twitter API answered with a non-success status.
    #[error("Twitter API error for operation '{operation}' ({status}): {message}")]
    RemoteApi {
        operation: String,
        status: u16,
        message: String,
    },

    /// The LLM provider failed or returned something unusable.
    #[error("LLM error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Llm { status: Option<u16>, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Status code returned to our own HTTP callers.
    ///
    /// Upstream 4xx/5xx codes are reflected as-is; failures without an
    /// upstream status map to 502.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::RemoteApi { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Llm { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Http(_) | AppError::Json(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short, caller-facing summary of the failure class.
    fn summary(&self) -> &'static str {
        match self {
            AppError::RemoteApi { .. } => "Twitter API request failed",
            AppError::Llm { .. } => "LLM request failed",
            AppError::Config(_) => "Service is misconfigured",
            AppError::InvalidRequest(_) => "Invalid request",
            AppError::Http(_) => "Upstream request failed",
            AppError::Json(_) => "Unexpected upstream response",
        }
    }
}

/// Malformed or missing JSON bodies are the caller's fault.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "status": "error",
            "message": self.summary(),
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_api_error_reflects_upstream_status() {
        let err = AppError::RemoteApi {
            operation: "post_tweet".to_string(),
            status: 403,
            message: "forbidden".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(err.to_string().contains("post_tweet"));
    }

    #[test]
    fn llm_error_without_status_is_bad_gateway() {
        let err = AppError::Llm {
            status: None,
            message: "empty completion".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "LLM error: empty completion");

        let err = AppError::Llm {
            status: Some(429),
            message: "rate limited".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.to_string(), "LLM error (429): rate limited");
    }

    #[test]
    fn invalid_request_is_bad_request() {
        let err = AppError::InvalidRequest("text is empty".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
