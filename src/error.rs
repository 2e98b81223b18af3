//! Error types for notion2api
//!
//! Every failure the service can report is an [`AppError`]. Each variant knows
//! its HTTP status and the stable `type` string clients branch on, and renders
//! as `{"error": {"message", "type", "code"}}`.
//!
//! The upstream mapping rules live here too ([`AppError::from_upstream_status`],
//! [`AppError::from_transport`]) so the session, translator and parser all
//! classify failures the same way.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Upstream rejected the session credentials, or a client sent a bad bearer token
    #[error("{0}")]
    Authentication(String),

    /// Required configuration is missing or invalid
    #[error("{0}")]
    Configuration(String),

    /// Upstream refused to create a conversation thread
    #[error("{0}")]
    ThreadCreation(String),

    /// Upstream request failed (5xx, timeout, transport failure)
    #[error("{message}")]
    Request { message: String, status: StatusCode },

    /// Upstream body could not be parsed
    #[error("{0}")]
    ResponseParse(String),

    /// Upstream or local rate limit hit
    #[error("{message}")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    #[error("Model not supported: {0}")]
    ModelNotSupported(String),

    /// Client sent a request we cannot act on
    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ThreadCreation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Request { status, .. } => *status,
            AppError::ResponseParse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ModelNotSupported(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error type
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "authentication_error",
            AppError::Configuration(_) => "configuration_error",
            AppError::ThreadCreation(_) => "thread_creation_error",
            AppError::Request { .. } => "internal_server_error",
            AppError::ResponseParse(_) => "internal_server_error",
            AppError::RateLimit { .. } => "rate_limit_error",
            AppError::ModelNotSupported(_) => "invalid_model",
            AppError::BadRequest(_) => "invalid_request_error",
            AppError::Internal(_) => "internal_server_error",
        }
    }

    pub fn request(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Request {
            message: message.into(),
            status,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        AppError::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Classify a non-success upstream status.
    ///
    /// Precedence: 401, then 429, then 5xx. Returns `None` for statuses the
    /// caller must classify itself (success, and other 4xx, which mean
    /// different things for thread creation and inference).
    pub fn from_upstream_status(status: StatusCode) -> Option<Self> {
        if status == StatusCode::UNAUTHORIZED {
            return Some(AppError::Authentication(
                "Notion authentication failed, check that NOTION_COOKIE is valid".to_string(),
            ));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Some(AppError::rate_limited(
                "Notion rate limit reached, retry later",
                None,
            ));
        }
        if status.is_server_error() {
            return Some(AppError::request(
                status,
                format!("Notion server error (HTTP {})", status.as_u16()),
            ));
        }
        None
    }

    /// Classify a transport-level failure talking to the upstream
    pub fn from_transport(err: &reqwest::Error, action: &str) -> Self {
        if err.is_timeout() {
            AppError::request(
                StatusCode::GATEWAY_TIMEOUT,
                format!("Timed out while {action}"),
            )
        } else {
            AppError::request(
                StatusCode::BAD_GATEWAY,
                format!("Notion request failed while {action}: {}", without_url(err)),
            )
        }
    }

    /// Body shared by JSON error responses and SSE error events
    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                message: self.to_string(),
                error_type: self.error_type().to_string(),
                code: self.status_code().as_u16(),
            },
        }
    }
}

/// `reqwest` error text without the URL (which can carry query secrets)
fn without_url(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    if let Some(url) = err.url() {
        message = message.replace(url.as_str(), "<upstream>");
    }
    message
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::Internal(e) => tracing::error!(error = ?e, "Unhandled internal error"),
            _ => tracing::warn!(
                status = status.as_u16(),
                error_type = self.error_type(),
                message = %self,
                "Request failed"
            ),
        }

        let mut response = (status, Json(self.to_body())).into_response();

        if let AppError::RateLimit {
            retry_after: Some(seconds),
            ..
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
