//! Authentication middleware
//!
//! Checks the client's bearer token against `API_MASTER_KEY`. When no master
//! key is configured (or it is the literal `1`) every request is let through.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use crate::{error::AppError, AppState};

/// Extract the token from an Authorization header value.
///
/// The scheme must mention `bearer` (any case); the token is the last
/// space-separated word.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    if !auth_header.to_ascii_lowercase().contains("bearer") {
        return None;
    }
    auth_header
        .split_whitespace()
        .last()
        .filter(|token| !token.eq_ignore_ascii_case("bearer"))
}

/// Authentication middleware
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state
        .config
        .api_master_key
        .as_deref()
        .filter(|_| state.config.auth_enabled())
    else {
        return Ok(next.run(request).await);
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            AppError::Authentication("Missing Authorization header".to_string())
        })?;

    let token = extract_bearer_token(auth_header).ok_or_else(|| {
        AppError::Authentication("Authorization header must use the Bearer scheme".to_string())
    })?;

    if token != expected {
        warn!("Rejected request with invalid API key");
        return Err(AppError::Authentication("Invalid API key".to_string()));
    }

    debug!("Client authenticated");
    Ok(next.run(request).await)
}
