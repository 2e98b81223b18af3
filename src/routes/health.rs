//! Health and service info endpoints
//!
//! - `/health` - provider status, version and uptime
//! - `/` - welcome message with the endpoint map

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    /// Unix seconds
    pub timestamp: i64,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check endpoint
///
/// 503 when the provider could not be initialized.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status, status_code, error) = match state.provider() {
        Ok(_) => (HealthStatus::Healthy, StatusCode::OK, None),
        Err(e) => (
            HealthStatus::Unhealthy,
            StatusCode::SERVICE_UNAVAILABLE,
            Some(e.to_string()),
        ),
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        error,
    };

    (status_code, Json(response))
}

/// Service root
pub async fn index(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = if state.provider.is_some() {
        "running"
    } else {
        "degraded"
    };

    Json(json!({
        "message": "Welcome to notion2api, an OpenAI-compatible gateway for Notion AI",
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "chat": "/v1/chat/completions",
            "models": "/v1/models",
            "health": "/health",
            "metrics": "/metrics"
        }
    }))
}
