//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tracing::warn;

/// Global Prometheus handle; `None` if another recorder was installed first
static PROMETHEUS_HANDLE: Lazy<Option<PrometheusHandle>> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| warn!(error = %e, "Failed to install Prometheus recorder"))
        .ok()
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    Lazy::force(&PROMETHEUS_HANDLE);
    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "notion2api_requests_total",
        "Total number of chat completion requests by outcome"
    );
    metrics::describe_counter!(
        "notion2api_tokens_total",
        "Total tokens counted for prompts and completions"
    );
    metrics::describe_counter!(
        "notion2api_upstream_errors_total",
        "Failed Notion API calls by stage and error type"
    );
    metrics::describe_histogram!(
        "notion2api_request_duration_seconds",
        "Chat completion duration in seconds"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record a finished request; `status` is "success" or an error type
pub fn record_request(status: &str, model: &str, duration_secs: f64) {
    metrics::counter!(
        "notion2api_requests_total",
        "status" => status.to_string(),
        "model" => model.to_string()
    )
    .increment(1);
    metrics::histogram!("notion2api_request_duration_seconds", "model" => model.to_string())
        .record(duration_secs);
}

/// Record tokens counted for a request
pub fn record_tokens(token_type: &str, count: u64, model: &str) {
    metrics::counter!(
        "notion2api_tokens_total",
        "type" => token_type.to_string(),
        "model" => model.to_string()
    )
    .increment(count);
}

/// Record a failed upstream call; `stage` is "thread", "inference" or "stream"
pub fn record_upstream_error(stage: &str, error_type: &str) {
    metrics::counter!(
        "notion2api_upstream_errors_total",
        "stage" => stage.to_string(),
        "type" => error_type.to_string()
    )
    .increment(1);
}
