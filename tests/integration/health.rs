//! Health and root endpoint integration tests

use pretty_assertions::assert_eq;
use serde_json::Value;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_healthy() {
    let app = TestApp::spawn().await;

    let response = app.server.get("/health").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_health_unhealthy_without_credentials() {
    let app = TestApp::spawn_with(&[("NOTION_USER_ID", "")]).await;

    let response = app.server.get("/health").await;

    assert_eq!(response.status_code(), 503);
    let body: Value = response.json();
    assert_eq!(body["status"], "unhealthy");
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_index_reports_status() {
    let app = TestApp::spawn().await;
    let body: Value = app.server.get("/").await.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["endpoints"]["chat"], "/v1/chat/completions");

    let degraded = TestApp::spawn_with(&[("NOTION_COOKIE", "")]).await;
    let body: Value = degraded.server.get("/").await.json();
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_endpoint_responds() {
    let app = TestApp::spawn().await;
    assert_eq!(app.server.get("/metrics").await.status_code(), 200);
}
