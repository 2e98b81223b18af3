//! Authentication and rate limiting integration tests

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{constants::TEST_MASTER_KEY, with_bearer, TestApp};

#[tokio::test]
async fn test_no_master_key_means_open_access() {
    let app = TestApp::spawn().await;

    let response = app.server.get("/v1/models").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_missing_bearer_rejected() {
    let app = TestApp::spawn_with(&[("API_MASTER_KEY", TEST_MASTER_KEY)]).await;

    let response = app.server.get("/v1/models").await;

    assert_eq!(response.status_code(), 401);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn test_wrong_bearer_rejected() {
    let app = TestApp::spawn_with(&[("API_MASTER_KEY", TEST_MASTER_KEY)]).await;

    let response = with_bearer(app.server.get("/v1/models"), "sk-wrong").await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_correct_bearer_accepted() {
    let app = TestApp::spawn_with(&[("API_MASTER_KEY", TEST_MASTER_KEY)]).await;

    let response = with_bearer(app.server.get("/v1/models"), TEST_MASTER_KEY).await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_public_routes_skip_auth() {
    let app = TestApp::spawn_with(&[("API_MASTER_KEY", TEST_MASTER_KEY)]).await;

    assert_eq!(app.server.get("/health").await.status_code(), 200);
    assert_eq!(app.server.get("/").await.status_code(), 200);
}

#[tokio::test]
async fn test_local_rate_limit() {
    let app = TestApp::spawn_with(&[
        ("RATE_LIMIT_ENABLED", "true"),
        ("RATE_LIMIT_REQUESTS", "2"),
    ])
    .await;

    // Rejected by validation, but still counted
    let request = json!({"model": "gpt-99", "messages": [{"role": "user", "content": "Hi"}]});

    assert_eq!(app.chat(&request).await.status_code(), 400);
    assert_eq!(app.chat(&request).await.status_code(), 400);

    let limited = app.chat(&request).await;
    assert_eq!(limited.status_code(), 429);
    let retry_after: u64 = limited
        .header("retry-after")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);

    let body: Value = limited.json();
    assert_eq!(body["error"]["type"], "rate_limit_error");
}

#[tokio::test]
async fn test_rate_limit_does_not_cover_models() {
    let app = TestApp::spawn_with(&[
        ("RATE_LIMIT_ENABLED", "true"),
        ("RATE_LIMIT_REQUESTS", "1"),
    ])
    .await;

    for _ in 0..3 {
        assert_eq!(app.server.get("/v1/models").await.status_code(), 200);
    }
}
