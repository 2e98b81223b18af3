//! Models endpoint integration tests

use pretty_assertions::assert_eq;
use serde_json::Value;

use crate::common::TestApp;

#[tokio::test]
async fn test_list_models_default_table() {
    let app = TestApp::spawn().await;

    let response = app.server.get("/v1/models").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["object"], "list");

    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![
            "claude-sonnet-4.5",
            "gpt-5",
            "claude-opus-4.1",
            "gemini-2.5-flash",
            "gemini-2.5-pro",
            "gpt-4.1"
        ]
    );
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .all(|m| m["object"] == "model" && m["owned_by"] == "notion"));
}

#[tokio::test]
async fn test_list_models_custom_table() {
    let app = TestApp::spawn_with(&[("MODEL_MAP", "fast=openai-turbo")]).await;

    let body: Value = app.server.get("/v1/models").await.json();
    let data = body["data"].as_array().unwrap();

    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["id"], "fast");
}

#[tokio::test]
async fn test_list_models_without_credentials() {
    let app = TestApp::spawn_with(&[("NOTION_SPACE_ID", "")]).await;

    let response = app.server.get("/v1/models").await;
    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "configuration_error");
}
