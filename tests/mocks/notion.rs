//! Mock Notion API for testing
//!
//! Provides wiremock-based mocks for the endpoints the provider uses:
//! - GET / - session warm-up
//! - POST /api/v3/saveTransactionsFanout - thread creation
//! - POST /api/v3/runInferenceTranscript - NDJSON inference stream
//!
//! Default mocks are mounted with wiremock's default priority; the failure
//! helpers use a higher priority so they win when mounted on top.

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

pub const THREAD_PATH: &str = "/api/v3/saveTransactionsFanout";
pub const INFERENCE_PATH: &str = "/api/v3/runInferenceTranscript";

/// Priority used by the override helpers (wiremock default is 5)
const OVERRIDE_PRIORITY: u8 = 1;

/// Mock Notion server wrapper
pub struct MockNotion {
    server: MockServer,
}

impl MockNotion {
    /// Start a new mock Notion server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the mock server URI
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Warm-up page load succeeds
    pub async fn mock_warm_up(&self) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&self.server)
            .await;
    }

    /// Thread creation succeeds
    pub async fn mock_thread_creation(&self) {
        Mock::given(method("POST"))
            .and(path(THREAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&self.server)
            .await;
    }

    /// Thread creation answers with `status`
    pub async fn mock_thread_creation_error(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(THREAD_PATH))
            .respond_with(ResponseTemplate::new(status))
            .with_priority(OVERRIDE_PRIORITY)
            .mount(&self.server)
            .await;
    }

    /// Inference answers with the given NDJSON records
    pub async fn mock_inference(&self, records: &[String]) {
        let mut body = records.join("\n");
        body.push('\n');

        Mock::given(method("POST"))
            .and(path(INFERENCE_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "application/x-ndjson"),
            )
            .mount(&self.server)
            .await;
    }

    /// Inference answers with a raw body
    pub async fn mock_inference_raw(&self, body: &str) {
        Mock::given(method("POST"))
            .and(path(INFERENCE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body.as_bytes().to_vec(), "application/x-ndjson"),
            )
            .mount(&self.server)
            .await;
    }

    /// Inference answers with `status`
    pub async fn mock_inference_error(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(INFERENCE_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream said no"))
            .with_priority(OVERRIDE_PRIORITY)
            .mount(&self.server)
            .await;
    }

    /// Requests received on `endpoint`
    pub async fn requests_to(&self, endpoint: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == endpoint)
            .collect()
    }

    /// JSON body of the most recent inference request
    pub async fn last_inference_body(&self) -> Value {
        let requests = self.requests_to(INFERENCE_PATH).await;
        let request = requests.last().expect("no inference request received");
        serde_json::from_slice(&request.body).expect("inference body is JSON")
    }
}

/// Builders for upstream NDJSON records
pub struct NotionRecords;

impl NotionRecords {
    /// Patch appending `text` to the assistant's text value
    pub fn patch(text: &str) -> String {
        json!({
            "type": "patch",
            "v": [{"o": "x", "p": "/s/2/value/0/content", "v": text}]
        })
        .to_string()
    }

    /// Patch opening a new text item
    pub fn new_text_item(text: &str) -> String {
        json!({
            "type": "patch",
            "v": [{"o": "a", "p": "/s/2/value/-", "v": {"type": "text", "content": text}}]
        })
        .to_string()
    }

    /// Snapshot of the whole message so far
    pub fn markdown_chat(text: &str) -> String {
        json!({"type": "markdown-chat", "value": text}).to_string()
    }

    /// Terminal record carrying the finished message
    pub fn record_map(text: &str) -> String {
        json!({
            "type": "record-map",
            "recordMap": {
                "thread_message": {
                    "msg-1": {
                        "value": {"value": {"step": {
                            "type": "agent-inference",
                            "value": [{"type": "text", "content": text}]
                        }}}
                    }
                }
            }
        })
        .to_string()
    }

    /// Record with no text
    pub fn control() -> String {
        json!({"type": "agent-inference-status", "status": "started"}).to_string()
    }

    /// Records streaming "Hel" + "lo" and finishing with "Hello"
    pub fn hello() -> Vec<String> {
        vec![
            Self::control(),
            Self::patch("Hel"),
            Self::patch("lo"),
            Self::record_map("Hello"),
        ]
    }
}
