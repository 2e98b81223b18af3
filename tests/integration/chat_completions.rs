//! Chat completions integration tests
//!
//! Drive /v1/chat/completions end to end against the fake Notion API.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{sse_payloads, streamed_content, TestApp};
use crate::mocks::{NotionRecords, INFERENCE_PATH, THREAD_PATH};

fn hello_request(stream: bool) -> Value {
    json!({
        "model": "claude-sonnet-4.5",
        "messages": [{"role": "user", "content": "Hi"}],
        "stream": stream
    })
}

#[tokio::test]
async fn test_non_streaming_completion() {
    let app = TestApp::spawn().await;
    app.notion.mock_inference(&NotionRecords::hello()).await;

    let response = app.chat(&hello_request(false)).await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "claude-sonnet-4.5");
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(body["choices"][0]["index"], 0);
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");

    let usage = &body["usage"];
    assert!(usage["prompt_tokens"].as_u64().unwrap() > 0);
    assert!(usage["completion_tokens"].as_u64().unwrap() > 0);
    assert_eq!(
        usage["total_tokens"].as_u64().unwrap(),
        usage["prompt_tokens"].as_u64().unwrap() + usage["completion_tokens"].as_u64().unwrap()
    );
}

#[tokio::test]
async fn test_streaming_completion_shape() {
    let app = TestApp::spawn().await;
    app.notion.mock_inference(&NotionRecords::hello()).await;

    let response = app.chat(&hello_request(true)).await;

    assert_eq!(response.status_code(), 200);
    let content_type = response.header("content-type");
    assert!(content_type.to_str().unwrap().starts_with("text/event-stream"));

    let payloads = sse_payloads(&response.text());
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
    assert_eq!(payloads.iter().filter(|p| p.as_str() == "[DONE]").count(), 1);

    let chunks: Vec<Value> = payloads[..payloads.len() - 1]
        .iter()
        .map(|p| serde_json::from_str(p).unwrap())
        .collect();

    // One id, one model, one created across the whole stream
    let id = chunks[0]["id"].clone();
    assert!(chunks.iter().all(|c| c["id"] == id));
    assert!(chunks.iter().all(|c| c["model"] == "claude-sonnet-4.5"));
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));
    assert!(chunks.iter().all(|c| c["created"] == chunks[0]["created"]));

    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
    let last = chunks.last().unwrap();
    assert_eq!(last["choices"][0]["finish_reason"], "stop");

    assert_eq!(streamed_content(&payloads), "Hello");
}

#[tokio::test]
async fn test_stream_defaults_to_true() {
    let app = TestApp::spawn().await;
    app.notion.mock_inference(&NotionRecords::hello()).await;

    let response = app
        .chat(&json!({
            "model": "gpt-5",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    assert!(response.text().ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn test_stream_and_non_stream_agree() {
    // Snapshots repeat the raw text, markup included
    let raw = "<lang primary=\"en-US\"/>\n<thinking>plan the answer</thinking>\nLine one\nLine two";
    let records = vec![
        NotionRecords::patch("<lang primary=\"en-US\"/>\n"),
        NotionRecords::patch("<thinking>plan the answer</thinking>\n"),
        NotionRecords::patch("Line one"),
        NotionRecords::new_text_item("\nLine two"),
        NotionRecords::markdown_chat(&format!("{raw}, done")),
        NotionRecords::record_map(&format!("{raw}, done.")),
    ];

    let app = TestApp::spawn().await;
    app.notion.mock_inference(&records).await;

    let full: Value = app.chat(&hello_request(false)).await.json();
    let streamed = app.chat(&hello_request(true)).await;
    let payloads = sse_payloads(&streamed.text());

    let content = full["choices"][0]["message"]["content"].as_str().unwrap();
    assert_eq!(content, "Line one\nLine two, done.");
    assert_eq!(streamed_content(&payloads), content);
}

#[tokio::test]
async fn test_reasoning_returned_when_requested() {
    let app = TestApp::spawn().await;
    app.notion
        .mock_inference(&[
            NotionRecords::patch("<thinking>step by step</thinking>"),
            NotionRecords::patch("Answer"),
        ])
        .await;

    let mut request = hello_request(false);
    request["include_reasoning"] = json!(true);
    let body: Value = app.chat(&request).await.json();

    assert_eq!(body["choices"][0]["message"]["content"], "Answer");
    assert_eq!(body["choices"][0]["message"]["reasoning_content"], "step by step");
}

#[tokio::test]
async fn test_usage_chunk_when_requested() {
    let app = TestApp::spawn().await;
    app.notion.mock_inference(&NotionRecords::hello()).await;

    let mut request = hello_request(true);
    request["stream_options"] = json!({"include_usage": true});
    let payloads = sse_payloads(&app.chat(&request).await.text());

    let usage_chunk: Value = serde_json::from_str(&payloads[payloads.len() - 2]).unwrap();
    assert_eq!(usage_chunk["choices"], json!([]));
    assert!(usage_chunk["usage"]["completion_tokens"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_zero_deltas_yield_empty_content() {
    let app = TestApp::spawn().await;
    app.notion
        .mock_inference(&[NotionRecords::control(), NotionRecords::control()])
        .await;

    let body: Value = app.chat(&hello_request(false)).await.json();
    assert_eq!(body["choices"][0]["message"]["content"], "");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["completion_tokens"], 0);

    let payloads = sse_payloads(&app.chat(&hello_request(true)).await.text());
    assert_eq!(streamed_content(&payloads), "");
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
}

#[tokio::test]
async fn test_malformed_record_mid_stream() {
    let body = format!("{}\n{{\"type\": \"patch\", \"v\": [\n", NotionRecords::patch("kept"));

    let app = TestApp::spawn().await;
    app.notion.mock_inference_raw(&body).await;

    let response = app.chat(&hello_request(true)).await;
    assert_eq!(response.status_code(), 200);

    let payloads = sse_payloads(&response.text());
    assert_eq!(streamed_content(&payloads), "kept");
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
    assert_eq!(payloads.iter().filter(|p| p.as_str() == "[DONE]").count(), 1);

    let error: Value = serde_json::from_str(&payloads[payloads.len() - 2]).unwrap();
    assert_eq!(error["error"]["type"], "internal_server_error");

    // No stop chunk after a failure
    assert!(!payloads.iter().any(|p| p.contains("\"finish_reason\":\"stop\"")));
}

#[tokio::test]
async fn test_malformed_record_non_streaming() {
    let app = TestApp::spawn().await;
    app.notion.mock_inference_raw("not json at all\n").await;

    let response = app.chat(&hello_request(false)).await;

    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "internal_server_error");
}

#[tokio::test]
async fn test_conversation_forwarded_upstream() {
    let app = TestApp::spawn().await;
    app.notion.mock_inference(&NotionRecords::hello()).await;

    let response = app
        .chat(&json!({
            "model": "gemini-2.5-pro",
            "stream": false,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": [{"type": "text", "text": "Hi"}]}
            ]
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    // One thread per call
    assert_eq!(app.notion.requests_to(THREAD_PATH).await.len(), 1);
    assert_eq!(app.notion.requests_to(INFERENCE_PATH).await.len(), 1);

    let body = app.notion.last_inference_body().await;
    assert_eq!(body["threadType"], "markdown-chat");
    assert_eq!(body["spaceId"], "space-123");
    assert_eq!(body["transcript"][0]["value"]["model"], "vertex-gemini-2.5-pro");
    assert_eq!(
        body["transcript"][2]["value"],
        json!([["System: Be brief.\n\nUser: Hi"]])
    );
}

#[tokio::test]
async fn test_session_headers_sent() {
    let app = TestApp::spawn().await;
    app.notion.mock_inference(&NotionRecords::hello()).await;

    app.chat(&hello_request(false)).await;

    let requests = app.notion.requests_to(INFERENCE_PATH).await;
    let headers = &requests[0].headers;
    let cookie = headers.get("cookie").unwrap().to_str().unwrap();
    assert!(cookie.contains("token_v2=test-token-v2"));
    assert_eq!(headers.get("x-notion-space-id").unwrap(), "space-123");
    assert_eq!(headers.get("x-notion-active-user-header").unwrap(), "user-123");
}

#[tokio::test]
async fn test_each_call_gets_a_fresh_thread() {
    let app = TestApp::spawn().await;
    app.notion.mock_inference(&NotionRecords::hello()).await;

    app.chat(&hello_request(false)).await;
    app.chat(&hello_request(true)).await;

    let thread_ids: Vec<String> = app
        .notion
        .requests_to(INFERENCE_PATH)
        .await
        .iter()
        .map(|request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            body["threadId"].as_str().unwrap().to_string()
        })
        .collect();

    assert_eq!(thread_ids.len(), 2);
    assert_ne!(thread_ids[0], thread_ids[1]);
    assert_eq!(app.notion.requests_to(THREAD_PATH).await.len(), 2);
}
