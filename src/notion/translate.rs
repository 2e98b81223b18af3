//! Chat request to Notion transcript translation
//!
//! Validation and prompt flattening happen in [`prepare`], which does no I/O,
//! so a bad model or an empty conversation is rejected before anything is
//! sent upstream. [`translate`] then opens a fresh thread and builds the
//! `runInferenceTranscript` body.

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::session::{NotionIdentity, ThreadType, UpstreamSession, UpstreamThread};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::openai::{ChatCompletionRequest, Message};

static HEX_BLOCK_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{32}$").expect("valid regex"));

/// Workspace view the AI module surface is opened from
const AI_MODULE_SPACE_VIEW_ID: &str = "2008eefa-d0dc-80d5-9e67-000623befd8f";

/// A validated request, ready to be sent
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Alias the client asked for; echoed back in responses
    pub model_alias: String,
    pub upstream_model: String,
    pub thread_type: ThreadType,
    pub prompt: String,
    pub block_id: Option<String>,
}

/// Validate the request and flatten its conversation. Performs no I/O.
pub fn prepare(request: &ChatCompletionRequest, config: &Config) -> AppResult<PreparedRequest> {
    let model_alias = request
        .model
        .clone()
        .unwrap_or_else(|| config.default_model.clone());

    let upstream_model = config
        .resolve_model(&model_alias)
        .ok_or_else(|| AppError::ModelNotSupported(model_alias.clone()))?
        .to_string();

    if request.messages.is_empty() {
        return Err(AppError::BadRequest("messages must not be empty".to_string()));
    }

    Ok(PreparedRequest {
        thread_type: ThreadType::for_model(&upstream_model),
        prompt: flatten_messages(&request.messages),
        block_id: request.notion_block_id.clone(),
        model_alias,
        upstream_model,
    })
}

/// Render the conversation as a single prompt.
///
/// A lone message is sent as-is; otherwise each turn becomes
/// `Role: content` and turns are separated by a blank line.
pub fn flatten_messages(messages: &[Message]) -> String {
    if let [only] = messages {
        return only.content.as_text();
    }

    messages
        .iter()
        .map(|message| format!("{}: {}", message.role.label(), message.content.as_text()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Dash a bare 32-hex block id into UUID form; anything else is kept as given
pub fn normalize_block_id(block_id: &str) -> String {
    let compact = block_id.trim().replace('-', "");
    if HEX_BLOCK_ID.is_match(&compact) {
        format!(
            "{}-{}-{}-{}-{}",
            &compact[0..8],
            &compact[8..12],
            &compact[12..16],
            &compact[16..20],
            &compact[20..]
        )
    } else {
        block_id.to_string()
    }
}

/// Open a thread for this call and build the inference body
pub async fn translate(
    prepared: &PreparedRequest,
    session: &UpstreamSession,
) -> AppResult<(UpstreamThread, Value)> {
    let thread = session.create_thread(prepared.thread_type).await?;
    let body = inference_body(prepared, &thread, session.identity());
    debug!(thread_id = %thread.id, model = %prepared.upstream_model, "Built inference body");
    Ok((thread, body))
}

/// The `runInferenceTranscript` request body
pub fn inference_body(
    prepared: &PreparedRequest,
    thread: &UpstreamThread,
    identity: &NotionIdentity,
) -> Value {
    let is_vertex = thread.thread_type == ThreadType::MarkdownChat;
    let now = Local::now().to_rfc3339();
    let user_name = identity.user_name.clone().unwrap_or_default();

    let mut context = Map::new();
    context.insert("timezone".into(), json!(identity.timezone));
    context.insert("spaceId".into(), json!(identity.space_id));
    context.insert("userId".into(), json!(identity.user_id));
    context.insert("userEmail".into(), json!(identity.user_email));
    context.insert("currentDatetime".into(), json!(now));

    let block_id = prepared.block_id.as_deref().or(identity.block_id.as_deref());
    if let Some(block_id) = block_id.filter(|id| !id.trim().is_empty()) {
        context.insert("blockId".into(), json!(normalize_block_id(block_id)));
    }

    let config = if is_vertex {
        context.insert("userName".into(), json!(format!(" {user_name}")));
        context.insert("spaceName".into(), json!(format!("{user_name}'s Notion")));
        context.insert("spaceViewId".into(), json!(AI_MODULE_SPACE_VIEW_ID));
        context.insert("surface".into(), json!("ai_module"));
        json!({
            "type": thread.thread_type.as_str(),
            "model": prepared.upstream_model,
            "useWebSearch": true,
            "enableAgentAutomations": false,
            "enableAgentIntegrations": false,
            "enableBackgroundAgents": false,
            "enableCodegenIntegration": false,
            "enableCustomAgents": false,
            "enableExperimentalIntegrations": false,
            "enableLinkedDatabases": false,
            "enableAgentViewVersionHistoryTool": false,
            "searchScopes": [{"type": "everything"}],
            "enableDatabaseAgents": false,
            "enableAgentComments": false,
            "enableAgentForms": false,
            "enableAgentMakesFormulas": false,
            "enableUserSessionContext": false,
            "modelFromUser": true,
            "isCustomAgent": false
        })
    } else {
        context.insert("userName".into(), json!(user_name));
        context.insert("surface".into(), json!("workflows"));
        json!({
            "type": thread.thread_type.as_str(),
            "model": prepared.upstream_model,
            "useWebSearch": true
        })
    };

    let mut body = json!({
        "traceId": Uuid::new_v4().to_string(),
        "spaceId": identity.space_id,
        "transcript": [
            {"id": Uuid::new_v4().to_string(), "type": "config", "value": config},
            {"id": Uuid::new_v4().to_string(), "type": "context", "value": Value::Object(context)},
            {
                "id": Uuid::new_v4().to_string(),
                "type": "user",
                "value": [[prepared.prompt]],
                "userId": identity.user_id,
                "createdAt": now
            }
        ],
        "threadId": thread.id,
        "createThread": false,
        "isPartialTranscript": true,
        "asPatchResponse": true,
        "generateTitle": true,
        "saveAllThreadOperations": true,
        "threadType": thread.thread_type.as_str()
    });

    if is_vertex {
        body["debugOverrides"] = json!({
            "emitAgentSearchExtractedResults": true,
            "cachedInferences": {},
            "annotationInferences": {},
            "emitInferences": false
        });
    }

    body
}
