//! Request types for `/v1/chat/completions`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::types::Message;

fn default_stream() -> bool {
    true
}

/// `stream_options` as defined by the OpenAI API
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamOptions {
    /// Append a chunk carrying `usage` before `[DONE]`
    #[serde(default)]
    pub include_usage: bool,
}

/// Chat completion request
///
/// Sampling parameters the upstream has no equivalent for (`temperature`,
/// `max_tokens`, `tools`, ...) are accepted and collected into `extra` so
/// existing OpenAI clients work unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionRequest {
    /// Model alias; the configured default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Whether to stream the response (defaults to true)
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    /// Surface `<thinking>` blocks as `reasoning_content`
    #[serde(default)]
    pub include_reasoning: bool,
    /// Block id placed in the upstream context instead of `NOTION_BLOCK_ID`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_block_id: Option<String>,
    /// Ignored OpenAI parameters
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ChatCompletionRequest {
    pub fn include_usage(&self) -> bool {
        self.stream_options
            .as_ref()
            .map(|options| options.include_usage)
            .unwrap_or(false)
    }
}
