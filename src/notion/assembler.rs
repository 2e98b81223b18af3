//! Response assembly
//!
//! Both client-visible shapes are built from the same lazy delta sequence:
//! [`sse_stream`] re-frames it as OpenAI `chat.completion.chunk` events and
//! [`collect_completion`] drains it into one `chat.completion` object.

use std::convert::Infallible;

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::parser::{DeltaKind, TextDelta};
use crate::error::{AppError, AppResult};
use crate::openai::{
    ChatCompletionResponse, Choice, ChoiceMessage, Delta, Message, Role, StreamChoice,
    StreamChunk, Usage,
};
use crate::tokens::TokenCounter;

/// Metadata shared by every chunk of one completion.
#[derive(Debug, Clone)]
pub struct StreamMetadata {
    pub id: String,
    /// Model alias the client asked for
    pub model: String,
    pub created: u64,
}

impl StreamMetadata {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            model: model.into(),
            created: Utc::now().timestamp().max(0) as u64,
        }
    }
}

/// What is needed to compute the usage block
#[derive(Clone)]
pub struct UsageContext {
    pub counter: TokenCounter,
    pub messages: Vec<Message>,
}

impl UsageContext {
    pub fn usage(&self, completion: &str) -> Usage {
        self.counter.usage(&self.messages, completion)
    }
}

/// How a streamed completion ended
#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub usage: Usage,
    /// Error type when the stream was cut short
    pub error_type: Option<&'static str>,
}

/// Called once when a streamed completion ends
pub type OnFinish = Box<dyn FnOnce(StreamSummary) + Send>;

/// Format a value as an SSE data event: `data: {json}\n\n`
fn format_sse_data<T: Serialize>(value: &T) -> Bytes {
    match serde_json::to_string(value) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(e) => {
            warn!(error = %e, "Failed to serialize SSE event");
            Bytes::from_static(b"data: {\"error\":{\"message\":\"Failed to serialize event\",\"type\":\"internal_server_error\",\"code\":500}}\n\n")
        }
    }
}

/// Format a stream chunk as an SSE data event.
pub fn format_sse_chunk(chunk: &StreamChunk) -> Bytes {
    format_sse_data(chunk)
}

/// The OpenAI stream terminator: `data: [DONE]\n\n`
pub fn format_sse_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Format an error as an SSE error event with the same body as HTTP errors.
pub fn format_error_event(error: &AppError) -> Bytes {
    format_sse_data(&error.to_body())
}

fn create_chunk(
    metadata: &StreamMetadata,
    delta: Delta,
    finish_reason: Option<&str>,
) -> StreamChunk {
    StreamChunk {
        id: metadata.id.clone(),
        object: "chat.completion.chunk".to_string(),
        created: metadata.created,
        model: metadata.model.clone(),
        choices: vec![StreamChoice {
            index: 0,
            delta,
            finish_reason: finish_reason.map(str::to_string),
        }],
        usage: None,
    }
}

fn usage_chunk(metadata: &StreamMetadata, usage: Usage) -> StreamChunk {
    StreamChunk {
        id: metadata.id.clone(),
        object: "chat.completion.chunk".to_string(),
        created: metadata.created,
        model: metadata.model.clone(),
        choices: Vec::new(),
        usage: Some(usage),
    }
}

fn delta_for(text: &TextDelta) -> Delta {
    match text.kind {
        DeltaKind::Content => Delta {
            content: Some(text.content.clone()),
            ..Default::default()
        },
        DeltaKind::Reasoning => Delta {
            reasoning_content: Some(text.content.clone()),
            ..Default::default()
        },
    }
}

/// Re-frame deltas as an OpenAI SSE body.
///
/// Emits a role chunk, one chunk per non-empty delta, a `stop` chunk, an
/// optional usage chunk and exactly one `[DONE]`. An error from the delta
/// sequence becomes a single error event followed by `[DONE]`.
pub fn sse_stream<S>(
    deltas: S,
    metadata: StreamMetadata,
    usage: UsageContext,
    include_usage: bool,
    on_finish: OnFinish,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    S: Stream<Item = AppResult<TextDelta>> + Send + 'static,
{
    async_stream::stream! {
        let mut deltas = Box::pin(deltas);
        let mut content = String::new();
        let mut error_type = None;

        let role = Delta {
            role: Some(Role::Assistant),
            ..Default::default()
        };
        yield Ok(format_sse_chunk(&create_chunk(&metadata, role, None)));

        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    if !delta.content.is_empty() {
                        if delta.kind == DeltaKind::Content {
                            content.push_str(&delta.content);
                        }
                        yield Ok(format_sse_chunk(&create_chunk(&metadata, delta_for(&delta), None)));
                    }
                    if delta.is_final {
                        break;
                    }
                }
                Err(error) => {
                    warn!(
                        completion_id = %metadata.id,
                        error_type = error.error_type(),
                        message = %error,
                        "Stream aborted"
                    );
                    error_type = Some(error.error_type());
                    yield Ok(format_error_event(&error));
                    break;
                }
            }
        }

        let usage = usage.usage(&content);
        if error_type.is_none() {
            yield Ok(format_sse_chunk(&create_chunk(&metadata, Delta::default(), Some("stop"))));
            if include_usage {
                yield Ok(format_sse_chunk(&usage_chunk(&metadata, usage.clone())));
            }
        }

        debug!(completion_id = %metadata.id, completion_tokens = usage.completion_tokens, "Stream finished");
        on_finish(StreamSummary { usage, error_type });

        yield Ok(format_sse_done());
    }
}

/// Drain deltas into a single completion object.
///
/// The first error aborts the whole response.
pub async fn collect_completion<S>(
    deltas: S,
    metadata: StreamMetadata,
    usage: UsageContext,
) -> AppResult<ChatCompletionResponse>
where
    S: Stream<Item = AppResult<TextDelta>>,
{
    let mut deltas = Box::pin(deltas);
    let mut content = String::new();
    let mut reasoning = String::new();

    while let Some(delta) = deltas.next().await {
        let delta = delta?;
        match delta.kind {
            DeltaKind::Content => content.push_str(&delta.content),
            DeltaKind::Reasoning => reasoning.push_str(&delta.content),
        }
        if delta.is_final {
            break;
        }
    }

    let usage = usage.usage(&content);

    Ok(ChatCompletionResponse {
        id: metadata.id,
        object: "chat.completion".to_string(),
        created: metadata.created,
        model: metadata.model,
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: Role::Assistant,
                content,
                reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage,
    })
}
