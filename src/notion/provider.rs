//! Chat provider abstraction and the Notion implementation
//!
//! Handlers talk to a [`ChatProvider`]; [`NotionProvider`] wires the session,
//! translator, parser and assembler together behind it.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use tracing::{info, instrument};

use super::assembler::{collect_completion, sse_stream, StreamMetadata, StreamSummary, UsageContext};
use super::parser::text_deltas;
use super::session::SessionManager;
use super::translate;
use crate::config::Config;
use crate::error::AppResult;
use crate::openai::{ChatCompletionRequest, ChatCompletionResponse, Model, ModelsResponse};
use crate::routes::metrics::{record_request, record_tokens, record_upstream_error};
use crate::tokens::TokenCounter;

/// SSE body ready to hand to the HTTP layer
pub type SseStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// Result of a chat call
pub enum ChatOutcome {
    /// `stream: true`; the body yields SSE frames until `[DONE]`
    Stream { model: String, body: SseStream },
    /// `stream: false`
    Complete(ChatCompletionResponse),
}

/// Trait defining the interface for chat backends
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logging and metrics
    fn name(&self) -> &'static str;

    /// Run one chat completion.
    ///
    /// Errors returned here happen before any response byte is produced;
    /// failures after that are reported inside the SSE body.
    async fn chat_completion(&self, request: ChatCompletionRequest) -> AppResult<ChatOutcome>;

    /// Models clients may ask for
    fn list_models(&self) -> ModelsResponse;

    /// Best-effort connection warm-up
    async fn warm_up(&self) -> bool;
}

/// [`ChatProvider`] backed by Notion AI
pub struct NotionProvider {
    config: Arc<Config>,
    sessions: SessionManager,
    token_counter: TokenCounter,
}

impl NotionProvider {
    /// Fails with a configuration error when credentials are missing
    pub fn new(config: Arc<Config>, token_counter: TokenCounter) -> AppResult<Self> {
        let sessions = SessionManager::new(&config)?;
        Ok(Self {
            config,
            sessions,
            token_counter,
        })
    }
}

#[async_trait]
impl ChatProvider for NotionProvider {
    fn name(&self) -> &'static str {
        "notion"
    }

    #[instrument(skip_all, fields(model = ?request.model, stream = request.stream))]
    async fn chat_completion(&self, request: ChatCompletionRequest) -> AppResult<ChatOutcome> {
        let start = Instant::now();
        let prepared = translate::prepare(&request, &self.config)?;

        let session = self.sessions.ensure_session().await;
        let (thread, body) = translate::translate(&prepared, session)
            .await
            .inspect_err(|e| record_upstream_error("thread", e.error_type()))?;

        let response = session
            .run_inference(
                &body,
                self.config.api_request_timeout,
                self.config.stream_read_timeout,
            )
            .await
            .inspect_err(|e| record_upstream_error("inference", e.error_type()))?;

        info!(
            thread_id = %thread.id,
            model = %prepared.model_alias,
            upstream_model = %prepared.upstream_model,
            "Inference started"
        );

        let include_usage = request.include_usage();
        let deltas = text_deltas(response.bytes_stream(), request.include_reasoning);
        let metadata = StreamMetadata::new(prepared.model_alias.clone());
        let usage = UsageContext {
            counter: self.token_counter.clone(),
            messages: request.messages,
        };

        if request.stream {
            let model = prepared.model_alias.clone();
            let on_finish = Box::new(move |summary: StreamSummary| {
                if let Some(error_type) = summary.error_type {
                    record_upstream_error("stream", error_type);
                }
                let status = summary.error_type.unwrap_or("success");
                record_request(status, &model, start.elapsed().as_secs_f64());
                record_tokens("prompt", summary.usage.prompt_tokens as u64, &model);
                record_tokens("completion", summary.usage.completion_tokens as u64, &model);
            });

            let body = sse_stream(deltas, metadata, usage, include_usage, on_finish);
            return Ok(ChatOutcome::Stream {
                model: prepared.model_alias,
                body: Box::pin(body),
            });
        }

        let completion = collect_completion(deltas, metadata, usage)
            .await
            .inspect_err(|e| record_upstream_error("stream", e.error_type()))?;
        record_request("success", &prepared.model_alias, start.elapsed().as_secs_f64());
        record_tokens("prompt", completion.usage.prompt_tokens as u64, &prepared.model_alias);
        record_tokens(
            "completion",
            completion.usage.completion_tokens as u64,
            &prepared.model_alias,
        );

        Ok(ChatOutcome::Complete(completion))
    }

    fn list_models(&self) -> ModelsResponse {
        let created = Utc::now().timestamp().max(0) as u64;
        ModelsResponse {
            object: "list".to_string(),
            data: self
                .config
                .model_map
                .iter()
                .map(|entry| Model {
                    id: entry.alias.clone(),
                    object: "model".to_string(),
                    created,
                    owned_by: self.name().to_string(),
                })
                .collect(),
        }
    }

    async fn warm_up(&self) -> bool {
        self.sessions.warm_up().await
    }
}
