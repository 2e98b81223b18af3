//! Chat completions endpoint
//!
//! OpenAI-compatible chat completions API endpoint.
//! Handles both streaming and non-streaming responses.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::{
    error::AppError,
    notion::ChatOutcome,
    openai::ChatCompletionRequest,
    routes::metrics::record_request,
    AppState,
};

/// Handle chat completion requests
///
/// The body is parsed here rather than with the `Json` extractor so malformed
/// input gets the same error shape as every other failure.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let start_time = Instant::now();

    let request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;

    let provider = state.provider()?;
    let model = request
        .model
        .clone()
        .unwrap_or_else(|| state.config.default_model.clone());

    info!(
        model = %model,
        stream = request.stream,
        messages = request.messages.len(),
        "Processing chat completion request"
    );

    let outcome = match provider.chat_completion(request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            record_request(e.error_type(), &model, start_time.elapsed().as_secs_f64());
            warn!(model = %model, error_type = e.error_type(), "Chat completion failed");
            return Err(e);
        }
    };

    match outcome {
        ChatOutcome::Complete(response) => {
            info!(
                model = %response.model,
                duration_ms = %format!("{:.2}", start_time.elapsed().as_secs_f64() * 1000.0),
                "Chat completion request completed"
            );
            Ok((StatusCode::OK, Json(response)).into_response())
        }
        ChatOutcome::Stream { model, body } => {
            info!(model = %model, "Streaming chat completion");

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::CONNECTION, "keep-alive")
                .header("X-Accel-Buffering", "no")
                .body(Body::from_stream(body))
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {e}")))
        }
    }
}
