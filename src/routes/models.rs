//! Models endpoint
//!
//! Lists the model aliases clients may request.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};

use crate::{error::AppResult, openai::ModelsResponse, AppState};

/// List available models, in alias table order
pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> AppResult<(StatusCode, Json<ModelsResponse>)> {
    let provider = state.provider()?;
    Ok((StatusCode::OK, Json(provider.list_models())))
}
