//! notion2api - OpenAI-compatible chat completions on top of Notion AI
//!
//! This library provides the core functionality for the notion2api server:
//! the Notion provider adapter, the OpenAI wire types and the HTTP layer
//! around them.

pub mod config;
pub mod error;
pub mod middleware;
pub mod notion;
pub mod openai;
pub mod routes;
pub mod streaming;
pub mod tokens;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

pub use crate::config::Config;
pub use crate::error::{AppError, AppResult};
pub use crate::notion::{ChatProvider, NotionProvider};
pub use crate::tokens::TokenCounter;

use crate::middleware::rate_limiter::ClientRateLimiter;

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when the provider could not be built (missing credentials)
    pub provider: Option<Arc<dyn ChatProvider>>,
    /// Why `provider` is `None`
    pub provider_error: Option<String>,
    /// `None` when rate limiting is disabled
    pub rate_limiter: Option<ClientRateLimiter>,
    pub token_counter: TokenCounter,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state.
    ///
    /// A provider that cannot be built does not stop the service; chat and
    /// model calls then fail with a configuration error and `/health`
    /// reports unhealthy.
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let token_counter = TokenCounter::new()?;

        let (provider, provider_error) =
            match NotionProvider::new(config.clone(), token_counter.clone()) {
                Ok(provider) => {
                    info!(provider = provider.name(), "Provider initialized");
                    (Some(Arc::new(provider) as Arc<dyn ChatProvider>), None)
                }
                Err(e) => {
                    warn!(error = %e, "Provider unavailable, chat requests will fail");
                    (None, Some(e.to_string()))
                }
            };

        let rate_limiter = config
            .rate_limit_enabled
            .then(|| ClientRateLimiter::new(config.rate_limit_requests));

        Ok(Self {
            config,
            provider,
            provider_error,
            rate_limiter,
            token_counter,
            start_time: Instant::now(),
        })
    }

    /// The provider, or the configuration error explaining its absence
    pub fn provider(&self) -> AppResult<&Arc<dyn ChatProvider>> {
        self.provider.as_ref().ok_or_else(|| {
            AppError::Configuration(format!(
                "Service not initialized: {}",
                self.provider_error
                    .as_deref()
                    .unwrap_or("provider unavailable")
            ))
        })
    }
}
