//! notion2api - OpenAI-compatible gateway for Notion AI
//!
//! This is the main entry point for the notion2api server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};

use notion2api::{routes, AppState, Config};

/// How often idle rate limit buckets are dropped
const RATE_LIMIT_GC_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.tracing_directive().into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting notion2api");
    info!(
        models = config.model_map.len(),
        default_model = %config.default_model,
        auth_enabled = config.auth_enabled(),
        rate_limit_enabled = config.rate_limit_enabled,
        rate_limit_per_minute = config.rate_limit_requests,
        max_retries = config.max_retries,
        retry_delay_secs = config.retry_delay.as_secs_f64(),
        "Configuration loaded"
    );

    routes::metrics::init_metrics();

    let state = Arc::new(AppState::new(config.clone())?);

    // Warm the upstream session without holding up startup
    if let Some(provider) = state.provider.clone() {
        tokio::spawn(async move {
            provider.warm_up().await;
        });
    }

    if state.rate_limiter.is_some() {
        let gc_state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_GC_INTERVAL);
            loop {
                interval.tick().await;
                if let Some(limiter) = gc_state.rate_limiter.as_ref() {
                    limiter.retain_recent();
                }
            }
        });
    }

    let app = routes::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("notion2api shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating shutdown");
        }
    }
}
