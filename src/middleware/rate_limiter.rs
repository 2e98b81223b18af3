//! Rate limiting middleware
//!
//! Keyed token bucket (`governor`) allowing `RATE_LIMIT_REQUESTS` requests
//! per minute per client address. State lives in memory, so limits are per
//! process.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use nonzero_ext::nonzero;
use tracing::{debug, warn};

use crate::{error::AppError, AppState};

/// Per-client request limiter
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    requests_per_minute: u32,
}

impl ClientRateLimiter {
    /// Create a limiter allowing `requests_per_minute` per client (at least 1)
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(nonzero!(1u32));
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
            requests_per_minute: per_minute.get(),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Take one request from `client`'s bucket.
    ///
    /// On rejection returns the whole seconds until the next request is allowed.
    pub fn check(&self, client: &str) -> Result<(), u64> {
        self.limiter.check_key(&client.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
        })
    }

    /// Drop buckets that have fully refilled
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}

/// Client identity used as the bucket key
pub fn client_key(peer: Option<SocketAddr>, headers: &HeaderMap) -> String {
    if let Some(addr) = peer {
        return addr.ip().to_string();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .and_then(|v| v.parse::<IpAddr>().ok())
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return Ok(next.run(request).await);
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(peer, request.headers());

    match limiter.check(&client) {
        Ok(()) => {
            debug!(client = %client, "Rate limit check passed");
            Ok(next.run(request).await)
        }
        Err(retry_after) => {
            warn!(
                client = %client,
                limit = limiter.requests_per_minute(),
                retry_after,
                "Rate limit exceeded"
            );
            Err(AppError::rate_limited(
                format!(
                    "Rate limit exceeded: {} requests per minute",
                    limiter.requests_per_minute()
                ),
                Some(retry_after.max(1)),
            ))
        }
    }
}
