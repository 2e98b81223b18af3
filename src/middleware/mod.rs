//! Request guards for the `/v1` API
//!
//! `auth` checks the bearer token against `API_MASTER_KEY`; `rate_limiter`
//! throttles chat completions per client address.

pub mod auth;
pub mod rate_limiter;
