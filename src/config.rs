//! Configuration management for notion2api
//!
//! Configuration is loaded from environment variables (a `.env` file is read
//! by `main` before this runs).

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

/// Alias table shipped with the binary. Order is the order `/v1/models` lists them in.
const DEFAULT_MODEL_MAP: &[(&str, &str)] = &[
    ("claude-sonnet-4.5", "anthropic-sonnet-alt"),
    ("gpt-5", "openai-turbo"),
    ("claude-opus-4.1", "anthropic-opus-4.1"),
    ("gemini-2.5-flash", "vertex-gemini-2.5-flash"),
    ("gemini-2.5-pro", "vertex-gemini-2.5-pro"),
    ("gpt-4.1", "openai-gpt-4.1"),
];

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// One entry of the client-facing model alias table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAlias {
    /// Name clients send in `model`
    pub alias: String,
    /// Identifier the upstream inference API expects
    pub upstream: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Log level name (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    pub log_level: String,

    /// Master key clients must present as a bearer token.
    /// `None` (or the literal "1") disables the check.
    pub api_master_key: Option<String>,

    /// Notion `token_v2` cookie, or a full cookie header
    pub notion_cookie: Option<String>,
    /// Notion workspace (space) id
    pub notion_space_id: Option<String>,
    /// Notion user id
    pub notion_user_id: Option<String>,
    pub notion_user_name: Option<String>,
    pub notion_user_email: Option<String>,
    /// Default block id placed in the inference context
    pub notion_block_id: Option<String>,
    pub notion_client_version: String,
    /// Base URL of the upstream web app
    pub notion_base_url: String,
    /// Timezone reported in the inference context
    pub notion_timezone: String,

    /// Bound on waiting for the inference response head
    pub api_request_timeout: Duration,
    /// Bound on reading the whole inference body
    pub stream_read_timeout: Duration,

    pub rate_limit_enabled: bool,
    /// Requests per minute per client address
    pub rate_limit_requests: u32,

    /// Reserved: the adapter never retries on its own
    pub max_retries: u32,
    /// Reserved: the adapter never retries on its own
    pub retry_delay: Duration,

    /// Model used when a request omits `model`
    pub default_model: String,
    /// Client alias to upstream model table
    pub model_map: Vec<ModelAlias>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// `from_env` is this with the process environment; tests pass a map so
    /// they never touch shared process state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let log_level = get_or("LOG_LEVEL", "INFO").trim().to_uppercase();
        if !VALID_LOG_LEVELS.contains(&log_level.as_str()) {
            bail!(
                "LOG_LEVEL must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            );
        }

        let model_map = match get("MODEL_MAP") {
            Some(raw) => parse_model_map(&raw)?,
            None => DEFAULT_MODEL_MAP
                .iter()
                .map(|(alias, upstream)| ModelAlias {
                    alias: alias.to_string(),
                    upstream: upstream.to_string(),
                })
                .collect(),
        };

        Ok(Self {
            host: get_or("HOST", "0.0.0.0"),
            port: get_or("PORT", "8088").parse().context("Invalid PORT")?,
            log_level,

            api_master_key: get("API_MASTER_KEY"),

            notion_cookie: get("NOTION_COOKIE"),
            notion_space_id: get("NOTION_SPACE_ID"),
            notion_user_id: get("NOTION_USER_ID"),
            notion_user_name: get("NOTION_USER_NAME"),
            notion_user_email: get("NOTION_USER_EMAIL"),
            notion_block_id: get("NOTION_BLOCK_ID"),
            notion_client_version: get_or("NOTION_CLIENT_VERSION", "23.13.20251011.2037"),
            notion_base_url: get_or("NOTION_BASE_URL", "https://www.notion.so")
                .trim_end_matches('/')
                .to_string(),
            notion_timezone: get_or("NOTION_TIMEZONE", "Asia/Shanghai"),

            api_request_timeout: Duration::from_secs(
                get_or("API_REQUEST_TIMEOUT", "300")
                    .parse()
                    .context("Invalid API_REQUEST_TIMEOUT")?,
            ),
            stream_read_timeout: Duration::from_secs(
                get_or("STREAM_READ_TIMEOUT", "600")
                    .parse()
                    .context("Invalid STREAM_READ_TIMEOUT")?,
            ),

            rate_limit_enabled: get("RATE_LIMIT_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            rate_limit_requests: get_or("RATE_LIMIT_REQUESTS", "10")
                .parse()
                .context("Invalid RATE_LIMIT_REQUESTS")?,

            max_retries: get_or("MAX_RETRIES", "3")
                .parse()
                .context("Invalid MAX_RETRIES")?,
            retry_delay: Duration::from_secs_f64(
                get_or("RETRY_DELAY", "1.0")
                    .parse()
                    .context("Invalid RETRY_DELAY")?,
            ),

            default_model: get_or("DEFAULT_MODEL", "claude-sonnet-4.5"),
            model_map,
        })
    }

    /// Resolve a client model alias to the upstream identifier
    pub fn resolve_model(&self, alias: &str) -> Option<&str> {
        self.model_map
            .iter()
            .find(|entry| entry.alias == alias)
            .map(|entry| entry.upstream.as_str())
    }

    /// Whether clients must present `API_MASTER_KEY`
    pub fn auth_enabled(&self) -> bool {
        matches!(self.api_master_key.as_deref(), Some(key) if key != "1")
    }

    /// Default `tracing` filter directive derived from `LOG_LEVEL`
    pub fn tracing_directive(&self) -> String {
        let level = match self.log_level.as_str() {
            "DEBUG" => "debug",
            "WARNING" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        };
        format!("notion2api={level},tower_http={level}")
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Parse `alias=upstream,alias=upstream`
fn parse_model_map(raw: &str) -> Result<Vec<ModelAlias>> {
    let mut entries = Vec::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (alias, upstream) = pair
            .split_once('=')
            .with_context(|| format!("Invalid MODEL_MAP entry '{pair}', expected alias=upstream"))?;
        let (alias, upstream) = (alias.trim(), upstream.trim());
        if alias.is_empty() || upstream.is_empty() {
            bail!("Invalid MODEL_MAP entry '{pair}', expected alias=upstream");
        }
        entries.push(ModelAlias {
            alias: alias.to_string(),
            upstream: upstream.to_string(),
        });
    }
    if entries.is_empty() {
        bail!("MODEL_MAP must contain at least one alias");
    }
    Ok(entries)
}
