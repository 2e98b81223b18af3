//! Upstream session management
//!
//! One authenticated session is shared by every request: a pooled
//! `reqwest::Client`, the cookie and identity headers Notion's web client
//! sends, and the endpoint URLs. The session is warmed with a plain page
//! load once; a failed warm-up is logged and retried lazily on the next call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::http::StatusCode;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, USER_AGENT};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

const WARM_UP_TIMEOUT: Duration = Duration::from_secs(30);
const THREAD_CREATION_TIMEOUT: Duration = Duration::from_secs(20);

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// Kind of upstream conversation thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadType {
    Workflow,
    /// Used by the Gemini (`vertex-*`) models
    MarkdownChat,
}

impl ThreadType {
    pub fn for_model(upstream_model: &str) -> Self {
        if upstream_model.starts_with("vertex-") {
            ThreadType::MarkdownChat
        } else {
            ThreadType::Workflow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadType::Workflow => "workflow",
            ThreadType::MarkdownChat => "markdown-chat",
        }
    }
}

/// Per-request upstream conversation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamThread {
    pub id: String,
    pub thread_type: ThreadType,
}

/// Who the session acts as
#[derive(Debug, Clone)]
pub struct NotionIdentity {
    pub space_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub block_id: Option<String>,
    pub timezone: String,
}

/// Authenticated upstream handle shared by all requests
#[derive(Debug)]
pub struct UpstreamSession {
    client: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
    identity: NotionIdentity,
    thread_timeout: Duration,
}

impl UpstreamSession {
    pub fn identity(&self) -> &NotionIdentity {
        &self.identity
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/api/v3/{}", self.base_url, name)
    }

    /// Create a new thread for one request
    #[instrument(skip(self), fields(thread_type = thread_type.as_str()))]
    pub async fn create_thread(&self, thread_type: ThreadType) -> AppResult<UpstreamThread> {
        let thread_id = Uuid::new_v4().to_string();
        let space_id = &self.identity.space_id;
        let payload = json!({
            "requestId": Uuid::new_v4().to_string(),
            "transactions": [{
                "id": Uuid::new_v4().to_string(),
                "spaceId": space_id,
                "operations": [{
                    "pointer": {"table": "thread", "id": thread_id, "spaceId": space_id},
                    "path": [],
                    "command": "set",
                    "args": {
                        "id": thread_id,
                        "version": 1,
                        "parent_id": space_id,
                        "parent_table": "space",
                        "space_id": space_id,
                        "created_time": Utc::now().timestamp_millis(),
                        "created_by_id": self.identity.user_id,
                        "created_by_table": "notion_user",
                        "messages": [],
                        "data": {},
                        "alive": true,
                        "type": thread_type.as_str(),
                    }
                }]
            }]
        });

        let response = self
            .client
            .post(self.endpoint("saveTransactionsFanout"))
            .headers(self.headers.clone())
            .timeout(self.thread_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::from_transport(&e, "creating a Notion thread")
                } else {
                    warn!(error = %e, "Thread creation request failed");
                    AppError::ThreadCreation("Failed to create a Notion conversation thread".to_string())
                }
            })?;

        let status = response.status();
        if let Some(error) = AppError::from_upstream_status(status) {
            return Err(error);
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), "Notion refused thread creation");
            return Err(AppError::ThreadCreation(format!(
                "Failed to create a Notion conversation thread (HTTP {})",
                status.as_u16()
            )));
        }

        info!(thread_id = %thread_id, "Created Notion thread");
        Ok(UpstreamThread {
            id: thread_id,
            thread_type,
        })
    }

    /// Start an inference call and return the response once its head arrived.
    ///
    /// `head_timeout` bounds the wait for the status line; `body_timeout`
    /// bounds the whole exchange including reading the body.
    #[instrument(skip(self, payload))]
    pub async fn run_inference(
        &self,
        payload: &Value,
        head_timeout: Duration,
        body_timeout: Duration,
    ) -> AppResult<reqwest::Response> {
        let request = self
            .client
            .post(self.endpoint("runInferenceTranscript"))
            .headers(self.headers.clone())
            .timeout(body_timeout)
            .json(payload)
            .send();

        let response = tokio::time::timeout(head_timeout, request)
            .await
            .map_err(|_| {
                AppError::request(
                    StatusCode::GATEWAY_TIMEOUT,
                    "Timed out waiting for Notion to respond",
                )
            })?
            .map_err(|e| AppError::from_transport(&e, "sending the inference request"))?;

        let status = response.status();
        if let Some(error) = AppError::from_upstream_status(status) {
            return Err(error);
        }
        if !status.is_success() {
            return Err(AppError::request(
                StatusCode::BAD_GATEWAY,
                format!("Notion rejected the inference request (HTTP {})", status.as_u16()),
            ));
        }

        debug!(status = status.as_u16(), "Inference stream opened");
        Ok(response)
    }
}

/// Owner of the shared [`UpstreamSession`]
#[derive(Debug)]
pub struct SessionManager {
    session: UpstreamSession,
    warmed: AtomicBool,
}

impl SessionManager {
    /// Build the session from configuration.
    ///
    /// Fails when the cookie, space id or user id is missing.
    pub fn new(config: &Config) -> AppResult<Self> {
        let (Some(cookie), Some(space_id), Some(user_id)) = (
            config.notion_cookie.as_deref(),
            config.notion_space_id.as_deref(),
            config.notion_user_id.as_deref(),
        ) else {
            return Err(AppError::Configuration(
                "NOTION_COOKIE, NOTION_SPACE_ID and NOTION_USER_ID must all be set".to_string(),
            ));
        };

        let headers = session_headers(config, cookie, space_id, user_id)?;

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            session: UpstreamSession {
                client,
                headers,
                base_url: config.notion_base_url.clone(),
                identity: NotionIdentity {
                    space_id: space_id.to_string(),
                    user_id: user_id.to_string(),
                    user_name: config.notion_user_name.clone(),
                    user_email: config.notion_user_email.clone(),
                    block_id: config.notion_block_id.clone(),
                    timezone: config.notion_timezone.clone(),
                },
                thread_timeout: THREAD_CREATION_TIMEOUT,
            },
            warmed: AtomicBool::new(false),
        })
    }

    pub fn is_warmed(&self) -> bool {
        self.warmed.load(Ordering::Acquire)
    }

    /// Return the shared session, warming it first if that has not succeeded yet
    pub async fn ensure_session(&self) -> &UpstreamSession {
        if !self.is_warmed() {
            self.warm_up().await;
        }
        &self.session
    }

    /// Best-effort page load to establish the session. Never fails.
    pub async fn warm_up(&self) -> bool {
        let mut headers = self.session.headers.clone();
        headers.remove(ACCEPT);

        let result = self
            .session
            .client
            .get(format!("{}/", self.session.base_url))
            .headers(headers)
            .timeout(WARM_UP_TIMEOUT)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => {
                self.warmed.store(true, Ordering::Release);
                info!("Notion session warmed up");
                true
            }
            Err(e) => {
                warn!(error = %e.without_url(), "Notion session warm-up failed, continuing");
                false
            }
        }
    }
}

fn header_value(name: &str, value: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| AppError::Configuration(format!("{name} contains characters not allowed in an HTTP header")))
}

fn session_headers(config: &Config, cookie: &str, space_id: &str, user_id: &str) -> AppResult<HeaderMap> {
    let cookie = cookie.trim();
    let cookie = if cookie.contains('=') {
        cookie.to_string()
    } else {
        format!("token_v2={cookie}")
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/x-ndjson"));
    headers.insert(COOKIE, header_value("NOTION_COOKIE", &cookie)?);
    headers.insert(
        HeaderName::from_static("x-notion-space-id"),
        header_value("NOTION_SPACE_ID", space_id)?,
    );
    headers.insert(
        HeaderName::from_static("x-notion-active-user-header"),
        header_value("NOTION_USER_ID", user_id)?,
    );
    headers.insert(
        HeaderName::from_static("x-notion-client-version"),
        header_value("NOTION_CLIENT_VERSION", &config.notion_client_version)?,
    );
    headers.insert(
        HeaderName::from_static("notion-audit-log-platform"),
        HeaderValue::from_static("web"),
    );
    headers.insert(ORIGIN, header_value("NOTION_BASE_URL", &config.notion_base_url)?);
    headers.insert(
        REFERER,
        header_value("NOTION_BASE_URL", &format!("{}/", config.notion_base_url))?,
    );
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

    Ok(headers)
}
