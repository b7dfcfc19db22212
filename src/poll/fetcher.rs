use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{COOKIE, ETAG, HeaderMap, HeaderValue, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::config::ServerConfig;

/// Result of one poll request
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Content hasn't changed (304 Not Modified)
    NotModified,
    /// Content was returned
    Fresh {
        payload: Value,
        etag: Option<String>,
    },
    /// The request failed; the loop decides how to react
    Failed(FetchFailure),
}

/// Why a poll request failed
#[derive(Debug, Clone, PartialEq)]
pub enum FetchFailure {
    /// 401: the session has expired
    Unauthorized,
    /// 404: the resource is gone (e.g. a deleted pump)
    NotFound,
    /// Any other non-success status, with the server's message if it sent one
    Status { status: u16, message: Option<String> },
    /// Connection failure or timeout
    Transport { timed_out: bool, detail: String },
    /// A success status whose body is not JSON
    Unparseable { detail: String },
}

impl FetchFailure {
    /// Text shown to the user after "Error: "
    pub fn describe(&self) -> String {
        match self {
            FetchFailure::Status { message: Some(message), .. } => message.clone(),
            FetchFailure::Status { message: None, .. } | FetchFailure::Transport { .. } => {
                "network problem".to_string()
            }
            FetchFailure::Unparseable { .. } => "Bad request".to_string(),
            FetchFailure::Unauthorized => "Please log in again".to_string(),
            FetchFailure::NotFound => "Not found".to_string(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Unauthorized => write!(f, "session expired (401)"),
            FetchFailure::NotFound => write!(f, "resource not found (404)"),
            FetchFailure::Status { status, message } => match message {
                Some(message) => write!(f, "HTTP {}: {}", status, message),
                None => write!(f, "HTTP {}", status),
            },
            FetchFailure::Transport { timed_out: true, detail } => {
                write!(f, "request timed out: {}", detail)
            }
            FetchFailure::Transport { timed_out: false, detail } => {
                write!(f, "connection failed: {}", detail)
            }
            FetchFailure::Unparseable { detail } => write!(f, "invalid JSON: {}", detail),
        }
    }
}

/// Something the poll loop can fetch state from
#[async_trait]
pub trait PollSource: Send + Sync {
    /// Fetch the resource, passing the last validation token as a precondition
    async fn fetch(&self, validation_token: Option<&str>) -> FetchOutcome;
}

/// Polls the configured endpoint over HTTP with ETag support
pub struct HttpSource {
    client: Client,
    url: Url,
}

impl HttpSource {
    /// Create a new HTTP source
    pub fn new(server: &ServerConfig, timeout: Duration) -> Result<Self> {
        let url = server.poll_url()?;
        let client = build_client(server, timeout)?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PollSource for HttpSource {
    async fn fetch(&self, validation_token: Option<&str>) -> FetchOutcome {
        tracing::debug!("Polling {}", self.url);

        let mut request = self.client.get(self.url.clone());

        if let Some(token) = validation_token {
            tracing::trace!("Using ETag for conditional request: {}", token);
            request = request.header(IF_NONE_MATCH, token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Poll request failed: {}", e);
                return FetchOutcome::Failed(FetchFailure::Transport {
                    timed_out: e.is_timeout(),
                    detail: e.to_string(),
                });
            }
        };

        let status = response.status();
        match status {
            StatusCode::NOT_MODIFIED => {
                tracing::debug!("State unchanged (304 Not Modified)");
                FetchOutcome::NotModified
            }
            StatusCode::UNAUTHORIZED => FetchOutcome::Failed(FetchFailure::Unauthorized),
            StatusCode::NOT_FOUND => FetchOutcome::Failed(FetchFailure::NotFound),
            status if status.is_success() => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);

                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        return FetchOutcome::Failed(FetchFailure::Transport {
                            timed_out: e.is_timeout(),
                            detail: e.to_string(),
                        });
                    }
                };

                match serde_json::from_str(&body) {
                    Ok(payload) => {
                        tracing::debug!("State downloaded ({} bytes)", body.len());
                        FetchOutcome::Fresh { payload, etag }
                    }
                    Err(e) => FetchOutcome::Failed(FetchFailure::Unparseable {
                        detail: e.to_string(),
                    }),
                }
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!("Server returned {} for {}", status, self.url);
                FetchOutcome::Failed(FetchFailure::Status {
                    status: status.as_u16(),
                    message: server_message(&body),
                })
            }
        }
    }
}

/// Build the HTTP client shared by polling and submissions
pub fn build_client(server: &ServerConfig, timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = &server.session_cookie {
        let value = HeaderValue::from_str(cookie).context("Session cookie is not a valid header value")?;
        headers.insert(COOKIE, value);
    }

    Client::builder()
        .user_agent(format!("webpilot-client/{}", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .context("Failed to create HTTP client")
}

/// Non-empty `message` field of a JSON error body
pub fn server_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .filter(|m| !m.is_empty())
        .map(String::from)
}
