//! HTTP client used to fetch resources from the upstream API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

/// Default identifying user agent sent on every request.
pub const USER_AGENT: &str = "pokeapi-spider/1.0 (+https://example.com)";

/// Resolve user agent from config value.
/// - None => default pokeapi-spider user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None | Some("") => USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// Failure to obtain an HTTP response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

/// Status and fully read body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Source of HTTP responses for the ingestor.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue a single GET. No retries happen at this layer.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetcher with a fixed user agent and timeout.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with the default user agent.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_user_agent(timeout, None)
    }

    /// Create a new HTTP client with custom user agent configuration.
    pub fn with_user_agent(
        timeout: Duration,
        user_agent_config: Option<&str>,
    ) -> Result<Self, FetchError> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::Build(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();

        // Body read failures count as transport errors, same as connect failures.
        let body = response.text().await?;

        debug!(
            "GET {} -> {} ({} bytes, {}ms)",
            url,
            status,
            body.len(),
            start.elapsed().as_millis()
        );

        Ok(FetchResponse { status, body })
    }
}
