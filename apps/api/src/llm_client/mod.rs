/// LLM Client: the single point of entry for all assistant-provider calls.
///
/// ARCHITECTURAL RULE: No other module may call the provider API directly.
/// All provider interactions MUST go through this module.
///
/// Model: gpt-4o (hardcoded, do not make configurable to prevent drift)
use std::future::Future;
use std::time::Duration;

use reqwest::{header::HeaderMap, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

pub mod assistants;

/// The model every assistant is created with.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "gpt-4o";
const ASSISTANTS_BETA: &str = "assistants=v2";
const POLL_AFTER_HEADER: &str = "openai-poll-after-ms";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("gave up waiting for {what} after {secs}s")]
    PollTimeout { what: String, secs: u64 },

    #[error("{0}")]
    RunFailed(String),

    #[error("{0}")]
    IndexingFailed(String),

    #[error("assistant returned no text reply")]
    EmptyContent,

    #[error("failed to read résumé file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// The single provider client used by the cover-letter generator.
/// Wraps the Assistants v2 REST API with polling helpers. No retries.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl LlmClient {
    pub fn new(
        api_key: String,
        base_url: &str,
        poll_interval: Duration,
        poll_timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval,
            poll_timeout,
        })
    }

    /// Builds an authenticated request against `path` (relative to the base URL).
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA)
    }

    /// Sends the request and deserializes a successful JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, LlmError> {
        self.send_with_headers(request).await.map(|(body, _)| body)
    }

    /// Like `send`, but also hands back the response headers (poll hints live there).
    async fn send_with_headers<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<(T, HeaderMap), LlmError> {
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            // Try to parse error message
            let message = serde_json::from_str::<ProviderError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed = serde_json::from_str(&body)?;
        Ok((parsed, headers))
    }

    /// Re-fetches a resource until `is_done` holds or the poll timeout elapses.
    ///
    /// Sleeps for the provider's `openai-poll-after-ms` hint when present,
    /// otherwise for the configured interval.
    async fn poll_until<T, F, Fut>(
        &self,
        what: &str,
        mut fetch: F,
        is_done: impl Fn(&T) -> bool,
    ) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(T, HeaderMap), LlmError>>,
    {
        let deadline = Instant::now() + self.poll_timeout;

        loop {
            let (item, headers) = fetch().await?;
            if is_done(&item) {
                return Ok(item);
            }
            if Instant::now() >= deadline {
                return Err(LlmError::PollTimeout {
                    what: what.to_string(),
                    secs: self.poll_timeout.as_secs(),
                });
            }

            let delay = poll_hint(&headers).unwrap_or(self.poll_interval);
            debug!("{what} not finished, polling again in {}ms", delay.as_millis());
            tokio::time::sleep(delay).await;
        }
    }
}

fn poll_hint(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(POLL_AFTER_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_millis)
}
