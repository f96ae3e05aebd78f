//! HTTP client shared by the network-backed adapters.
//!
//! Thin wrapper over reqwest that owns the user agent, per-request timeout,
//! a fixed pacing delay between consecutive requests, and the mapping from
//! transport/HTTP failures onto the `FetchError` taxonomy.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::debug;

use super::FetchError;

/// Default user agent sent with every request.
pub const USER_AGENT: &str = concat!("jobscout/", env!("CARGO_PKG_VERSION"));

/// Paced HTTP client for one source.
pub struct HttpClient {
    client: Client,
    request_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpClient {
    /// Create a client with the given per-request timeout and pacing delay.
    pub fn new(timeout: Duration, request_delay: Duration) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .unwrap_or_default();

        Self {
            client,
            request_delay,
            last_request: Mutex::new(None),
        }
    }

    /// Sleep out the pacing delay since the previous request, if any.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.request_delay {
                let wait = self.request_delay - elapsed;
                debug!("Pacing request: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.pace().await;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::SourceUnreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            return Err(FetchError::RateLimited(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(FetchError::SourceUnreachable(format!("HTTP {}", status)));
        }

        Ok(response)
    }

    /// GET a URL and parse the body as JSON.
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let response = self.get(url).await?;
        response
            .json()
            .await
            .map_err(|e| FetchError::SourceUnreachable(format!("non-JSON response: {}", e)))
    }

    /// GET a URL and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::SourceUnreachable(e.to_string()))
    }
}
