//! Rendered-page fetch collaborator.
//!
//! JS-heavy career pages need a real browser to produce meaningful HTML.
//! That capability is a collaborator behind `PageRenderer`: the default
//! implementation is a plain HTTP GET, and a headless-browser engine can be
//! plugged in behind the same trait without touching the adapters.

use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::{FetchError, HttpClient};

/// Fetches the HTML of a page, optionally waiting for dynamic content.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Fetch the page HTML. `wait_selector` is a CSS selector a rendering
    /// implementation should wait for before snapshotting; non-rendering
    /// implementations may ignore it.
    async fn fetch_html(&self, url: &str, wait_selector: Option<&str>)
        -> Result<String, FetchError>;
}

/// Plain HTTP renderer: no JavaScript execution.
pub struct HttpRenderer {
    client: HttpClient,
}

impl HttpRenderer {
    pub fn new(timeout: Duration, request_delay: Duration) -> Self {
        Self {
            client: HttpClient::new(timeout, request_delay),
        }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn fetch_html(
        &self,
        url: &str,
        _wait_selector: Option<&str>,
    ) -> Result<String, FetchError> {
        self.client.get_text(url).await
    }
}
