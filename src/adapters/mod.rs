//! Source adapters for job harvesting.
//!
//! Three fetch strategies share one contract: given a source's config,
//! return the normalized candidate list for that crawl. The orchestrator
//! never looks inside an adapter; it dispatches on `AdapterKind` through
//! the factory and treats the `FetchError` taxonomy uniformly.

mod ai_html;
mod ats;
mod fields;
mod guest_search;
mod http_client;

pub use ai_html::AiHtmlAdapter;
pub use ats::AtsJsonAdapter;
pub use fields::FieldMap;
pub use guest_search::GuestSearchAdapter;
pub use http_client::HttpClient;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::CrawlConfig;
use crate::llm::LlmClient;
use crate::models::{AdapterKind, Source};
use crate::render::PageRenderer;

/// Source-level fetch failures.
///
/// All of these are caught at the adapter-invocation boundary in the
/// orchestrator and recorded as per-source outcomes; none abort a run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("fetch timed out")]
    Timeout,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("invalid adapter config: {0}")]
    InvalidConfig(String),
}

/// One fetched posting before reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    /// Required, non-empty.
    pub title: String,
    /// Required, absolute.
    pub url: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl RawCandidate {
    /// Required-field check: non-empty title and an absolute URL.
    pub fn is_well_formed(&self) -> bool {
        if self.title.trim().is_empty() {
            return false;
        }
        Url::parse(&self.url)
            .map(|u| u.has_host())
            .unwrap_or(false)
    }
}

/// Drop candidates missing required fields rather than propagate partial data.
pub fn drop_malformed(source_id: &str, candidates: Vec<RawCandidate>) -> Vec<RawCandidate> {
    let before = candidates.len();
    let kept: Vec<RawCandidate> = candidates
        .into_iter()
        .filter(RawCandidate::is_well_formed)
        .collect();
    if kept.len() < before {
        debug!(
            "Dropped {} malformed candidates from {}",
            before - kept.len(),
            source_id
        );
    }
    kept
}

/// Capability shared by all fetch strategies.
#[async_trait]
pub trait JobAdapter: Send + Sync {
    /// Fetch the current candidate list for the source.
    async fn fetch(&self) -> Result<Vec<RawCandidate>, FetchError>;
}

/// Builds the adapter for a source; the seam tests use to inject stubs.
pub trait AdapterFactory: Send + Sync {
    fn build(&self, source: &Source) -> Result<Box<dyn JobAdapter>, FetchError>;
}

/// Production factory wiring real HTTP, rendering, and LLM collaborators.
pub struct DefaultAdapterFactory {
    crawl: CrawlConfig,
    renderer: Arc<dyn PageRenderer>,
    llm: Arc<LlmClient>,
}

impl DefaultAdapterFactory {
    pub fn new(crawl: CrawlConfig, renderer: Arc<dyn PageRenderer>, llm: Arc<LlmClient>) -> Self {
        Self {
            crawl,
            renderer,
            llm,
        }
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn build(&self, source: &Source) -> Result<Box<dyn JobAdapter>, FetchError> {
        let client = HttpClient::new(self.crawl.source_timeout(), self.crawl.request_delay());
        match source.kind {
            AdapterKind::AtsJson => Ok(Box::new(AtsJsonAdapter::new(source.clone(), client)?)),
            AdapterKind::GuestSearch => Ok(Box::new(GuestSearchAdapter::new(
                source.clone(),
                client,
                self.crawl.max_pages,
            )?)),
            AdapterKind::AiAssistedHtml => Ok(Box::new(AiHtmlAdapter::new(
                source.clone(),
                self.renderer.clone(),
                self.llm.clone(),
            )?)),
        }
    }
}
