//! Guest-search adapter.
//!
//! Pages through a public search endpoint with query parameters from the
//! source config, stopping on the first empty page or the configured page
//! cap. HTTP 429/403 surfaces as `RateLimited` so the scheduler backs the
//! source off instead of writing it off.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::fields::FieldMap;
use super::{drop_malformed, FetchError, HttpClient, JobAdapter, RawCandidate};
use crate::models::Source;

/// Adapter for paginated guest search endpoints.
pub struct GuestSearchAdapter {
    source: Source,
    client: HttpClient,
    base_url: Url,
    map: FieldMap,
    max_pages: u32,
}

impl GuestSearchAdapter {
    pub fn new(source: Source, client: HttpClient, max_pages: u32) -> Result<Self, FetchError> {
        let raw = source.config_str("url").ok_or_else(|| {
            FetchError::InvalidConfig("missing 'url' for guest-search source".into())
        })?;
        let base_url = Url::parse(raw)
            .map_err(|e| FetchError::InvalidConfig(format!("bad search url '{}': {}", raw, e)))?;
        let map = FieldMap::from_config(&source.config);

        Ok(Self {
            source,
            client,
            base_url,
            map,
            max_pages: max_pages.max(1),
        })
    }

    fn page_url(&self, page: u32) -> Url {
        let param = |key: &str, default: &str| {
            self.source
                .config_str(key)
                .unwrap_or(default)
                .to_string()
        };

        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(query) = self.source.config_str("query") {
                pairs.append_pair(&param("query_param", "q"), query);
            }
            if let Some(location) = self.source.config_str("location") {
                pairs.append_pair(&param("location_param", "location"), location);
            }
            pairs.append_pair(&param("page_param", "page"), &page.to_string());
        }
        url
    }
}

#[async_trait]
impl JobAdapter for GuestSearchAdapter {
    async fn fetch(&self) -> Result<Vec<RawCandidate>, FetchError> {
        let mut all = Vec::new();

        for page in 1..=self.max_pages {
            let url = self.page_url(page);
            let body = self.client.get_json(url.as_str()).await?;

            let page_candidates: Vec<RawCandidate> = self
                .map
                .items(&body)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| self.map.candidate(item))
                        .collect()
                })
                .unwrap_or_default();

            if page_candidates.is_empty() {
                debug!("{}: page {} empty, stopping pagination", self.source.id, page);
                break;
            }

            all.extend(page_candidates);
        }

        Ok(drop_malformed(&self.source.id, all))
    }
}
