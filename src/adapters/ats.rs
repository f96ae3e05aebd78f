//! ATS JSON adapter.
//!
//! Fetches a structured board endpoint and parses it straight into
//! candidates. Vendor shapes are a closed set selected by the `vendor`
//! config key; adding an ATS means adding a variant here, not a new code
//! path in the orchestrator.

use async_trait::async_trait;

use super::fields::{parse_flexible_datetime, FieldMap};
use super::{drop_malformed, FetchError, HttpClient, JobAdapter, RawCandidate};
use crate::models::Source;

/// Known board API shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vendor {
    Greenhouse,
    Lever,
    /// Arbitrary JSON endpoint described by a field mapping.
    Generic,
}

impl Vendor {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "greenhouse" => Some(Self::Greenhouse),
            "lever" => Some(Self::Lever),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }
}

/// Adapter for structured ATS endpoints.
pub struct AtsJsonAdapter {
    source: Source,
    client: HttpClient,
    vendor: Vendor,
    endpoint: String,
}

impl AtsJsonAdapter {
    pub fn new(source: Source, client: HttpClient) -> Result<Self, FetchError> {
        let vendor_key = source.config_str("vendor").unwrap_or("generic");
        let vendor = Vendor::from_str(vendor_key).ok_or_else(|| {
            FetchError::InvalidConfig(format!("unknown ATS vendor '{}'", vendor_key))
        })?;

        let endpoint = match vendor {
            Vendor::Greenhouse => {
                let slug = require(&source, "slug")?;
                format!("https://boards-api.greenhouse.io/v1/boards/{}/jobs?content=true", slug)
            }
            Vendor::Lever => {
                let slug = require(&source, "slug")?;
                format!("https://api.lever.co/v0/postings/{}?mode=json", slug)
            }
            Vendor::Generic => require(&source, "url")?.to_string(),
        };

        Ok(Self {
            source,
            client,
            vendor,
            endpoint,
        })
    }
}

fn require<'a>(source: &'a Source, key: &str) -> Result<&'a str, FetchError> {
    source
        .config_str(key)
        .ok_or_else(|| FetchError::InvalidConfig(format!("missing '{}' for ats-json source", key)))
}

#[async_trait]
impl JobAdapter for AtsJsonAdapter {
    async fn fetch(&self) -> Result<Vec<RawCandidate>, FetchError> {
        let body = self.client.get_json(&self.endpoint).await?;
        let candidates = match self.vendor {
            Vendor::Greenhouse => parse_greenhouse(&body),
            Vendor::Lever => parse_lever(&body),
            Vendor::Generic => parse_generic(&body, &FieldMap::from_config(&self.source.config)),
        };
        Ok(drop_malformed(&self.source.id, candidates))
    }
}

/// Greenhouse board API: `{"jobs": [{"title", "absolute_url", ...}]}`.
fn parse_greenhouse(body: &serde_json::Value) -> Vec<RawCandidate> {
    let Some(jobs) = body.get("jobs").and_then(|j| j.as_array()) else {
        return Vec::new();
    };

    jobs.iter()
        .filter_map(|job| {
            Some(RawCandidate {
                title: job.get("title")?.as_str()?.to_string(),
                url: job.get("absolute_url")?.as_str()?.to_string(),
                location: job
                    .get("location")
                    .and_then(|l| l.get("name"))
                    .and_then(|n| n.as_str())
                    .map(|s| s.to_string()),
                description: job
                    .get("content")
                    .and_then(|c| c.as_str())
                    .map(|s| s.to_string()),
                posted_at: job
                    .get("first_published")
                    .or_else(|| job.get("updated_at"))
                    .and_then(parse_flexible_datetime),
            })
        })
        .collect()
}

/// Lever postings API: a top-level array of `{"text", "hostedUrl", ...}`.
fn parse_lever(body: &serde_json::Value) -> Vec<RawCandidate> {
    let Some(postings) = body.as_array() else {
        return Vec::new();
    };

    postings
        .iter()
        .filter_map(|posting| {
            Some(RawCandidate {
                title: posting.get("text")?.as_str()?.to_string(),
                url: posting.get("hostedUrl")?.as_str()?.to_string(),
                location: posting
                    .get("categories")
                    .and_then(|c| c.get("location"))
                    .and_then(|l| l.as_str())
                    .map(|s| s.to_string()),
                description: posting
                    .get("descriptionPlain")
                    .and_then(|d| d.as_str())
                    .map(|s| s.to_string()),
                posted_at: posting.get("createdAt").and_then(parse_flexible_datetime),
            })
        })
        .collect()
}

fn parse_generic(body: &serde_json::Value, map: &FieldMap) -> Vec<RawCandidate> {
    map.items(body)
        .map(|items| items.iter().filter_map(|item| map.candidate(item)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_greenhouse_shape() {
        let body = serde_json::json!({
            "jobs": [
                {
                    "title": "Platform Engineer",
                    "absolute_url": "https://boards.greenhouse.io/acme/jobs/123",
                    "location": {"name": "Berlin"},
                    "updated_at": "2026-08-01T09:00:00Z"
                },
                {"title": "No URL"}
            ]
        });
        let jobs = parse_greenhouse(&body);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].location.as_deref(), Some("Berlin"));
        assert!(jobs[0].posted_at.is_some());
    }

    #[test]
    fn test_parse_lever_shape() {
        let body = serde_json::json!([
            {
                "text": "Backend Engineer",
                "hostedUrl": "https://jobs.lever.co/acme/abc",
                "categories": {"location": "Remote"},
                "createdAt": 1735689600000i64
            }
        ]);
        let jobs = parse_lever(&body);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "Backend Engineer");
        assert!(jobs[0].posted_at.is_some());
    }

    #[test]
    fn test_parse_greenhouse_rejects_wrong_shape() {
        assert!(parse_greenhouse(&serde_json::json!({"data": []})).is_empty());
        assert!(parse_lever(&serde_json::json!({"jobs": []})).is_empty());
    }

    #[test]
    fn test_config_validation() {
        let client = HttpClient::new(
            std::time::Duration::from_secs(5),
            std::time::Duration::ZERO,
        );
        let source = Source::new(
            "acme".into(),
            "Acme".into(),
            crate::models::AdapterKind::AtsJson,
            serde_json::json!({"vendor": "greenhouse"}),
        );
        // Greenhouse without a slug is a config error, not a crash later.
        assert!(matches!(
            AtsJsonAdapter::new(source, client),
            Err(FetchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_vendor_endpoints() {
        let mk = |config: serde_json::Value| {
            let client = HttpClient::new(
                std::time::Duration::from_secs(5),
                std::time::Duration::ZERO,
            );
            AtsJsonAdapter::new(
                Source::new(
                    "acme".into(),
                    "Acme".into(),
                    crate::models::AdapterKind::AtsJson,
                    config,
                ),
                client,
            )
        };
        let gh = mk(serde_json::json!({"vendor": "greenhouse", "slug": "acme"})).unwrap();
        assert!(gh.endpoint.contains("greenhouse.io/v1/boards/acme"));
        let lever = mk(serde_json::json!({"vendor": "lever", "slug": "acme"})).unwrap();
        assert!(lever.endpoint.contains("lever.co/v0/postings/acme"));
        let generic =
            mk(serde_json::json!({"vendor": "generic", "url": "https://acme.co/api/jobs"})).unwrap();
        assert_eq!(generic.endpoint, "https://acme.co/api/jobs");
    }
}
