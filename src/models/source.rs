//! Source models for crawlable job origins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fetch strategy used for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    /// Structured JSON endpoint of an applicant tracking system.
    AtsJson,
    /// Paginated public search endpoint queried as a guest.
    GuestSearch,
    /// Career page scraped via LLM-assisted HTML extraction.
    AiAssistedHtml,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AtsJson => "ats-json",
            Self::GuestSearch => "guest-search",
            Self::AiAssistedHtml => "ai-assisted-html",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ats-json" => Some(Self::AtsJson),
            "guest-search" => Some(Self::GuestSearch),
            "ai-assisted-html" => Some(Self::AiAssistedHtml),
            _ => None,
        }
    }
}

/// One crawlable origin: a company's ATS feed, a search board, or a career page.
///
/// The adapter config is an opaque key-value map; which keys are meaningful
/// is decided by the adapter selected through `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Unique identifier for this source.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Which adapter fetches this source.
    pub kind: AdapterKind,
    /// Adapter-specific configuration.
    pub config: serde_json::Value,
    /// Inactive sources are never scheduled.
    pub active: bool,
    /// Crawls in a row that produced no candidates.
    pub consecutive_empty: u32,
    /// Failed crawls in a row (unreachable or timed out).
    pub consecutive_failures: u32,
    /// Success rate over the health window, 0.0..=1.0.
    pub success_rate: f64,
    /// Scheduling priority derived by the health tracker.
    pub priority_score: f64,
    /// When the source was added.
    pub created_at: DateTime<Utc>,
    /// When the source was last crawled.
    pub last_crawled: Option<DateTime<Utc>>,
}

impl Source {
    /// Create a new active source with neutral health.
    pub fn new(id: String, name: String, kind: AdapterKind, config: serde_json::Value) -> Self {
        Self {
            id,
            name,
            kind,
            config,
            active: true,
            consecutive_empty: 0,
            consecutive_failures: 0,
            success_rate: 0.0,
            priority_score: 1.0,
            created_at: Utc::now(),
            last_crawled: None,
        }
    }

    /// Look up a string value in the adapter config.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Look up a boolean value in the adapter config.
    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(|v| v.as_bool())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_kind_round_trip() {
        for kind in [
            AdapterKind::AtsJson,
            AdapterKind::GuestSearch,
            AdapterKind::AiAssistedHtml,
        ] {
            assert_eq!(AdapterKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(AdapterKind::from_str("rss"), None);
    }

    #[test]
    fn test_config_lookup() {
        let source = Source::new(
            "acme".into(),
            "Acme Corp".into(),
            AdapterKind::AtsJson,
            serde_json::json!({"vendor": "greenhouse", "slug": "acme", "render": true}),
        );
        assert_eq!(source.config_str("vendor"), Some("greenhouse"));
        assert_eq!(source.config_str("missing"), None);
        assert_eq!(source.config_bool("render"), Some(true));
    }
}
