//! AI-assisted HTML adapter.
//!
//! For career pages without a structured feed: fetch the page (optionally
//! through a rendering collaborator), reduce the HTML to a text excerpt
//! that keeps anchor targets, and ask the LLM collaborator for a job list.
//! The model's answer is untrusted; anything that fails strict validation
//! becomes `ExtractionFailed` at the adapter boundary, never a crash.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::{drop_malformed, FetchError, JobAdapter, RawCandidate};
use crate::llm::{LlmClient, LlmError};
use crate::models::Source;
use crate::render::PageRenderer;

/// Adapter for LLM-extracted career pages.
pub struct AiHtmlAdapter {
    source: Source,
    page_url: Url,
    renderer: Arc<dyn PageRenderer>,
    llm: Arc<LlmClient>,
}

impl AiHtmlAdapter {
    pub fn new(
        source: Source,
        renderer: Arc<dyn PageRenderer>,
        llm: Arc<LlmClient>,
    ) -> Result<Self, FetchError> {
        let raw = source.config_str("url").ok_or_else(|| {
            FetchError::InvalidConfig("missing 'url' for ai-assisted-html source".into())
        })?;
        let page_url = Url::parse(raw)
            .map_err(|e| FetchError::InvalidConfig(format!("bad page url '{}': {}", raw, e)))?;

        Ok(Self {
            source,
            page_url,
            renderer,
            llm,
        })
    }
}

#[async_trait]
impl JobAdapter for AiHtmlAdapter {
    async fn fetch(&self) -> Result<Vec<RawCandidate>, FetchError> {
        let wait_selector = self.source.config_str("wait_selector");
        let html = self
            .renderer
            .fetch_html(self.page_url.as_str(), wait_selector)
            .await?;

        let text = page_excerpt(&html);
        if text.trim().is_empty() {
            debug!("{}: page produced no text content", self.source.id);
            return Ok(Vec::new());
        }

        let extracted = self.llm.extract_jobs(&text).await.map_err(|e| match e {
            LlmError::Parse(msg) => FetchError::ExtractionFailed(msg),
            other => FetchError::ExtractionFailed(other.to_string()),
        })?;

        let candidates = extracted
            .into_iter()
            .filter_map(|job| {
                // The model may report hrefs as they appear in the page.
                let url = self.page_url.join(job.url.trim()).ok()?;
                Some(RawCandidate {
                    title: job.title,
                    url: url.to_string(),
                    location: job.location,
                    description: job.description,
                    posted_at: None,
                })
            })
            .collect();

        Ok(drop_malformed(&self.source.id, candidates))
    }
}

/// Reduce page HTML to the text the model needs.
///
/// Script/style content is discarded and each anchor keeps its target as
/// `text [href]`, so the model can report links for the postings it finds.
pub fn page_excerpt(html: &str) -> String {
    let document = Html::parse_document(html);
    let skip = Selector::parse("script, style, noscript, svg").expect("static selector");
    let skipped: std::collections::HashSet<_> = document
        .select(&skip)
        .flat_map(|el| el.descendants().map(|n| n.id()))
        .collect();

    let anchor = Selector::parse("a[href]").expect("static selector");
    let hrefs: std::collections::HashMap<_, _> = document
        .select(&anchor)
        .filter_map(|el| el.value().attr("href").map(|href| (el.id(), href)))
        .collect();

    let mut out = String::new();
    for node in document.root_element().descendants() {
        if skipped.contains(&node.id()) {
            continue;
        }
        if let Some(text) = node.value().as_text() {
            let piece = text.trim();
            if !piece.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(piece);
            }
        } else if let Some(element) = node.value().as_element() {
            if element.name() == "a" {
                if let Some(href) = hrefs.get(&node.id()) {
                    // Emitted before the anchor text; close enough for the model.
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&format!("[{}]", href));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_strips_script_and_style() {
        let html = r#"
            <html><head><style>.x{color:red}</style></head>
            <body><script>var x = 1;</script><h1>Open roles</h1>
            <p>Join us.</p></body></html>
        "#;
        let text = page_excerpt(html);
        assert!(text.contains("Open roles"));
        assert!(text.contains("Join us."));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color:red"));
    }

    #[test]
    fn test_excerpt_keeps_anchor_targets() {
        let html = r#"<body><a href="/jobs/1">Platform Engineer</a></body>"#;
        let text = page_excerpt(html);
        assert!(text.contains("[/jobs/1]"));
        assert!(text.contains("Platform Engineer"));
    }

    #[test]
    fn test_excerpt_of_empty_page() {
        assert!(page_excerpt("<html><body></body></html>").trim().is_empty());
    }
}
