//! LLM client for extracting job listings from career-page text.
//!
//! Supports Ollama API for local LLM inference. The model's output is an
//! untrusted external input: it is parsed against a strict schema and any
//! deviation surfaces as `LlmError::Parse`, never a panic.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default prompt for extracting a structured job list from page text.
pub const DEFAULT_EXTRACT_PROMPT: &str = r#"You are extracting job openings from the text of a company careers page.

Find every open position listed in the text. For each one, report:
- "title": the job title exactly as written
- "url": the link to the posting (absolute or relative, as it appears)
- "location": the location if stated, otherwise null
- "description": a short snippet of the role description if present, otherwise null

Page text:
{content}

Respond with ONLY a JSON array of objects with those four keys. No markdown, no commentary. If no jobs are listed, respond with []."#;

/// Configuration for the LLM client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether AI-assisted extraction is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Ollama API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model used for extraction.
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in the response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Custom extraction prompt (uses a {content} placeholder).
    #[serde(default)]
    pub extract_prompt: Option<String>,
    /// Maximum characters of page text sent to the model.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_enabled() -> bool {
    true
}
fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.2:3b-instruct-q5_K_M".to_string()
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_content_chars() -> usize {
    24000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            extract_prompt: None,
            max_content_chars: default_max_content_chars(),
        }
    }
}

impl LlmConfig {
    /// Get the extraction prompt, custom or default.
    pub fn get_extract_prompt(&self) -> &str {
        self.extract_prompt.as_deref().unwrap_or(DEFAULT_EXTRACT_PROMPT)
    }
}

/// One job listing as reported by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedJob {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("unparseable model response: {0}")]
    Parse(String),

    #[error("LLM extraction is disabled")]
    Disabled,
}

/// LLM client for job extraction.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // slow local models
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the LLM service is available.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Extract the job list from career-page text.
    ///
    /// The text is truncated to the configured character budget before being
    /// sent. Returns `Parse` if the response is not the expected JSON array.
    pub async fn extract_jobs(&self, text: &str) -> Result<Vec<ExtractedJob>, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let excerpt = truncate_utf8(text, self.config.max_content_chars);
        let prompt = self.config.get_extract_prompt().replace("{content}", excerpt);

        debug!("Extracting jobs from {} chars of page text", excerpt.len());
        let response = self.call_ollama(&prompt).await?;
        parse_job_array(&response)
    }

    /// Call Ollama API with a prompt.
    async fn call_ollama(&self, prompt: &str) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }
}

/// Truncate text to a byte budget at a valid UTF-8 boundary.
pub fn truncate_utf8(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Parse a model response into the expected job array.
///
/// Tolerates markdown fences and prose around the array, but the array
/// itself must validate against the schema.
fn parse_job_array(response: &str) -> Result<Vec<ExtractedJob>, LlmError> {
    let trimmed = response.trim();

    // Models often wrap output in ```json fences despite instructions.
    let start = trimmed.find('[');
    let end = trimmed.rfind(']');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &trimmed[s..=e],
        _ => {
            return Err(LlmError::Parse(format!(
                "no JSON array in response: {}",
                truncate_utf8(trimmed, 120)
            )))
        }
    };

    serde_json::from_str::<Vec<ExtractedJob>>(body)
        .map_err(|e| LlmError::Parse(format!("schema mismatch: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let jobs = parse_job_array(
            r#"[{"title": "Engineer", "url": "/jobs/1", "location": "Remote", "description": null}]"#,
        )
        .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "Engineer");
        assert_eq!(jobs[0].location.as_deref(), Some("Remote"));
    }

    #[test]
    fn test_parse_fenced_array() {
        let jobs = parse_job_array(
            "Here you go:\n```json\n[{\"title\": \"SRE\", \"url\": \"https://a.co/1\"}]\n```",
        )
        .unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].location.is_none());
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_job_array("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(matches!(
            parse_job_array("I could not find any jobs on this page."),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(matches!(
            parse_job_array(r#"[{"position": "Engineer"}]"#),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn test_truncate_utf8_boundary() {
        let s = "héllo wörld";
        let cut = truncate_utf8(s, 2);
        assert!(cut.len() <= 2);
        assert!(s.starts_with(cut));
        assert_eq!(truncate_utf8("short", 100), "short");
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert!(config.enabled);
        assert!(config.get_extract_prompt().contains("{content}"));
    }
}
