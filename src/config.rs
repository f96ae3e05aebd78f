//! Configuration loading.
//!
//! Settings come from a TOML file with serde defaults for every field, so a
//! missing file or a partial one is fine. Discovery order: explicit path,
//! `./jobscout.toml`, then the platform config directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::HealthConfig;
use crate::llm::LlmConfig;

/// Crawl orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Bounded worker pool size for adapter fetches.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-source adapter timeout in seconds.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    /// Global wall-time bound for one run, in seconds.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Pagination cap for guest-search sources.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Delay between consecutive requests to the same source.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

fn default_workers() -> usize {
    5
}
fn default_source_timeout_secs() -> u64 {
    45
}
fn default_run_timeout_secs() -> u64 {
    900
}
fn default_max_pages() -> u32 {
    10
}
fn default_request_delay_ms() -> u64 {
    500
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            source_timeout_secs: default_source_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            max_pages: default_max_pages(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl CrawlConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Consecutive crawls a posting may be absent before archival.
    #[serde(default = "default_archive_after_missing")]
    pub archive_after_missing: u32,
}

fn default_archive_after_missing() -> u32 {
    3
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            archive_after_missing: default_archive_after_missing(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("jobscout.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Settings {
    /// Load settings from an explicit path or the discovery chain.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let local = PathBuf::from("jobscout.toml");
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let global = config_dir.join("jobscout").join("config.toml");
            if global.exists() {
                return Self::from_file(&global);
            }
        }

        Ok(Self::default())
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let settings = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
        Ok(settings)
    }

    /// Serialize the default settings, for `jobscout init`.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.crawl.workers, 5);
        assert_eq!(settings.health.window_size, 20);
        assert_eq!(settings.dedup.archive_after_missing, 3);
        assert_eq!(settings.database.path, PathBuf::from("jobscout.db"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [crawl]
            workers = 2

            [dedup]
            archive_after_missing = 5
            "#,
        )
        .unwrap();
        assert_eq!(settings.crawl.workers, 2);
        assert_eq!(settings.crawl.max_pages, 10);
        assert_eq!(settings.dedup.archive_after_missing, 5);
        assert_eq!(settings.health.grace_runs, 3);
    }

    #[test]
    fn test_default_toml_round_trips() {
        let rendered = Settings::default_toml();
        let parsed: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.crawl.workers, Settings::default().crawl.workers);
    }
}
