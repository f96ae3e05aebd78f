//! Persistence layer.
//!
//! The orchestrator talks to storage through the `JobStore` trait and
//! assumes each call is atomic and durable on return. `SqliteStore` is the
//! production backend; `MemoryStore` backs tests and dry runs.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::health::RunRecord;
use crate::models::{CrawlRun, JobPosting, Source};

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage collaborator for sources, postings, and runs.
#[async_trait]
pub trait JobStore: Send + Sync {
    // Sources
    async fn save_source(&self, source: &Source) -> Result<()>;
    async fn get_source(&self, id: &str) -> Result<Option<Source>>;
    async fn list_sources(&self) -> Result<Vec<Source>>;
    async fn delete_source(&self, id: &str) -> Result<bool>;

    // Postings
    /// All postings for a source, archived included.
    async fn load_postings(&self, source_id: &str) -> Result<Vec<JobPosting>>;
    /// Insert-or-update by `(source_id, fingerprint)`.
    async fn upsert_postings(&self, postings: &[JobPosting]) -> Result<()>;
    /// Soft-delete: flips the archived flag, never removes rows.
    async fn archive_postings(&self, ids: &[String]) -> Result<()>;
    async fn list_postings(
        &self,
        source_id: Option<&str>,
        include_archived: bool,
    ) -> Result<Vec<JobPosting>>;

    // Runs
    /// Insert or replace the run and its per-source outcomes.
    async fn save_run(&self, run: &CrawlRun) -> Result<()>;
    /// The run currently in the `Running` state, if any.
    async fn active_run(&self) -> Result<Option<CrawlRun>>;
    async fn list_runs(&self, limit: usize) -> Result<Vec<CrawlRun>>;
    /// Most recent outcomes for a source, oldest first, for window seeding.
    async fn recent_outcomes(&self, source_id: &str, limit: usize) -> Result<Vec<RunRecord>>;
}

/// Parse an RFC 3339 timestamp stored as TEXT, defaulting to now on garbage.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}
