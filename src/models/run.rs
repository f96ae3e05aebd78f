//! Crawl run records.
//!
//! A run is one orchestrated pass across some or all active sources. Its
//! lifecycle state replaces any global "is a crawl running" flag: the
//! orchestrator checks for a `Running` run before starting a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Cancelled,
    /// Infrastructure fault outside any single source (e.g. store unavailable).
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// How a single source fared within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Fetch succeeded and returned at least one candidate.
    Success,
    /// Fetch succeeded but the source reported no jobs.
    Empty,
    /// Transport or HTTP failure.
    Unreachable,
    /// Per-source time bound exceeded.
    Timeout,
    /// Explicit throttling signal (429/403).
    RateLimited,
    /// AI-assisted extraction produced an unusable response.
    ExtractionFailed,
    /// The store failed while reconciling this source.
    PersistenceError,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Empty => "empty",
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::ExtractionFailed => "extraction_failed",
            Self::PersistenceError => "persistence_error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "empty" => Some(Self::Empty),
            "unreachable" => Some(Self::Unreachable),
            "timeout" => Some(Self::Timeout),
            "rate_limited" => Some(Self::RateLimited),
            "extraction_failed" => Some(Self::ExtractionFailed),
            "persistence_error" => Some(Self::PersistenceError),
            _ => None,
        }
    }

    /// Outcomes that count against the consecutive-failure threshold.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, Self::Unreachable | Self::Timeout)
    }
}

/// Per-source outcome record within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub kind: OutcomeKind,
    /// Candidates the adapter returned (after dropping malformed ones).
    pub jobs_found: u32,
    /// Postings created by reconciliation.
    pub new_jobs: u32,
    /// Postings refreshed by reconciliation.
    pub updated_jobs: u32,
    /// Postings archived by the absence sweep.
    pub archived_jobs: u32,
    /// Error detail for non-success outcomes.
    pub error: Option<String>,
    /// Set when this outcome tripped the deactivation threshold.
    pub deactivated_source: bool,
}

impl SourceOutcome {
    /// An outcome carrying only a kind and error detail.
    pub fn failure(source_id: &str, kind: OutcomeKind, error: String) -> Self {
        Self {
            source_id: source_id.to_string(),
            kind,
            jobs_found: 0,
            new_jobs: 0,
            updated_jobs: 0,
            archived_jobs: 0,
            error: Some(error),
            deactivated_source: false,
        }
    }
}

/// One execution of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRun {
    pub id: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Exactly one entry per dispatched source once the run finalizes.
    pub outcomes: Vec<SourceOutcome>,
    /// Infrastructure fault detail for `Failed` runs.
    pub error: Option<String>,
}

impl CrawlRun {
    /// Start a new run in the `Running` state.
    pub fn start() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: RunState::Running,
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
            error: None,
        }
    }

    /// Finalize the run in a terminal state.
    pub fn finalize(&mut self, state: RunState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    /// Total candidates seen across all sources.
    pub fn total_found(&self) -> u32 {
        self.outcomes.iter().map(|o| o.jobs_found).sum()
    }

    /// Total new postings created across all sources.
    pub fn total_new(&self) -> u32 {
        self.outcomes.iter().map(|o| o.new_jobs).sum()
    }

    /// Count of sources that ended in a non-success, non-empty outcome.
    pub fn error_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.kind, OutcomeKind::Success | OutcomeKind::Empty))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            RunState::Running,
            RunState::Completed,
            RunState::Cancelled,
            RunState::Failed,
        ] {
            assert_eq!(RunState::from_str(state.as_str()), Some(state));
        }
    }

    #[test]
    fn test_hard_failures() {
        assert!(OutcomeKind::Unreachable.is_hard_failure());
        assert!(OutcomeKind::Timeout.is_hard_failure());
        assert!(!OutcomeKind::RateLimited.is_hard_failure());
        assert!(!OutcomeKind::Empty.is_hard_failure());
    }

    #[test]
    fn test_run_aggregates() {
        let mut run = CrawlRun::start();
        run.outcomes.push(SourceOutcome {
            source_id: "a".into(),
            kind: OutcomeKind::Success,
            jobs_found: 5,
            new_jobs: 2,
            updated_jobs: 1,
            archived_jobs: 0,
            error: None,
            deactivated_source: false,
        });
        run.outcomes.push(SourceOutcome::failure(
            "b",
            OutcomeKind::Timeout,
            "deadline exceeded".into(),
        ));
        assert_eq!(run.total_found(), 5);
        assert_eq!(run.total_new(), 2);
        assert_eq!(run.error_count(), 1);
    }
}
