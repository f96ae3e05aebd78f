//! Per-source health tracking.
//!
//! Keeps a rolling window of recent run outcomes per source and derives a
//! scheduling priority from it. The score only orders dispatch, it never
//! blocks a source outright; the one hard rule is deactivation after too
//! many consecutive unreachable/timeout crawls, which the orchestrator must
//! surface in the run report.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::models::{OutcomeKind, Source};

/// Tunables for health tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// How many recent runs to keep per source.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Runs a new source gets before deactivation rules apply.
    #[serde(default = "default_grace_runs")]
    pub grace_runs: usize,
    /// Consecutive unreachable/timeout outcomes that flip a source inactive.
    #[serde(default = "default_deactivate_after_failures")]
    pub deactivate_after_failures: u32,
    /// Consecutive empty crawls that flip a source inactive.
    #[serde(default = "default_deactivate_after_empty")]
    pub deactivate_after_empty: u32,
}

fn default_window_size() -> usize {
    20
}
fn default_grace_runs() -> usize {
    3
}
fn default_deactivate_after_failures() -> u32 {
    5
}
fn default_deactivate_after_empty() -> u32 {
    10
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            grace_runs: default_grace_runs(),
            deactivate_after_failures: default_deactivate_after_failures(),
            deactivate_after_empty: default_deactivate_after_empty(),
        }
    }
}

/// One window entry: how a past run went for a source.
#[derive(Debug, Clone, Copy)]
pub struct RunRecord {
    pub kind: OutcomeKind,
    pub jobs_found: u32,
}

/// Derived health signal for a source.
#[derive(Debug, Clone, Copy)]
pub struct HealthState {
    /// Ordering signal for the scheduler (higher crawls earlier).
    pub priority_score: f64,
    /// Success rate over the window; `None` while the window is empty.
    pub success_rate: Option<f64>,
    /// False once the window shows a source that is consistently broken.
    pub is_viable: bool,
    /// True while the source is still inside its grace period.
    pub in_grace_period: bool,
}

/// Result of folding one outcome into a source's health.
#[derive(Debug, Clone, Copy)]
pub struct HealthUpdate {
    /// Set when this outcome tripped a deactivation threshold.
    pub deactivated: bool,
    pub state: HealthState,
}

/// Rolling-window health tracker for all sources.
#[derive(Debug)]
pub struct HealthTracker {
    config: HealthConfig,
    windows: HashMap<String, VecDeque<RunRecord>>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    /// Seed a source's window from persisted history, oldest first.
    pub fn seed(&mut self, source_id: &str, records: Vec<RunRecord>) {
        let mut window: VecDeque<RunRecord> = records.into();
        while window.len() > self.config.window_size {
            window.pop_front();
        }
        self.windows.insert(source_id.to_string(), window);
    }

    /// Fold one run outcome into the window and the source's counters.
    ///
    /// Mutates the source in place (counters, score, active flag); the
    /// caller persists it. Deactivation is reported, never silent.
    pub fn record_outcome(
        &mut self,
        source: &mut Source,
        kind: OutcomeKind,
        jobs_found: u32,
    ) -> HealthUpdate {
        let window = self.windows.entry(source.id.clone()).or_default();
        window.push_back(RunRecord { kind, jobs_found });
        while window.len() > self.config.window_size {
            window.pop_front();
        }

        match kind {
            OutcomeKind::Success => {
                source.consecutive_failures = 0;
                source.consecutive_empty = 0;
            }
            OutcomeKind::Empty => {
                source.consecutive_failures = 0;
                source.consecutive_empty += 1;
            }
            OutcomeKind::Unreachable | OutcomeKind::Timeout => {
                source.consecutive_failures += 1;
            }
            // Throttling and extraction noise neither prove the source dead
            // nor that it is healthy; counters stay where they are.
            OutcomeKind::RateLimited
            | OutcomeKind::ExtractionFailed
            | OutcomeKind::PersistenceError => {}
        }

        let state = self.state_for(source);
        source.success_rate = state.success_rate.unwrap_or(0.0);
        source.priority_score = state.priority_score;

        let mut deactivated = false;
        if !state.in_grace_period && source.active {
            if source.consecutive_failures >= self.config.deactivate_after_failures
                || source.consecutive_empty >= self.config.deactivate_after_empty
            {
                source.active = false;
                deactivated = true;
            }
        }

        HealthUpdate { deactivated, state }
    }

    /// Current derived state for a source.
    pub fn current_state(&self, source: &Source) -> HealthState {
        self.state_for(source)
    }

    fn state_for(&self, source: &Source) -> HealthState {
        let window = self.windows.get(&source.id);
        let len = window.map(|w| w.len()).unwrap_or(0);
        let in_grace_period = len < self.config.grace_runs;

        let success_rate = window.filter(|w| !w.is_empty()).map(|w| {
            let ok = w
                .iter()
                .filter(|r| matches!(r.kind, OutcomeKind::Success | OutcomeKind::Empty))
                .count();
            ok as f64 / w.len() as f64
        });

        let avg_jobs = window
            .filter(|w| !w.is_empty())
            .map(|w| w.iter().map(|r| r.jobs_found as f64).sum::<f64>() / w.len() as f64)
            .unwrap_or(0.0);

        // Monotonically decreasing in consecutive bad runs, increasing in
        // jobs-found-per-run. Neutral 1.0 for an empty window.
        let consecutive_bad = source.consecutive_failures.max(source.consecutive_empty) as f64;
        let base = match success_rate {
            Some(rate) => rate + avg_jobs / (avg_jobs + 4.0),
            None => 1.0,
        };
        let priority_score = (base / (1.0 + consecutive_bad)).max(0.01);

        // Neutral while empty/grace; otherwise viable means the window is
        // not wall-to-wall hard failures.
        let is_viable = in_grace_period
            || window
                .map(|w| w.iter().any(|r| !r.kind.is_hard_failure()))
                .unwrap_or(true);

        HealthState {
            priority_score,
            success_rate,
            is_viable,
            in_grace_period,
        }
    }
}
