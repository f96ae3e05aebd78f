//! Crawl orchestration.
//!
//! One run walks the active source set with a bounded worker pool, fetches
//! every source through its adapter, then reconciles, persists, and updates
//! health on the invoking task. Per-source failures are isolated into
//! outcome records; only an infrastructure fault outside any single source
//! fails the run as a whole.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::adapters::{AdapterFactory, FetchError, RawCandidate};
use crate::config::Settings;
use crate::dedup;
use crate::health::HealthTracker;
use crate::models::{CrawlRun, JobPosting, OutcomeKind, RunState, Source, SourceOutcome};
use crate::repository::{JobStore, StoreError};

/// Errors that prevent a run from starting at all.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("a crawl run is already in progress (run {0})")]
    AlreadyRunning(String),
}

/// Options for one run.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Restrict the run to these source ids (still active-only).
    pub source_ids: Option<Vec<String>>,
}

/// Cooperative cancellation handle.
///
/// Cancelling stops new dispatches; in-flight fetches finish or time out,
/// and everything already resolved is still reconciled and persisted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    RunStarted {
        run_id: String,
        sources: usize,
    },
    SourceStarted {
        source_id: String,
    },
    SourceFetched {
        source_id: String,
        kind: OutcomeKind,
        jobs_found: u32,
    },
    RunFinished {
        run_id: String,
        state: RunState,
    },
}

/// The two artifacts downstream collaborators consume: the finalized run
/// and the postings this run created.
#[derive(Debug)]
pub struct CrawlReport {
    pub run: CrawlRun,
    pub new_postings: Vec<JobPosting>,
    /// Sources this run flipped inactive; never swallowed silently.
    pub deactivated_sources: Vec<String>,
}

struct FetchResult {
    source: Source,
    result: Result<Vec<RawCandidate>, FetchError>,
}

/// Crawl orchestrator.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    factory: Arc<dyn AdapterFactory>,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        factory: Arc<dyn AdapterFactory>,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            factory,
            settings,
        }
    }

    /// Execute one crawl run.
    ///
    /// Refuses to start while another run is `Running`. Store failures at
    /// startup finalize the run as `Failed`; per-source store failures are
    /// that source's `PersistenceError` outcome only.
    pub async fn run(
        &self,
        options: CrawlOptions,
        cancel: CancelToken,
        events: Option<mpsc::Sender<CrawlEvent>>,
    ) -> Result<CrawlReport, CrawlError> {
        match self.store.active_run().await {
            Ok(Some(mut active)) => {
                // A run orphaned by process death never finalizes itself;
                // past the run timeout it cannot still be live, so clear it
                // instead of blocking every future crawl.
                let stale_after =
                    chrono::Duration::seconds(self.settings.crawl.run_timeout_secs as i64);
                if Utc::now().signed_duration_since(active.started_at) > stale_after {
                    warn!(
                        "Run {} exceeded the run timeout without finalizing, marking it failed",
                        active.id
                    );
                    active.finalize(RunState::Failed);
                    active.error =
                        Some("abandoned: exceeded run timeout without finalizing".to_string());
                    if let Err(e) = self.store.save_run(&active).await {
                        return Ok(self.fail_run(format!("cannot clear stale run: {}", e)).await);
                    }
                } else {
                    return Err(CrawlError::AlreadyRunning(active.id));
                }
            }
            Ok(None) => {}
            Err(e) => return Ok(self.fail_run(format!("store unavailable: {}", e)).await),
        }

        let sources = match self.store.list_sources().await {
            Ok(sources) => sources,
            Err(e) => return Ok(self.fail_run(format!("cannot load sources: {}", e)).await),
        };
        let working_set = self.working_set(sources, &options).await;

        let mut run = CrawlRun::start();
        if let Err(e) = self.store.save_run(&run).await {
            run.finalize(RunState::Failed);
            run.error = Some(format!("cannot record run start: {}", e));
            return Ok(CrawlReport {
                run,
                new_postings: Vec::new(),
                deactivated_sources: Vec::new(),
            });
        }

        info!(
            "Run {} started: {} sources, {} workers",
            run.id,
            working_set.len(),
            self.settings.crawl.workers
        );
        send(&events, CrawlEvent::RunStarted {
            run_id: run.id.clone(),
            sources: working_set.len(),
        })
        .await;

        let fetched = self.fetch_all(&working_set, &cancel, &events).await;

        let mut health = self.seeded_tracker(&working_set).await;
        let mut report = CrawlReport {
            run,
            new_postings: Vec::new(),
            deactivated_sources: Vec::new(),
        };

        for fetch in fetched {
            let outcome = self.settle_source(fetch, &mut health, &mut report).await;
            report.run.outcomes.push(outcome);
            // Keep the run record current as sources land; failures here are
            // not fatal, the final save below retries the whole record.
            if let Err(e) = self.store.save_run(&report.run).await {
                warn!("Failed to checkpoint run {}: {}", report.run.id, e);
            }
        }

        let state = if cancel.is_cancelled() {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        report.run.finalize(state);
        if let Err(e) = self.store.save_run(&report.run).await {
            warn!("Failed to finalize run {}: {}", report.run.id, e);
        }

        info!(
            "Run {} {}: {} found, {} new, {} errors",
            report.run.id,
            state.as_str(),
            report.run.total_found(),
            report.run.total_new(),
            report.run.error_count()
        );
        send(&events, CrawlEvent::RunFinished {
            run_id: report.run.id.clone(),
            state,
        })
        .await;

        Ok(report)
    }

    /// Active sources, optionally restricted, ordered by priority.
    async fn working_set(&self, sources: Vec<Source>, options: &CrawlOptions) -> Vec<Source> {
        let mut set: Vec<Source> = sources
            .into_iter()
            .filter(|s| s.active)
            .filter(|s| match &options.source_ids {
                Some(ids) => ids.iter().any(|id| id == &s.id),
                None => true,
            })
            .collect();

        if let Some(ids) = &options.source_ids {
            for id in ids {
                if !set.iter().any(|s| &s.id == id) {
                    warn!("Requested source '{}' is unknown or inactive, skipping", id);
                }
            }
        }

        set.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        set
    }

    /// Rebuild health windows from persisted outcome history.
    async fn seeded_tracker(&self, working_set: &[Source]) -> HealthTracker {
        let mut tracker = HealthTracker::new(self.settings.health.clone());
        for source in working_set {
            match self
                .store
                .recent_outcomes(&source.id, self.settings.health.window_size)
                .await
            {
                Ok(records) => tracker.seed(&source.id, records),
                Err(e) => warn!("No outcome history for {}: {}", source.id, e),
            }
        }
        tracker
    }

    /// Phase 1: fetch every source through a bounded worker pool.
    ///
    /// Completion order is whatever the network gives us; the global run
    /// timeout cancels remaining dispatches, never resolved results.
    async fn fetch_all(
        &self,
        working_set: &[Source],
        cancel: &CancelToken,
        events: &Option<mpsc::Sender<CrawlEvent>>,
    ) -> Vec<FetchResult> {
        let queue: Arc<Mutex<VecDeque<Source>>> =
            Arc::new(Mutex::new(working_set.to_vec().into()));
        let (result_tx, mut result_rx) = mpsc::channel::<FetchResult>(working_set.len().max(1));

        let workers = self.settings.crawl.workers.max(1);
        let source_timeout = self.settings.crawl.source_timeout();
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let queue = queue.clone();
            let result_tx = result_tx.clone();
            let factory = self.factory.clone();
            let cancel = cancel.clone();
            let events = events.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let Some(source) = queue.lock().await.pop_front() else {
                        break;
                    };

                    debug!("Worker {} fetching {}", worker_id, source.id);
                    send(&events, CrawlEvent::SourceStarted {
                        source_id: source.id.clone(),
                    })
                    .await;

                    let result = match factory.build(&source) {
                        Ok(adapter) => {
                            match tokio::time::timeout(source_timeout, adapter.fetch()).await {
                                Ok(result) => result,
                                Err(_) => Err(FetchError::Timeout),
                            }
                        }
                        Err(e) => Err(e),
                    };

                    let _ = result_tx.send(FetchResult { source, result }).await;
                }
            }));
        }
        drop(result_tx);

        // Global wall-time bound: on expiry stop dispatching and let
        // in-flight fetches run into their per-source timeouts.
        let run_timeout = self.settings.crawl.run_timeout();
        let deadline = tokio::time::Instant::now() + run_timeout;
        let mut results = Vec::new();
        loop {
            let next = if cancel.is_cancelled() {
                // Past the deadline or externally cancelled; workers are
                // draining, just collect what still resolves.
                result_rx.recv().await
            } else {
                tokio::select! {
                    next = result_rx.recv() => next,
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!(
                            "Run timeout after {:?}, cancelling remaining dispatches",
                            run_timeout
                        );
                        cancel.cancel();
                        continue;
                    }
                }
            };
            let Some(result) = next else { break };
            send(events, CrawlEvent::SourceFetched {
                source_id: result.source.id.clone(),
                kind: fetch_outcome_kind(&result.result),
                jobs_found: result.result.as_ref().map(|c| c.len() as u32).unwrap_or(0),
            })
            .await;
            results.push(result);
        }

        for handle in handles {
            let _ = handle.await;
        }
        results
    }

    /// Phase 2 for one source: reconcile, persist, update health.
    async fn settle_source(
        &self,
        fetch: FetchResult,
        health: &mut HealthTracker,
        report: &mut CrawlReport,
    ) -> SourceOutcome {
        let mut source = fetch.source;
        let now = Utc::now();
        source.last_crawled = Some(now);

        let mut outcome = match &fetch.result {
            Ok(candidates) => {
                match self.reconcile_and_persist(&source, candidates, now).await {
                    Ok((outcome, new_postings)) => {
                        report.new_postings.extend(new_postings);
                        outcome
                    }
                    Err(e) => {
                        warn!("Persistence failed for {}: {}", source.id, e);
                        SourceOutcome::failure(
                            &source.id,
                            OutcomeKind::PersistenceError,
                            e.to_string(),
                        )
                    }
                }
            }
            Err(e) => {
                debug!("Fetch failed for {}: {}", source.id, e);
                SourceOutcome::failure(&source.id, fetch_outcome_kind(&fetch.result), e.to_string())
            }
        };

        let update = health.record_outcome(&mut source, outcome.kind, outcome.jobs_found);
        if update.deactivated {
            warn!(
                "Source {} deactivated after {} consecutive failures / {} empty crawls",
                source.id, source.consecutive_failures, source.consecutive_empty
            );
            outcome.deactivated_source = true;
            report.deactivated_sources.push(source.id.clone());
        }

        if let Err(e) = self.store.save_source(&source).await {
            warn!("Failed to persist health for {}: {}", source.id, e);
        }
        outcome
    }

    async fn reconcile_and_persist(
        &self,
        source: &Source,
        candidates: &[RawCandidate],
        now: chrono::DateTime<Utc>,
    ) -> Result<(SourceOutcome, Vec<JobPosting>), StoreError> {
        let existing = self.store.load_postings(&source.id).await?;
        let reconciled = dedup::reconcile(
            &source.id,
            &existing,
            candidates,
            self.settings.dedup.archive_after_missing,
            now,
        );

        let mut to_upsert = Vec::new();
        to_upsert.extend(reconciled.new.iter().cloned());
        to_upsert.extend(reconciled.updated.iter().cloned());
        to_upsert.extend(reconciled.unchanged.iter().cloned());
        to_upsert.extend(reconciled.missing.iter().cloned());
        self.store.upsert_postings(&to_upsert).await?;

        let archive_ids: Vec<String> = reconciled.archived.iter().map(|p| p.id.clone()).collect();
        if !archive_ids.is_empty() {
            // Counter state first, then the flag flip the ids refer to.
            self.store.upsert_postings(&reconciled.archived).await?;
            self.store.archive_postings(&archive_ids).await?;
        }

        let kind = if candidates.is_empty() {
            OutcomeKind::Empty
        } else {
            OutcomeKind::Success
        };

        let outcome = SourceOutcome {
            source_id: source.id.clone(),
            kind,
            jobs_found: candidates.len() as u32,
            new_jobs: reconciled.new.len() as u32,
            updated_jobs: reconciled.updated.len() as u32,
            archived_jobs: reconciled.archived.len() as u32,
            error: None,
            deactivated_source: false,
        };

        Ok((outcome, reconciled.new))
    }

    /// Build and (best effort) record a run that failed before dispatch.
    async fn fail_run(&self, error: String) -> CrawlReport {
        warn!("Run failed before dispatch: {}", error);
        let mut run = CrawlRun::start();
        run.finalize(RunState::Failed);
        run.error = Some(error);
        if let Err(e) = self.store.save_run(&run).await {
            warn!("Could not record failed run: {}", e);
        }
        CrawlReport {
            run,
            new_postings: Vec::new(),
            deactivated_sources: Vec::new(),
        }
    }
}

/// Map a fetch result onto the outcome taxonomy.
fn fetch_outcome_kind(result: &Result<Vec<RawCandidate>, FetchError>) -> OutcomeKind {
    match result {
        Ok(candidates) if candidates.is_empty() => OutcomeKind::Empty,
        Ok(_) => OutcomeKind::Success,
        Err(FetchError::Timeout) => OutcomeKind::Timeout,
        Err(FetchError::RateLimited(_)) => OutcomeKind::RateLimited,
        Err(FetchError::ExtractionFailed(_)) => OutcomeKind::ExtractionFailed,
        Err(FetchError::SourceUnreachable(_)) | Err(FetchError::InvalidConfig(_)) => {
            OutcomeKind::Unreachable
        }
    }
}

async fn send(events: &Option<mpsc::Sender<CrawlEvent>>, event: CrawlEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_outcome_mapping() {
        assert_eq!(fetch_outcome_kind(&Ok(Vec::new())), OutcomeKind::Empty);
        assert_eq!(
            fetch_outcome_kind(&Err(FetchError::Timeout)),
            OutcomeKind::Timeout
        );
        assert_eq!(
            fetch_outcome_kind(&Err(FetchError::RateLimited("HTTP 429".into()))),
            OutcomeKind::RateLimited
        );
        assert_eq!(
            fetch_outcome_kind(&Err(FetchError::ExtractionFailed("bad json".into()))),
            OutcomeKind::ExtractionFailed
        );
        assert_eq!(
            fetch_outcome_kind(&Err(FetchError::InvalidConfig("missing url".into()))),
            OutcomeKind::Unreachable
        );
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
