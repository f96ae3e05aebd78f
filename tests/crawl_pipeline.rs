//! End-to-end orchestration tests using stub adapters and the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use jobscout::adapters::{AdapterFactory, FetchError, JobAdapter, RawCandidate};
use jobscout::config::Settings;
use jobscout::models::{AdapterKind, CrawlRun, JobPosting, OutcomeKind, RunState, Source};
use jobscout::repository::{JobStore, MemoryStore, StoreError};
use jobscout::scheduler::{CancelToken, CrawlError, CrawlEvent, CrawlOptions, Orchestrator};

/// What a stubbed source should do when fetched.
#[derive(Clone)]
enum Script {
    Jobs(Vec<RawCandidate>),
    Unreachable,
    Timeout,
    ExtractionFailed,
    /// Never resolves; exercises the per-source timeout.
    Hang,
    /// Returns jobs and then cancels the run, as an operator would mid-crawl.
    JobsThenCancel(Vec<RawCandidate>, CancelToken),
}

struct StubAdapter {
    script: Script,
}

#[async_trait]
impl JobAdapter for StubAdapter {
    async fn fetch(&self) -> Result<Vec<RawCandidate>, FetchError> {
        match &self.script {
            Script::Jobs(jobs) => Ok(jobs.clone()),
            Script::Unreachable => Err(FetchError::SourceUnreachable("connection refused".into())),
            Script::Timeout => Err(FetchError::Timeout),
            Script::ExtractionFailed => {
                Err(FetchError::ExtractionFailed("model returned prose".into()))
            }
            Script::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(86_400)).await;
                Ok(Vec::new())
            }
            Script::JobsThenCancel(jobs, cancel) => {
                cancel.cancel();
                Ok(jobs.clone())
            }
        }
    }
}

#[derive(Default)]
struct StubFactory {
    scripts: HashMap<String, Script>,
}

impl StubFactory {
    fn with(mut self, source_id: &str, script: Script) -> Self {
        self.scripts.insert(source_id.to_string(), script);
        self
    }
}

impl AdapterFactory for StubFactory {
    fn build(&self, source: &Source) -> Result<Box<dyn JobAdapter>, FetchError> {
        let script = self
            .scripts
            .get(&source.id)
            .cloned()
            .ok_or_else(|| FetchError::InvalidConfig(format!("no script for {}", source.id)))?;
        Ok(Box::new(StubAdapter { script }))
    }
}

/// Delegates to a `MemoryStore` but fails posting upserts, to exercise
/// per-source persistence error isolation.
struct FailingStore {
    inner: MemoryStore,
}

#[async_trait]
impl JobStore for FailingStore {
    async fn save_source(&self, source: &Source) -> jobscout::repository::Result<()> {
        self.inner.save_source(source).await
    }
    async fn get_source(&self, id: &str) -> jobscout::repository::Result<Option<Source>> {
        self.inner.get_source(id).await
    }
    async fn list_sources(&self) -> jobscout::repository::Result<Vec<Source>> {
        self.inner.list_sources().await
    }
    async fn delete_source(&self, id: &str) -> jobscout::repository::Result<bool> {
        self.inner.delete_source(id).await
    }
    async fn load_postings(&self, source_id: &str) -> jobscout::repository::Result<Vec<JobPosting>> {
        self.inner.load_postings(source_id).await
    }
    async fn upsert_postings(&self, _postings: &[JobPosting]) -> jobscout::repository::Result<()> {
        Err(StoreError::Other("disk full".into()))
    }
    async fn archive_postings(&self, ids: &[String]) -> jobscout::repository::Result<()> {
        self.inner.archive_postings(ids).await
    }
    async fn list_postings(
        &self,
        source_id: Option<&str>,
        include_archived: bool,
    ) -> jobscout::repository::Result<Vec<JobPosting>> {
        self.inner.list_postings(source_id, include_archived).await
    }
    async fn save_run(&self, run: &CrawlRun) -> jobscout::repository::Result<()> {
        self.inner.save_run(run).await
    }
    async fn active_run(&self) -> jobscout::repository::Result<Option<CrawlRun>> {
        self.inner.active_run().await
    }
    async fn list_runs(&self, limit: usize) -> jobscout::repository::Result<Vec<CrawlRun>> {
        self.inner.list_runs(limit).await
    }
    async fn recent_outcomes(
        &self,
        source_id: &str,
        limit: usize,
    ) -> jobscout::repository::Result<Vec<jobscout::health::RunRecord>> {
        self.inner.recent_outcomes(source_id, limit).await
    }
}

fn candidate(title: &str, url: &str) -> RawCandidate {
    RawCandidate {
        title: title.to_string(),
        url: url.to_string(),
        location: Some("Remote".to_string()),
        description: None,
        posted_at: None,
    }
}

fn source(id: &str) -> Source {
    Source::new(
        id.to_string(),
        format!("{} Inc", id),
        AdapterKind::AtsJson,
        serde_json::json!({}),
    )
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.crawl.workers = 3;
    settings
}

async fn seed_sources(store: &MemoryStore, ids: &[&str]) {
    for id in ids {
        store.save_source(&source(id)).await.unwrap();
    }
}

fn outcome_kind(run: &CrawlRun, source_id: &str) -> OutcomeKind {
    run.outcomes
        .iter()
        .find(|o| o.source_id == source_id)
        .unwrap_or_else(|| panic!("no outcome for {}", source_id))
        .kind
}

#[tokio::test]
async fn failures_are_isolated_per_source() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["good", "down", "quiet", "garbled"]).await;

    let factory = Arc::new(
        StubFactory::default()
            .with(
                "good",
                Script::Jobs(vec![
                    candidate("Engineer", "https://good.example/jobs/1"),
                    candidate("Designer", "https://good.example/jobs/2"),
                ]),
            )
            .with("down", Script::Unreachable)
            .with("quiet", Script::Jobs(Vec::new()))
            .with("garbled", Script::ExtractionFailed),
    );

    let orchestrator = Orchestrator::new(store.clone(), factory, settings());
    let report = orchestrator
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    let run = &report.run;
    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.outcomes.len(), 4);
    assert_eq!(outcome_kind(run, "good"), OutcomeKind::Success);
    assert_eq!(outcome_kind(run, "down"), OutcomeKind::Unreachable);
    assert_eq!(outcome_kind(run, "quiet"), OutcomeKind::Empty);
    assert_eq!(outcome_kind(run, "garbled"), OutcomeKind::ExtractionFailed);

    assert_eq!(report.new_postings.len(), 2);
    let stored = store.list_postings(Some("good"), false).await.unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn second_run_does_not_duplicate_postings() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["acme"]).await;

    let jobs = vec![
        candidate("Engineer", "https://acme.example/jobs/1"),
        candidate("Designer", "https://acme.example/jobs/2"),
    ];
    let factory = Arc::new(StubFactory::default().with("acme", Script::Jobs(jobs)));

    let orchestrator = Orchestrator::new(store.clone(), factory, settings());

    let first = orchestrator
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert_eq!(first.run.total_new(), 2);

    let second = orchestrator
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert_eq!(second.run.total_new(), 0);
    assert!(second.new_postings.is_empty());

    let stored = store.list_postings(Some("acme"), true).await.unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn absent_postings_are_archived_after_threshold() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["acme"]).await;

    let mut settings = settings();
    settings.dedup.archive_after_missing = 2;

    let both = vec![
        candidate("Engineer", "https://acme.example/jobs/1"),
        candidate("Designer", "https://acme.example/jobs/2"),
    ];
    let only_one = vec![candidate("Engineer", "https://acme.example/jobs/1")];

    let run_with = |jobs: Vec<RawCandidate>| {
        let factory = Arc::new(StubFactory::default().with("acme", Script::Jobs(jobs)));
        Orchestrator::new(store.clone(), factory, settings.clone())
    };

    run_with(both)
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    // First absence: counter ticks, nothing archived.
    let report = run_with(only_one.clone())
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert_eq!(report.run.outcomes[0].archived_jobs, 0);
    let active = store.list_postings(Some("acme"), false).await.unwrap();
    assert_eq!(active.len(), 2);

    // Second absence hits the threshold.
    let report = run_with(only_one)
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert_eq!(report.run.outcomes[0].archived_jobs, 1);

    let active = store.list_postings(Some("acme"), false).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "Engineer");

    let all = store.list_postings(Some("acme"), true).await.unwrap();
    let archived: Vec<_> = all.iter().filter(|p| p.archived).collect();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].title, "Designer");
}

#[tokio::test]
async fn reappearing_posting_is_revived() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["acme"]).await;

    let mut settings = settings();
    settings.dedup.archive_after_missing = 1;

    let job = vec![candidate("Engineer", "https://acme.example/jobs/1")];

    let run_with = |jobs: Vec<RawCandidate>| {
        let factory = Arc::new(StubFactory::default().with("acme", Script::Jobs(jobs)));
        Orchestrator::new(store.clone(), factory, settings.clone())
    };

    run_with(job.clone())
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    run_with(Vec::new())
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert!(store
        .list_postings(Some("acme"), false)
        .await
        .unwrap()
        .is_empty());

    let report = run_with(job)
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert_eq!(report.run.total_new(), 0);

    let active = store.list_postings(Some("acme"), false).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].missing_crawls, 0);
    assert!(!active[0].archived);
}

#[tokio::test]
async fn refuses_overlapping_runs() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["acme"]).await;

    let in_flight = CrawlRun::start();
    store.save_run(&in_flight).await.unwrap();

    let factory = Arc::new(StubFactory::default().with("acme", Script::Jobs(Vec::new())));
    let orchestrator = Orchestrator::new(store, factory, settings());

    let err = orchestrator
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap_err();
    match err {
        CrawlError::AlreadyRunning(id) => assert_eq!(id, in_flight.id),
    }
}

#[tokio::test]
async fn stale_running_run_is_cleared_and_crawling_resumes() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["acme"]).await;

    // A run orphaned by process death: still `running`, started long past
    // the run timeout, with no orchestrator alive to finalize it.
    let mut orphaned = CrawlRun::start();
    orphaned.started_at = chrono::Utc::now() - chrono::Duration::seconds(3600);
    store.save_run(&orphaned).await.unwrap();

    let factory = Arc::new(StubFactory::default().with(
        "acme",
        Script::Jobs(vec![candidate("Engineer", "https://acme.example/jobs/1")]),
    ));
    let orchestrator = Orchestrator::new(store.clone(), factory, settings());

    let report = orchestrator
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert_eq!(report.run.state, RunState::Completed);
    assert_eq!(report.run.total_new(), 1);

    let runs = store.list_runs(10).await.unwrap();
    let cleared = runs.iter().find(|r| r.id == orphaned.id).unwrap();
    assert_eq!(cleared.state, RunState::Failed);
    assert!(cleared.error.is_some());
    assert!(store.active_run().await.unwrap().is_none());
}

#[tokio::test]
async fn pre_cancelled_run_finishes_as_cancelled() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["acme"]).await;

    let factory = Arc::new(StubFactory::default().with(
        "acme",
        Script::Jobs(vec![candidate("Engineer", "https://acme.example/jobs/1")]),
    ));
    let orchestrator = Orchestrator::new(store.clone(), factory, settings());

    let cancel = CancelToken::new();
    cancel.cancel();

    let report = orchestrator
        .run(CrawlOptions::default(), cancel, None)
        .await
        .unwrap();
    assert_eq!(report.run.state, RunState::Cancelled);
    // Nothing was dispatched, so nothing was fetched or persisted.
    assert!(report.run.outcomes.is_empty());
    assert!(store
        .list_postings(Some("acme"), true)
        .await
        .unwrap()
        .is_empty());

    // The next run starts normally.
    assert!(store.active_run().await.unwrap().is_none());
}

#[tokio::test]
async fn cancellation_keeps_partial_results() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["a", "b", "c"]).await;

    let mut settings = settings();
    // One worker makes the dispatch order deterministic.
    settings.crawl.workers = 1;

    let cancel = CancelToken::new();
    let factory = Arc::new(
        StubFactory::default()
            .with(
                "a",
                Script::Jobs(vec![candidate("Engineer", "https://a.example/jobs/1")]),
            )
            .with(
                "b",
                Script::JobsThenCancel(
                    vec![candidate("Designer", "https://b.example/jobs/1")],
                    cancel.clone(),
                ),
            )
            .with(
                "c",
                Script::Jobs(vec![candidate("Writer", "https://c.example/jobs/1")]),
            ),
    );
    let orchestrator = Orchestrator::new(store.clone(), factory, settings);

    let report = orchestrator
        .run(CrawlOptions::default(), cancel, None)
        .await
        .unwrap();

    // "a" and "b" resolved before cancellation took effect; "c" was never
    // dispatched. What resolved is reconciled and persisted, not discarded.
    assert_eq!(report.run.state, RunState::Cancelled);
    assert_eq!(report.run.outcomes.len(), 2);
    assert_eq!(outcome_kind(&report.run, "a"), OutcomeKind::Success);
    assert_eq!(outcome_kind(&report.run, "b"), OutcomeKind::Success);

    assert_eq!(store.list_postings(Some("a"), true).await.unwrap().len(), 1);
    assert_eq!(store.list_postings(Some("b"), true).await.unwrap().len(), 1);
    assert!(store.list_postings(Some("c"), true).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hung_source_times_out() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["stuck", "good"]).await;

    let mut settings = settings();
    settings.crawl.source_timeout_secs = 5;

    let factory = Arc::new(
        StubFactory::default()
            .with("stuck", Script::Hang)
            .with(
                "good",
                Script::Jobs(vec![candidate("Engineer", "https://good.example/jobs/1")]),
            ),
    );
    let orchestrator = Orchestrator::new(store, factory, settings);

    let report = orchestrator
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    assert_eq!(report.run.state, RunState::Completed);
    assert_eq!(outcome_kind(&report.run, "stuck"), OutcomeKind::Timeout);
    assert_eq!(outcome_kind(&report.run, "good"), OutcomeKind::Success);
}

#[tokio::test(start_paused = true)]
async fn run_timeout_cancels_but_keeps_resolved_results() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["stuck", "good"]).await;

    let mut settings = settings();
    // The global bound fires well before the per-source timeout.
    settings.crawl.run_timeout_secs = 10;
    settings.crawl.source_timeout_secs = 60;

    let factory = Arc::new(
        StubFactory::default()
            .with("stuck", Script::Hang)
            .with(
                "good",
                Script::Jobs(vec![candidate("Engineer", "https://good.example/jobs/1")]),
            ),
    );
    let orchestrator = Orchestrator::new(store.clone(), factory, settings);

    let report = orchestrator
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    // The deadline cancels the run; the fast source's results survive and
    // the in-flight fetch drains through its own timeout.
    assert_eq!(report.run.state, RunState::Cancelled);
    assert_eq!(outcome_kind(&report.run, "good"), OutcomeKind::Success);
    assert_eq!(outcome_kind(&report.run, "stuck"), OutcomeKind::Timeout);
    assert_eq!(store.list_postings(Some("good"), true).await.unwrap().len(), 1);
    assert!(store.active_run().await.unwrap().is_none());
}

#[tokio::test]
async fn store_failure_is_a_per_source_outcome() {
    let inner = MemoryStore::new();
    inner.save_source(&source("acme")).await.unwrap();
    let store = Arc::new(FailingStore { inner });

    let factory = Arc::new(StubFactory::default().with(
        "acme",
        Script::Jobs(vec![candidate("Engineer", "https://acme.example/jobs/1")]),
    ));
    let orchestrator = Orchestrator::new(store, factory, settings());

    let report = orchestrator
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    assert_eq!(report.run.state, RunState::Completed);
    assert_eq!(
        outcome_kind(&report.run, "acme"),
        OutcomeKind::PersistenceError
    );
    assert!(report.new_postings.is_empty());
}

#[tokio::test]
async fn consistently_failing_source_is_deactivated() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["flaky"]).await;

    let mut settings = settings();
    settings.health.grace_runs = 0;
    settings.health.deactivate_after_failures = 2;

    let factory = Arc::new(StubFactory::default().with("flaky", Script::Timeout));

    let first = Orchestrator::new(store.clone(), factory.clone(), settings.clone())
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert!(first.deactivated_sources.is_empty());

    let second = Orchestrator::new(store.clone(), factory, settings)
        .run(CrawlOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert_eq!(second.deactivated_sources, vec!["flaky".to_string()]);
    assert!(second.run.outcomes[0].deactivated_source);

    let flaky = store.get_source("flaky").await.unwrap().unwrap();
    assert!(!flaky.active);
    assert_eq!(flaky.consecutive_failures, 2);

    // Deactivated sources are no longer scheduled.
    let third = Orchestrator::new(store.clone(), Arc::new(StubFactory::default()), {
        let mut s = Settings::default();
        s.crawl.workers = 3;
        s
    })
    .run(CrawlOptions::default(), CancelToken::new(), None)
    .await
    .unwrap();
    assert!(third.run.outcomes.is_empty());
}

#[tokio::test]
async fn restricting_to_source_ids_skips_the_rest() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["a", "b"]).await;

    let factory = Arc::new(
        StubFactory::default()
            .with(
                "a",
                Script::Jobs(vec![candidate("Engineer", "https://a.example/jobs/1")]),
            )
            .with("b", Script::Unreachable),
    );
    let orchestrator = Orchestrator::new(store.clone(), factory, settings());

    let report = orchestrator
        .run(
            CrawlOptions {
                source_ids: Some(vec!["a".to_string()]),
            },
            CancelToken::new(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(report.run.outcomes.len(), 1);
    assert_eq!(report.run.outcomes[0].source_id, "a");
}

#[tokio::test]
async fn events_report_run_progress() {
    let store = Arc::new(MemoryStore::new());
    seed_sources(&store, &["acme"]).await;

    let factory = Arc::new(StubFactory::default().with(
        "acme",
        Script::Jobs(vec![candidate("Engineer", "https://acme.example/jobs/1")]),
    ));
    let orchestrator = Orchestrator::new(store, factory, settings());

    let (tx, mut rx) = mpsc::channel(16);
    let report = orchestrator
        .run(CrawlOptions::default(), CancelToken::new(), Some(tx))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(
        events.first(),
        Some(CrawlEvent::RunStarted { sources: 1, .. })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, CrawlEvent::SourceFetched { kind: OutcomeKind::Success, .. })));
    assert!(matches!(
        events.last(),
        Some(CrawlEvent::RunFinished { state: RunState::Completed, .. })
    ));
    assert_eq!(report.run.total_new(), 1);
}
