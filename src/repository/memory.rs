//! In-memory store.
//!
//! Backs the test suite and ad-hoc dry runs; same contract as the SQLite
//! store, no durability.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{JobStore, Result};
use crate::health::RunRecord;
use crate::models::{CrawlRun, JobPosting, RunState, Source};

#[derive(Default)]
struct Inner {
    sources: HashMap<String, Source>,
    /// Keyed by (source_id, fingerprint), mirroring the SQLite unique index.
    postings: HashMap<(String, String), JobPosting>,
    runs: Vec<CrawlRun>,
}

/// Non-durable store for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save_source(&self, source: &Source) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.sources.insert(source.id.clone(), source.clone());
        Ok(())
    }

    async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sources.get(id).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let inner = self.inner.lock().unwrap();
        let mut sources: Vec<Source> = inner.sources.values().cloned().collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sources)
    }

    async fn delete_source(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.postings.retain(|(source_id, _), _| source_id != id);
        Ok(inner.sources.remove(id).is_some())
    }

    async fn load_postings(&self, source_id: &str) -> Result<Vec<JobPosting>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .postings
            .iter()
            .filter(|((sid, _), _)| sid == source_id)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn upsert_postings(&self, postings: &[JobPosting]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for posting in postings {
            inner.postings.insert(
                (posting.source_id.clone(), posting.fingerprint.clone()),
                posting.clone(),
            );
        }
        Ok(())
    }

    async fn archive_postings(&self, ids: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for posting in inner.postings.values_mut() {
            if ids.contains(&posting.id) {
                posting.archived = true;
            }
        }
        Ok(())
    }

    async fn list_postings(
        &self,
        source_id: Option<&str>,
        include_archived: bool,
    ) -> Result<Vec<JobPosting>> {
        let inner = self.inner.lock().unwrap();
        let mut postings: Vec<JobPosting> = inner
            .postings
            .values()
            .filter(|p| source_id.map(|sid| p.source_id == sid).unwrap_or(true))
            .filter(|p| include_archived || !p.archived)
            .cloned()
            .collect();
        postings.sort_by(|a, b| b.discovered_at.cmp(&a.discovered_at));
        Ok(postings)
    }

    async fn save_run(&self, run: &CrawlRun) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.runs.iter_mut().find(|r| r.id == run.id) {
            *existing = run.clone();
        } else {
            inner.runs.push(run.clone());
        }
        Ok(())
    }

    async fn active_run(&self) -> Result<Option<CrawlRun>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .runs
            .iter()
            .find(|r| r.state == RunState::Running)
            .cloned())
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<CrawlRun>> {
        let inner = self.inner.lock().unwrap();
        let mut runs = inner.runs.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn recent_outcomes(&self, source_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut runs = inner.runs.clone();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        let mut records: Vec<RunRecord> = runs
            .iter()
            .flat_map(|r| r.outcomes.iter())
            .filter(|o| o.source_id == source_id)
            .map(|o| RunRecord {
                kind: o.kind,
                jobs_found: o.jobs_found,
            })
            .collect();
        if records.len() > limit {
            records.drain(0..records.len() - limit);
        }
        Ok(records)
    }
}
