//! SQLite-backed store.
//!
//! One connection per call over a shared path, schema created up front.
//! Timestamps are RFC 3339 TEXT, adapter configs and flags live as TEXT and
//! INTEGER. Posting identity is enforced by a unique index on
//! `(source_id, fingerprint)`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::{parse_datetime, parse_datetime_opt, JobStore, Result, StoreError};
use crate::health::RunRecord;
use crate::models::{
    AdapterKind, CrawlRun, JobPosting, OutcomeKind, RunState, Source, SourceOutcome,
};

/// SQLite store.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (and initialize) the database at the given path.
    pub fn new(db_path: &Path) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                config TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                consecutive_empty INTEGER NOT NULL DEFAULT 0,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                success_rate REAL NOT NULL DEFAULT 0,
                priority_score REAL NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_crawled TEXT
            );

            CREATE TABLE IF NOT EXISTS postings (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES sources(id),
                fingerprint TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                location TEXT,
                description TEXT,
                posted_at TEXT,
                discovered_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                missing_crawls INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                UNIQUE(source_id, fingerprint)
            );

            CREATE TABLE IF NOT EXISTS crawl_runs (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS run_outcomes (
                run_id TEXT NOT NULL REFERENCES crawl_runs(id),
                source_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                jobs_found INTEGER NOT NULL DEFAULT 0,
                new_jobs INTEGER NOT NULL DEFAULT 0,
                updated_jobs INTEGER NOT NULL DEFAULT 0,
                archived_jobs INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                deactivated INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_postings_source ON postings(source_id);
            CREATE INDEX IF NOT EXISTS idx_outcomes_source ON run_outcomes(source_id);
        "#,
        )?;
        Ok(())
    }

    fn source_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Source> {
        Ok(Source {
            id: row.get("id")?,
            name: row.get("name")?,
            kind: AdapterKind::from_str(&row.get::<_, String>("kind")?)
                .unwrap_or(AdapterKind::AtsJson),
            config: serde_json::from_str(&row.get::<_, String>("config")?).unwrap_or_default(),
            active: row.get("active")?,
            consecutive_empty: row.get("consecutive_empty")?,
            consecutive_failures: row.get("consecutive_failures")?,
            success_rate: row.get("success_rate")?,
            priority_score: row.get("priority_score")?,
            created_at: parse_datetime(&row.get::<_, String>("created_at")?),
            last_crawled: parse_datetime_opt(row.get::<_, Option<String>>("last_crawled")?),
        })
    }

    fn posting_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobPosting> {
        Ok(JobPosting {
            id: row.get("id")?,
            source_id: row.get("source_id")?,
            fingerprint: row.get("fingerprint")?,
            title: row.get("title")?,
            url: row.get("url")?,
            location: row.get("location")?,
            description: row.get("description")?,
            posted_at: parse_datetime_opt(row.get::<_, Option<String>>("posted_at")?),
            discovered_at: parse_datetime(&row.get::<_, String>("discovered_at")?),
            last_seen_at: parse_datetime(&row.get::<_, String>("last_seen_at")?),
            missing_crawls: row.get("missing_crawls")?,
            archived: row.get("archived")?,
        })
    }

    fn upsert_posting(conn: &Connection, posting: &JobPosting) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO postings (
                id, source_id, fingerprint, title, url, location, description,
                posted_at, discovered_at, last_seen_at, missing_crawls, archived
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(source_id, fingerprint) DO UPDATE SET
                title = excluded.title,
                url = excluded.url,
                location = excluded.location,
                description = excluded.description,
                posted_at = excluded.posted_at,
                last_seen_at = excluded.last_seen_at,
                missing_crawls = excluded.missing_crawls,
                archived = excluded.archived
            "#,
            params![
                posting.id,
                posting.source_id,
                posting.fingerprint,
                posting.title,
                posting.url,
                posting.location,
                posting.description,
                posting.posted_at.map(|dt| dt.to_rfc3339()),
                posting.discovered_at.to_rfc3339(),
                posting.last_seen_at.to_rfc3339(),
                posting.missing_crawls,
                posting.archived,
            ],
        )?;
        Ok(())
    }

    fn load_outcomes(conn: &Connection, run_id: &str) -> Result<Vec<SourceOutcome>> {
        let mut stmt = conn.prepare(
            "SELECT source_id, kind, jobs_found, new_jobs, updated_jobs, archived_jobs,
                    error, deactivated
             FROM run_outcomes WHERE run_id = ? ORDER BY rowid",
        )?;
        let outcomes = stmt
            .query_map(params![run_id], |row| {
                Ok(SourceOutcome {
                    source_id: row.get("source_id")?,
                    kind: OutcomeKind::from_str(&row.get::<_, String>("kind")?)
                        .unwrap_or(OutcomeKind::Unreachable),
                    jobs_found: row.get("jobs_found")?,
                    new_jobs: row.get("new_jobs")?,
                    updated_jobs: row.get("updated_jobs")?,
                    archived_jobs: row.get("archived_jobs")?,
                    error: row.get("error")?,
                    deactivated_source: row.get("deactivated")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(outcomes)
    }

    /// Shared row shape for run queries; outcomes are loaded separately.
    fn run_fields(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
        Ok((
            row.get("id")?,
            row.get("state")?,
            row.get("started_at")?,
            row.get("finished_at")?,
            row.get("error")?,
        ))
    }

    fn assemble_run(conn: &Connection, fields: RunRow) -> Result<CrawlRun> {
        let (id, state, started_at, finished_at, error) = fields;
        let outcomes = Self::load_outcomes(conn, &id)?;
        Ok(CrawlRun {
            id,
            state: RunState::from_str(&state).unwrap_or(RunState::Failed),
            started_at: parse_datetime(&started_at),
            finished_at: parse_datetime_opt(finished_at),
            outcomes,
            error,
        })
    }
}

type RunRow = (String, String, String, Option<String>, Option<String>);

#[async_trait]
impl JobStore for SqliteStore {
    async fn save_source(&self, source: &Source) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO sources (
                id, name, kind, config, active, consecutive_empty,
                consecutive_failures, success_rate, priority_score,
                created_at, last_crawled
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                config = excluded.config,
                active = excluded.active,
                consecutive_empty = excluded.consecutive_empty,
                consecutive_failures = excluded.consecutive_failures,
                success_rate = excluded.success_rate,
                priority_score = excluded.priority_score,
                last_crawled = excluded.last_crawled
            "#,
            params![
                source.id,
                source.name,
                source.kind.as_str(),
                serde_json::to_string(&source.config)?,
                source.active,
                source.consecutive_empty,
                source.consecutive_failures,
                source.success_rate,
                source.priority_score,
                source.created_at.to_rfc3339(),
                source.last_crawled.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM sources WHERE id = ?")?;
        let mut rows = stmt.query_map(params![id], Self::source_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM sources ORDER BY id")?;
        let sources = stmt
            .query_map([], Self::source_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    async fn delete_source(&self, id: &str) -> Result<bool> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM postings WHERE source_id = ?", params![id])?;
        let rows = conn.execute("DELETE FROM sources WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    async fn load_postings(&self, source_id: &str) -> Result<Vec<JobPosting>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM postings WHERE source_id = ?")?;
        let postings = stmt
            .query_map(params![source_id], Self::posting_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(postings)
    }

    async fn upsert_postings(&self, postings: &[JobPosting]) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for posting in postings {
            Self::upsert_posting(&tx, posting)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn archive_postings(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute(
                "UPDATE postings SET archived = 1 WHERE id = ?",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn list_postings(
        &self,
        source_id: Option<&str>,
        include_archived: bool,
    ) -> Result<Vec<JobPosting>> {
        let conn = self.connect()?;
        let mut sql = String::from("SELECT * FROM postings WHERE 1=1");
        if source_id.is_some() {
            sql.push_str(" AND source_id = ?1");
        }
        if !include_archived {
            sql.push_str(" AND archived = 0");
        }
        sql.push_str(" ORDER BY discovered_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let postings = match source_id {
            Some(sid) => stmt
                .query_map(params![sid], Self::posting_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], Self::posting_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(postings)
    }

    async fn save_run(&self, run: &CrawlRun) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO crawl_runs (id, state, started_at, finished_at, error)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                finished_at = excluded.finished_at,
                error = excluded.error
            "#,
            params![
                run.id,
                run.state.as_str(),
                run.started_at.to_rfc3339(),
                run.finished_at.map(|dt| dt.to_rfc3339()),
                run.error,
            ],
        )?;

        // Outcomes are rewritten wholesale; the run record is small.
        tx.execute("DELETE FROM run_outcomes WHERE run_id = ?", params![run.id])?;
        for outcome in &run.outcomes {
            tx.execute(
                r#"
                INSERT INTO run_outcomes (
                    run_id, source_id, kind, jobs_found, new_jobs,
                    updated_jobs, archived_jobs, error, deactivated
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    run.id,
                    outcome.source_id,
                    outcome.kind.as_str(),
                    outcome.jobs_found,
                    outcome.new_jobs,
                    outcome.updated_jobs,
                    outcome.archived_jobs,
                    outcome.error,
                    outcome.deactivated_source,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn active_run(&self) -> Result<Option<CrawlRun>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM crawl_runs WHERE state = 'running' LIMIT 1")?;
        let row = stmt.query_map([], Self::run_fields)?.next();

        match row {
            Some(row) => Ok(Some(Self::assemble_run(&conn, row?)?)),
            None => Ok(None),
        }
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<CrawlRun>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM crawl_runs ORDER BY started_at DESC LIMIT ?")?;
        let rows = stmt
            .query_map(params![limit as i64], Self::run_fields)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut runs = Vec::with_capacity(rows.len());
        for fields in rows {
            runs.push(Self::assemble_run(&conn, fields)?);
        }
        Ok(runs)
    }

    async fn recent_outcomes(&self, source_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT o.kind, o.jobs_found
            FROM run_outcomes o
            JOIN crawl_runs r ON r.id = o.run_id
            WHERE o.source_id = ?1
            ORDER BY r.started_at DESC
            LIMIT ?2
            "#,
        )?;
        let mut records = stmt
            .query_map(params![source_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>("kind")?,
                    row.get::<_, u32>("jobs_found")?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(kind, jobs_found)| {
                OutcomeKind::from_str(&kind).map(|kind| RunRecord { kind, jobs_found })
            })
            .collect::<Vec<_>>();

        // Query returns newest first; the window wants oldest first.
        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdapterKind;
    use chrono::Utc;

    fn store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn posting(source_id: &str, fingerprint: &str) -> JobPosting {
        JobPosting {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            fingerprint: fingerprint.to_string(),
            title: "Engineer".into(),
            url: "https://acme.co/jobs/1".into(),
            location: None,
            description: None,
            posted_at: None,
            discovered_at: Utc::now(),
            last_seen_at: Utc::now(),
            missing_crawls: 0,
            archived: false,
        }
    }

    #[tokio::test]
    async fn test_source_round_trip() {
        let (_dir, store) = store();
        let source = Source::new(
            "acme".into(),
            "Acme".into(),
            AdapterKind::GuestSearch,
            serde_json::json!({"url": "https://acme.co/search"}),
        );
        store.save_source(&source).await.unwrap();

        let loaded = store.get_source("acme").await.unwrap().unwrap();
        assert_eq!(loaded.kind, AdapterKind::GuestSearch);
        assert_eq!(loaded.config_str("url"), Some("https://acme.co/search"));
        assert!(loaded.active);
        assert!(store.get_source("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_posting_upsert_is_identity_scoped() {
        let (_dir, store) = store();
        let source = Source::new("acme".into(), "Acme".into(), AdapterKind::AtsJson, serde_json::json!({}));
        store.save_source(&source).await.unwrap();

        let mut first = posting("acme", "fp1");
        store.upsert_postings(std::slice::from_ref(&first)).await.unwrap();

        // Same identity, new row id: must update, not duplicate.
        first.id = uuid::Uuid::new_v4().to_string();
        first.title = "Engineer II".into();
        store.upsert_postings(&[first]).await.unwrap();

        let postings = store.load_postings("acme").await.unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].title, "Engineer II");
    }

    #[tokio::test]
    async fn test_archive_is_soft() {
        let (_dir, store) = store();
        let source = Source::new("acme".into(), "Acme".into(), AdapterKind::AtsJson, serde_json::json!({}));
        store.save_source(&source).await.unwrap();
        let p = posting("acme", "fp1");
        let id = p.id.clone();
        store.upsert_postings(&[p]).await.unwrap();
        store.archive_postings(&[id]).await.unwrap();

        assert!(store.list_postings(Some("acme"), false).await.unwrap().is_empty());
        let all = store.list_postings(Some("acme"), true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].archived);
    }

    #[tokio::test]
    async fn test_run_persistence_and_active_lookup() {
        let (_dir, store) = store();
        let mut run = CrawlRun::start();
        store.save_run(&run).await.unwrap();
        assert!(store.active_run().await.unwrap().is_some());

        run.outcomes.push(SourceOutcome::failure(
            "acme",
            OutcomeKind::Timeout,
            "deadline".into(),
        ));
        run.finalize(RunState::Completed);
        store.save_run(&run).await.unwrap();

        assert!(store.active_run().await.unwrap().is_none());
        let runs = store.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcomes.len(), 1);
        assert_eq!(runs[0].outcomes[0].kind, OutcomeKind::Timeout);
    }

    #[tokio::test]
    async fn test_recent_outcomes_oldest_first() {
        let (_dir, store) = store();
        for (i, kind) in [OutcomeKind::Empty, OutcomeKind::Success].iter().enumerate() {
            let mut run = CrawlRun::start();
            run.started_at = Utc::now() + chrono::Duration::seconds(i as i64);
            run.outcomes.push(SourceOutcome {
                source_id: "acme".into(),
                kind: *kind,
                jobs_found: i as u32,
                new_jobs: 0,
                updated_jobs: 0,
                archived_jobs: 0,
                error: None,
                deactivated_source: false,
            });
            run.finalize(RunState::Completed);
            store.save_run(&run).await.unwrap();
        }

        let records = store.recent_outcomes("acme", 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, OutcomeKind::Empty);
        assert_eq!(records[1].kind, OutcomeKind::Success);
    }
}
