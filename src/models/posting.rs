//! Job posting model.
//!
//! Postings are identified per source by a fingerprint over the normalized
//! URL and title, so re-sightings update metadata instead of creating rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One discovered opening, owned by exactly one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    /// Database identifier (UUID).
    pub id: String,
    /// Owning source.
    pub source_id: String,
    /// Identity within the source: hash of normalized URL + title.
    pub fingerprint: String,
    /// Posting title as reported by the source.
    pub title: String,
    /// Canonical URL (query string and fragment stripped).
    pub url: String,
    /// Location, if the source reports one.
    pub location: Option<String>,
    /// Raw description text, if available.
    pub description: Option<String>,
    /// When the source says the job was posted.
    pub posted_at: Option<DateTime<Utc>>,
    /// When we first saw this posting.
    pub discovered_at: DateTime<Utc>,
    /// When we last saw this posting in a crawl.
    pub last_seen_at: DateTime<Utc>,
    /// Consecutive crawls in which the source no longer reported it.
    pub missing_crawls: u32,
    /// Soft-deleted once missing_crawls crosses the archival threshold.
    pub archived: bool,
}

impl JobPosting {
    /// Record a fresh sighting: reset the absence counter and refresh metadata.
    pub fn mark_seen(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = now;
        self.missing_crawls = 0;
        self.archived = false;
    }
}
