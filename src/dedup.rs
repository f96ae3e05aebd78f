//! Per-source posting reconciliation.
//!
//! Pure component: takes the stored postings for a source plus the
//! candidates from the current crawl and decides which are new, updated,
//! unchanged, or absent. Persistence is the caller's job.
//!
//! Identity is a SHA-256 fingerprint over the normalized URL and title, so
//! tracking parameters (`?utm_source=...`) never create duplicate rows.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use crate::adapters::RawCandidate;
use crate::models::JobPosting;

/// Lowercase a URL and strip its query string and fragment.
///
/// Falls back to a trimmed lowercase of the input when it does not parse;
/// adapters should have rejected those already.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string().to_lowercase()
        }
        Err(_) => url.trim().to_lowercase(),
    }
}

/// Lowercase a title and collapse runs of whitespace to single spaces.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Compute the posting fingerprint for a URL/title pair.
pub fn fingerprint(url: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_url(url).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_title(title).as_bytes());
    hex::encode(hasher.finalize())
}

/// Result of reconciling one source's crawl against its stored postings.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// First sightings: rows to create.
    pub new: Vec<JobPosting>,
    /// Re-sightings whose content changed: rows to refresh.
    pub updated: Vec<JobPosting>,
    /// Re-sightings with identical content (absence counters reset).
    pub unchanged: Vec<JobPosting>,
    /// Stored postings absent from this crawl, still below the threshold.
    pub missing: Vec<JobPosting>,
    /// Stored postings whose absence crossed the threshold: to archive.
    pub archived: Vec<JobPosting>,
}

impl ReconcileOutcome {
    pub fn unchanged_count(&self) -> usize {
        self.unchanged.len()
    }
}

/// Reconcile crawl candidates against existing postings for one source.
///
/// `archive_after_missing` is the injected absence threshold: a posting
/// absent for exactly that many consecutive crawls is archived on the last
/// of them, not before. Already-archived postings are left untouched.
pub fn reconcile(
    source_id: &str,
    existing: &[JobPosting],
    candidates: &[RawCandidate],
    archive_after_missing: u32,
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let mut by_fingerprint: HashMap<String, &JobPosting> = existing
        .iter()
        .map(|p| (p.fingerprint.clone(), p))
        .collect();

    let mut outcome = ReconcileOutcome::default();
    let mut seen_this_batch: HashMap<String, ()> = HashMap::new();

    for candidate in candidates {
        let fp = fingerprint(&candidate.url, &candidate.title);

        // A source sometimes lists the same opening twice in one response.
        if seen_this_batch.insert(fp.clone(), ()).is_some() {
            continue;
        }

        match by_fingerprint.remove(&fp) {
            Some(current) => {
                let mut posting = current.clone();
                let was_dormant = posting.missing_crawls > 0 || posting.archived;
                // Title variants that normalize to the same fingerprint are
                // still content changes worth persisting.
                let content_changed = posting.title != candidate.title
                    || posting.location != candidate.location
                    || posting.description != candidate.description
                    || posting.posted_at != candidate.posted_at;

                posting.mark_seen(now);
                if content_changed {
                    posting.title = candidate.title.clone();
                    posting.location = candidate.location.clone();
                    posting.description = candidate.description.clone();
                    posting.posted_at = candidate.posted_at;
                    outcome.updated.push(posting);
                } else if was_dormant {
                    // Counter reset must be persisted even though content is the same.
                    outcome.updated.push(posting);
                } else {
                    outcome.unchanged.push(posting);
                }
            }
            None => {
                outcome.new.push(JobPosting {
                    id: uuid::Uuid::new_v4().to_string(),
                    source_id: source_id.to_string(),
                    fingerprint: fp,
                    title: candidate.title.clone(),
                    url: normalize_url(&candidate.url),
                    location: candidate.location.clone(),
                    description: candidate.description.clone(),
                    posted_at: candidate.posted_at,
                    discovered_at: now,
                    last_seen_at: now,
                    missing_crawls: 0,
                    archived: false,
                });
            }
        }
    }

    // Whatever is left in the map was not reported by this crawl.
    for posting in by_fingerprint.into_values() {
        if posting.archived {
            continue;
        }
        let mut absent = posting.clone();
        absent.missing_crawls += 1;
        if absent.missing_crawls >= archive_after_missing {
            absent.archived = true;
            outcome.archived.push(absent);
        } else {
            outcome.missing.push(absent);
        }
    }

    outcome
}
