//! Data models for sources, postings, and crawl runs.

mod posting;
mod run;
mod source;

pub use posting::JobPosting;
pub use run::{CrawlRun, OutcomeKind, RunState, SourceOutcome};
pub use source::{AdapterKind, Source};
