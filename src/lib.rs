//! jobscout - job posting harvester.
//!
//! Crawls applicant tracking system feeds, guest search endpoints, and
//! rendered career pages, deduplicates what comes back, and tracks how
//! reliable each source is over time.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod health;
pub mod llm;
pub mod models;
pub mod render;
pub mod repository;
pub mod scheduler;
