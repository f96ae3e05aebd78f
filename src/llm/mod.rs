//! LLM integration for AI-assisted page extraction.

mod client;

pub use client::{ExtractedJob, LlmClient, LlmConfig, LlmError};
