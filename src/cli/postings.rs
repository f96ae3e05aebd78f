//! Posting listing command.

use console::style;

use crate::config::Settings;
use crate::repository::JobStore;

use super::helpers::{open_store, truncate};

/// List postings, newest first.
pub async fn cmd_postings(
    settings: &Settings,
    source_id: Option<&str>,
    include_archived: bool,
    limit: usize,
) -> anyhow::Result<()> {
    let store = open_store(&settings.database.path)?;
    let mut postings = store.list_postings(source_id, include_archived).await?;
    postings.truncate(limit);

    if postings.is_empty() {
        println!("{} No postings found.", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Job Postings").bold());
    println!("{}", "-".repeat(100));
    println!(
        "{:<32} {:<14} {:<18} {:<12} URL",
        "Title", "Source", "Location", "Discovered"
    );
    println!("{}", "-".repeat(100));

    for posting in &postings {
        let location = posting.location.as_deref().unwrap_or("-");
        let marker = if posting.archived { " [archived]" } else { "" };
        println!(
            "{:<32} {:<14} {:<18} {:<12} {}{}",
            truncate(&posting.title, 31),
            truncate(&posting.source_id, 13),
            truncate(location, 17),
            posting.discovered_at.format("%Y-%m-%d"),
            posting.url,
            marker
        );
    }

    println!("\n{} postings", postings.len());
    Ok(())
}
