//! Run history command.

use console::style;

use crate::config::Settings;
use crate::repository::JobStore;

use super::helpers::open_store;

/// List recent crawl runs, newest first.
pub async fn cmd_runs(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let store = open_store(&settings.database.path)?;
    let runs = store.list_runs(limit).await?;

    if runs.is_empty() {
        println!("{} No runs yet. Run 'jobscout crawl' first.", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Crawl Runs").bold());
    println!("{}", "-".repeat(72));
    println!(
        "{:<10} {:<11} {:<17} {:>8} {:>6} {:>6} {:>7}",
        "Run", "State", "Started", "Sources", "Found", "New", "Errors"
    );
    println!("{}", "-".repeat(72));

    for run in runs {
        println!(
            "{:<10} {:<11} {:<17} {:>8} {:>6} {:>6} {:>7}",
            &run.id[..8],
            run.state.as_str(),
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.outcomes.len(),
            run.total_found(),
            run.total_new(),
            run.error_count()
        );
    }

    Ok(())
}
