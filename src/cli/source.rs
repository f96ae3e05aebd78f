//! Source management commands.

use console::style;

use crate::config::Settings;
use crate::models::{AdapterKind, Source};
use crate::repository::JobStore;

use super::helpers::{open_store, truncate};

/// Add a source.
pub async fn cmd_source_add(
    settings: &Settings,
    id: &str,
    name: Option<&str>,
    kind: &str,
    config: &str,
) -> anyhow::Result<()> {
    let store = open_store(&settings.database.path)?;

    let kind = AdapterKind::from_str(kind).ok_or_else(|| {
        anyhow::anyhow!("unknown adapter kind '{}' (expected ats-json, guest-search, or ai-assisted-html)", kind)
    })?;
    let config: serde_json::Value = serde_json::from_str(config)
        .map_err(|e| anyhow::anyhow!("invalid adapter config JSON: {}", e))?;

    if store.get_source(id).await?.is_some() {
        println!("{} Source '{}' already exists", style("✗").red(), id);
        return Ok(());
    }

    let source = Source::new(
        id.to_string(),
        name.unwrap_or(id).to_string(),
        kind,
        config,
    );
    store.save_source(&source).await?;

    println!(
        "{} Added source '{}' ({})",
        style("✓").green(),
        source.id,
        source.kind.as_str()
    );
    Ok(())
}

/// List configured sources.
pub async fn cmd_source_list(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(&settings.database.path)?;
    let sources = store.list_sources().await?;

    if sources.is_empty() {
        println!(
            "{} No sources configured. Run 'jobscout source add' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    println!("\n{}", style("Job Sources").bold());
    println!("{}", "-".repeat(78));
    println!(
        "{:<18} {:<22} {:<16} {:<8} {:>6} Last Crawled",
        "ID", "Name", "Kind", "Active", "Score"
    );
    println!("{}", "-".repeat(78));

    for source in sources {
        let last_crawled = source
            .last_crawled
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "Never".to_string());

        println!(
            "{:<18} {:<22} {:<16} {:<8} {:>6.2} {}",
            truncate(&source.id, 17),
            truncate(&source.name, 21),
            source.kind.as_str(),
            if source.active { "yes" } else { "no" },
            source.priority_score,
            last_crawled
        );
    }

    Ok(())
}

/// Enable or disable a source. Enabling resets the failure counters so the
/// source gets a fresh grace period.
pub async fn cmd_source_set_active(
    settings: &Settings,
    id: &str,
    active: bool,
) -> anyhow::Result<()> {
    let store = open_store(&settings.database.path)?;

    let Some(mut source) = store.get_source(id).await? else {
        println!("{} Source '{}' not found", style("✗").red(), id);
        return Ok(());
    };

    source.active = active;
    if active {
        source.consecutive_failures = 0;
        source.consecutive_empty = 0;
    }
    store.save_source(&source).await?;

    let verb = if active { "Enabled" } else { "Disabled" };
    println!("{} {} source '{}'", style("✓").green(), verb, id);
    Ok(())
}

/// Remove a source and everything discovered from it.
pub async fn cmd_source_remove(settings: &Settings, id: &str) -> anyhow::Result<()> {
    let store = open_store(&settings.database.path)?;

    if store.delete_source(id).await? {
        println!("{} Removed source '{}'", style("✓").green(), id);
    } else {
        println!("{} Source '{}' not found", style("✗").red(), id);
    }
    Ok(())
}
