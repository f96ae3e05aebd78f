//! Crawl command.

use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::adapters::DefaultAdapterFactory;
use crate::config::Settings;
use crate::llm::LlmClient;
use crate::models::{OutcomeKind, RunState};
use crate::render::HttpRenderer;
use crate::scheduler::{CancelToken, CrawlEvent, CrawlOptions, Orchestrator};

use super::helpers::open_store;

/// Run one crawl across the given sources (or all active ones).
pub async fn cmd_crawl(
    settings: &Settings,
    source_ids: Vec<String>,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    if let Some(workers) = workers {
        settings.crawl.workers = workers;
    }

    let store = Arc::new(open_store(&settings.database.path)?);
    let renderer = Arc::new(HttpRenderer::new(
        settings.crawl.source_timeout(),
        settings.crawl.request_delay(),
    ));
    let llm = Arc::new(LlmClient::new(settings.llm.clone())?);
    let factory = Arc::new(DefaultAdapterFactory::new(
        settings.crawl.clone(),
        renderer,
        llm,
    ));

    let orchestrator = Orchestrator::new(store, factory, settings);
    let options = CrawlOptions {
        source_ids: if source_ids.is_empty() {
            None
        } else {
            Some(source_ids)
        },
    };

    let cancel = CancelToken::new();
    let ctrlc_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling, letting in-flight fetches finish...");
            ctrlc_cancel.cancel();
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel::<CrawlEvent>(64);
    let progress = tokio::spawn(async move {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        while let Some(event) = event_rx.recv().await {
            match event {
                CrawlEvent::RunStarted { sources, .. } => {
                    pb.set_length(sources as u64);
                }
                CrawlEvent::SourceStarted { source_id } => {
                    pb.set_message(source_id);
                }
                CrawlEvent::SourceFetched {
                    source_id,
                    kind,
                    jobs_found,
                } => {
                    pb.inc(1);
                    pb.set_message(format!("{}: {} ({})", source_id, kind.as_str(), jobs_found));
                }
                CrawlEvent::RunFinished { .. } => {}
            }
        }
        pb.finish_and_clear();
    });

    let report = orchestrator.run(options, cancel, Some(event_tx)).await?;
    let _ = progress.await;

    let run = &report.run;
    let badge = match run.state {
        RunState::Completed => style("✓").green(),
        RunState::Cancelled => style("!").yellow(),
        _ => style("✗").red(),
    };
    println!(
        "\n{} Run {} {}: {} sources, {} jobs found, {} new, {} errors",
        badge,
        &run.id[..8],
        run.state.as_str(),
        run.outcomes.len(),
        run.total_found(),
        run.total_new(),
        run.error_count()
    );
    if let Some(error) = &run.error {
        println!("  {}", style(error).red());
    }

    for outcome in &run.outcomes {
        if matches!(outcome.kind, OutcomeKind::Success | OutcomeKind::Empty) {
            continue;
        }
        println!(
            "  {} {}: {} {}",
            style("✗").red(),
            outcome.source_id,
            outcome.kind.as_str(),
            outcome.error.as_deref().unwrap_or("")
        );
    }
    for source_id in &report.deactivated_sources {
        println!(
            "  {} Source '{}' deactivated; fix it and run 'jobscout source enable {}'",
            style("!").yellow(),
            source_id,
            source_id
        );
    }

    Ok(())
}
