//! CLI parser and command dispatch.

mod crawl;
mod helpers;
mod init;
mod postings;
mod runs;
mod source;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "jobscout")]
#[command(about = "Job posting harvester")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and write a default config file
    Init,

    /// Manage job sources
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },

    /// Crawl sources and reconcile postings
    Crawl {
        /// Source IDs to crawl (all active sources if not specified)
        source_ids: Vec<String>,
        /// Number of fetch workers (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// List recent crawl runs
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List job postings
    Postings {
        /// Source ID to filter by
        #[arg(short, long)]
        source: Option<String>,
        /// Include archived postings
        #[arg(short, long)]
        all: bool,
        /// Limit number of results
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// Add a source
    Add {
        /// Source ID (short slug, e.g. "acme-greenhouse")
        id: String,
        /// Human-readable name
        #[arg(short, long)]
        name: Option<String>,
        /// Adapter kind: ats-json, guest-search, or ai-assisted-html
        #[arg(short, long)]
        kind: String,
        /// Adapter config as JSON (e.g. '{"vendor":"greenhouse","slug":"acme"}')
        #[arg(long, default_value = "{}")]
        config: String,
    },
    /// List configured sources
    List,
    /// Re-activate a source and reset its failure counters
    Enable { id: String },
    /// Deactivate a source
    Disable { id: String },
    /// Remove a source and its postings
    Remove { id: String },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Source { command } => match command {
            SourceCommands::Add {
                id,
                name,
                kind,
                config,
            } => source::cmd_source_add(&settings, &id, name.as_deref(), &kind, &config).await,
            SourceCommands::List => source::cmd_source_list(&settings).await,
            SourceCommands::Enable { id } => source::cmd_source_set_active(&settings, &id, true).await,
            SourceCommands::Disable { id } => {
                source::cmd_source_set_active(&settings, &id, false).await
            }
            SourceCommands::Remove { id } => source::cmd_source_remove(&settings, &id).await,
        },
        Commands::Crawl {
            source_ids,
            workers,
        } => crawl::cmd_crawl(&settings, source_ids, workers).await,
        Commands::Runs { limit } => runs::cmd_runs(&settings, limit).await,
        Commands::Postings {
            source,
            all,
            limit,
        } => postings::cmd_postings(&settings, source.as_deref(), all, limit).await,
    }
}
