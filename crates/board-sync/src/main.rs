//! CLI for board-sync
//!
//! Run `board-sync --help` for usage information. All project settings come
//! from environment variables (see `Config`).

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use anyhow::{Context, Result};
use board_sync::{sync, Config};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "board-sync")]
#[command(about = "Sync GitHub project epics and user stories into wiki tables")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the project and write the summary (OUTPUT_FORMAT, OUTPUT_FILE)
    Export,

    /// Fetch the project and write one Markdown fragment per epic (FRAGMENTS_DIR)
    Fragments,

    /// Fetch the project and update the generated regions of WIKI_PAGE
    Wiki,

    /// Merge existing fragment files from FRAGMENTS_DIR into WIKI_PAGE, offline
    Merge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Export => {
            let summary = sync::run_export(&config)
                .await
                .context("Export failed")?;
            println!(
                "✅ Wrote {} ({} epics, {} user stories, {} orphans)",
                config.output_file.display(),
                summary.stats.total_epics,
                summary.stats.total_user_stories,
                summary.stats.orphan_user_stories
            );
        }
        Commands::Fragments => {
            let fragments = sync::run_fragments(&config)
                .await
                .context("Fragment generation failed")?;
            println!("✅ Wrote {} fragment(s)", fragments.len());
        }
        Commands::Wiki => {
            let report = sync::run_wiki(&config)
                .await
                .context("Wiki update failed")?;
            print_report(&report);
        }
        Commands::Merge => {
            let report = sync::run_merge(&config)
                .await
                .context("Wiki merge failed")?;
            print_report(&report);
        }
    }

    Ok(())
}

fn print_report(report: &board_sync::markers::MergeReport) {
    println!(
        "✅ Wiki regions: {} replaced, {} appended, {} skipped",
        report.replaced.len(),
        report.appended.len(),
        report.skipped.len()
    );
}
