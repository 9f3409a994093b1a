mod config;
mod error;
mod ids;
mod ingest;
mod models;
mod normalize;
mod orchestrator;
mod sources;
mod storage;
mod utils;

use std::ffi::OsString;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::ingest::Job;
use crate::models::TableCounts;
use crate::storage::{MemoryStore, PgStore, RunRecord, Store};
use crate::utils::{fmt_count, fmt_duration};

#[derive(Parser)]
#[command(
    name = "sportslab-sync",
    about = "Sports data ingestion into the SportsLab database",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write into an in-memory store and print its row counts
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Job(Job),

    /// Run the configured job phases, one child process per job
    Sync {
        /// Also run the detail phase
        #[arg(long)]
        detail: bool,
    },

    /// Apply schema migrations
    Migrate,

    /// Show row counts per table
    Stats,
}

fn print_counts(title: &str, counts: &TableCounts) {
    println!("─────────────────────────────────");
    println!("  {}", title);
    println!("─────────────────────────────────");
    for (label, n) in counts.rows() {
        println!("  {:<13}: {}", label, fmt_count(u64::try_from(n).unwrap_or_default()));
    }
    println!("─────────────────────────────────");
}

fn print_runs(runs: &[RunRecord]) {
    for run in runs {
        let took = run.took().map_or("open".to_string(), fmt_duration);
        match &run.summary {
            Some(s) => println!(
                "  run #{} {} ({}): {} units, {} rows, {} errors{}",
                run.id,
                run.job,
                took,
                s.units,
                s.rows,
                s.errors,
                s.error_msg.as_deref().map(|m| format!(" [{m}]")).unwrap_or_default()
            ),
            None => println!("  run #{} {} ({})", run.id, run.job, took),
        }
    }
}

async fn connect(config: &AppConfig) -> Result<PgStore> {
    let store = PgStore::connect(&config.database).await?;
    store.run_migrations().await?;
    Ok(store)
}

/// Flags every child of `sync` inherits.
fn child_flags(cli: &Cli) -> Vec<OsString> {
    let mut flags = Vec::new();
    if cli.verbose > 0 {
        flags.push(format!("-{}", "v".repeat(cli.verbose as usize)).into());
    }
    if cli.dry_run {
        flags.push("--dry-run".into());
    }
    flags
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "sportslab_sync=info,warn",
        1 => "sportslab_sync=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    match &cli.command {
        Command::Job(job) => {
            if cli.dry_run {
                let store = MemoryStore::new();
                ingest::run(job, &config, &store).await?;
                print_counts("Dry run: rows in memory", &store.counts().await?);
                print_runs(&store.runs()?);
            } else {
                let store = connect(&config).await?;
                ingest::run(job, &config, &store).await?;
            }
        }

        Command::Sync { detail } => {
            let include_detail = *detail || config.sync.include_detail;
            let report =
                orchestrator::sync(&config.sync, include_detail, &child_flags(&cli)).await?;
            info!("sync: {} passed, {} failed", report.passed, report.failed);
        }

        Command::Migrate => {
            connect(&config).await?;
            println!("Migrations applied.");
        }

        Command::Stats => {
            let store = connect(&config).await?;
            print_counts("SportsLab: database stats", &store.counts().await?);
        }
    }

    Ok(())
}
