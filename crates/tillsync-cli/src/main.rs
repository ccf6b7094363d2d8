//! tillsync CLI - operate the sync engine of a point-of-sale terminal
//!
//! Usage:
//!   tillsync sync              # Push and pull every tracked table
//!   tillsync sync push         # Push local changes only
//!   tillsync status --json     # Per-table watermarks and pending counts
//!   tillsync reset products    # Force a rescan of one table
//!   tillsync watch             # Run the background scheduler

mod cli;
mod commands;
mod error;


use clap::Parser;
use tillsync_core::config::SyncSettings;

use crate::cli::{Cli, Commands};
use crate::commands::common::{open_engine, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::reset::run_reset;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "tillsync=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let settings = SyncSettings::from_env()?;
    let db_path = resolve_db_path(cli.db_path, &settings);
    let engine = open_engine(&settings, &db_path).await?;

    match cli.command {
        Commands::Sync { direction, json } => run_sync(&engine, direction, json).await?,
        Commands::Status { table, json } => run_status(&engine, table.as_deref(), json).await?,
        Commands::Reset { table } => {
            run_reset(&engine, &table).await?;
        }
        Commands::Watch => run_watch(&engine, settings.schedule).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
