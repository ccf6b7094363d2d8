use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tillsync")]
#[command(about = "Keep a point-of-sale terminal's database in sync with the shared store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile every tracked table (both directions unless a direction is given)
    Sync {
        #[command(subcommand)]
        direction: Option<SyncDirection>,
        /// Output the run report as JSON
        #[arg(long, global = true)]
        json: bool,
    },
    /// Show per-table sync status
    Status {
        /// Only show this table
        table: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget a table's watermark so the next pass rescans it
    Reset {
        /// Tracked table name
        table: String,
    },
    /// Run the background scheduler until interrupted
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Subcommand)]
pub enum SyncDirection {
    /// Push local changes to the remote store
    Push,
    /// Pull remote changes into the local database
    Pull,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}
