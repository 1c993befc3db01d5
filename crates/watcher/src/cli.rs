use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vacancy-watch")]
#[command(about = "Periodic UR-NET vacancy checker with change notifications", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (TOML)
    #[arg(long, global = true, env = "VACANCY_WATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the snapshot directory
    #[arg(long, global = true)]
    pub results_dir: Option<PathBuf>,

    /// Override the log directory
    #[arg(long, global = true)]
    pub logs_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run one check, diff and notification cycle
    Run {
        /// Compute the diff but never start the mail job
        #[arg(long)]
        dry_run: bool,
    },

    /// Compare the latest snapshot with its predecessor
    Diff,

    /// Delete snapshots and logs past the retention horizon
    Sweep {
        /// Horizon in days for both snapshots and logs
        #[arg(long)]
        days: Option<u32>,
    },

    /// Show lock holder, running jobs and the latest snapshot
    Status,
}
