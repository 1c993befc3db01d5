//! Vacancy Watch - Main Entry Point
//! One invocation per cron tick: check, diff, notify, sweep

mod cli;
mod commands;
mod logging;
mod settings;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use vacancy_watch_core::domain::{LogKind, RunStamp};
use vacancy_watch_core::port::{SystemTimeProvider, TimeProvider, UuidProvider};

use crate::cli::{Cli, Commands};
use crate::commands::{Exit, Watcher};
use crate::logging::LogFormat;
use crate::settings::{Overrides, Settings};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 1. Load configuration (logging is not up yet, report to stderr)
    let settings = match Settings::load(&Overrides {
        config_file: cli.config.clone(),
        results_dir: cli.results_dir.clone(),
        logs_dir: cli.logs_dir.clone(),
    }) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("vacancy-watch: {e:#}");
            return ExitCode::from(Exit::Failure.code());
        }
    };

    // 2. Initialize logging; only `run` gets a per-run log file
    let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let stamp = RunStamp::new(time.now_local().naive_local());
    let run_log = matches!(cli.command, Commands::Run { .. })
        .then(|| settings.logs_dir.join(LogKind::Run.file_name(&stamp)));

    let _log_guard = match logging::init(LogFormat::from_env(), run_log.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("vacancy-watch: {e:#}");
            return ExitCode::from(Exit::Failure.code());
        }
    };

    info!(version = VERSION, command = ?cli.command, "Vacancy Watch starting");

    // 3. Wire dependencies and dispatch
    let exit = match execute(cli.command, &settings, time, &stamp).await {
        Ok(exit) => exit,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Command failed");
            Exit::Failure
        }
    };

    ExitCode::from(exit.code())
}

async fn execute(
    command: Commands,
    settings: &Settings,
    time: Arc<dyn TimeProvider>,
    stamp: &RunStamp,
) -> anyhow::Result<Exit> {
    let dry_run = matches!(command, Commands::Run { dry_run: true });
    let watcher = Watcher::build(settings, time, Arc::new(UuidProvider), dry_run).await?;

    match command {
        Commands::Run { .. } => Ok(watcher.run(stamp).await),
        Commands::Diff => watcher.diff().await,
        Commands::Sweep { days } => watcher.sweep(days).await,
        Commands::Status => watcher.status().await,
    }
}
