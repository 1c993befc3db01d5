// Composition root and subcommand handlers
use anyhow::{Context, Result};
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::{error, info, warn, Instrument};

use vacancy_watch_core::application::{
    shutdown_channel, ChangeDetector, CheckJobConfig, ExclusionGuard, JobRunner, MailJobConfig,
    NotificationDispatcher, Orchestrator, RetentionPolicy, RetentionSweeper, RetryPolicy, RunOutcome,
    ShutdownSender,
};
use vacancy_watch_core::domain::{
    DiffResult, JobKind, ListingChange, RunStamp, SnapshotRef, TemplateVars,
};
use vacancy_watch_core::port::{IdProvider, SnapshotStore, TimeProvider};
use vacancy_watch_infra_fs::{FsArtifactStore, FsSnapshotStore, PidLockFile};
use vacancy_watch_infra_system::{ProcessProbeImpl, SubprocessExecutor};

use crate::settings::{load_notification, Settings};

/// How the process should exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    Failure,
    Interrupted,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Exit::Success => 0,
            Exit::Failure => 1,
            Exit::Interrupted => 130,
        }
    }
}

/// Fully wired services for one invocation
pub struct Watcher {
    snapshots: Arc<FsSnapshotStore>,
    orchestrator: Orchestrator,
    /// Correlates all log lines of one run
    run_ids: Arc<dyn IdProvider>,
}

impl Watcher {
    pub async fn build(
        settings: &Settings,
        time: Arc<dyn TimeProvider>,
        run_ids: Arc<dyn IdProvider>,
        dry_run: bool,
    ) -> Result<Self> {
        // 1. Filesystem adapters
        let snapshots = Arc::new(FsSnapshotStore::new(&settings.results_dir, &settings.snapshot_prefix));
        snapshots
            .ensure_dir()
            .await
            .with_context(|| format!("Cannot create {}", settings.results_dir.display()))?;
        let lock_file = Arc::new(PidLockFile::new(&settings.lock_path));
        let artifacts = Arc::new(FsArtifactStore::new(
            &settings.results_dir,
            &settings.logs_dir,
            &settings.snapshot_prefix,
        ));

        // 2. Process adapters
        let mut executor = SubprocessExecutor::new(time.clone(), settings.env_allowlist.clone());
        if let Some(probe) = &settings.availability_probe {
            let vars = TemplateVars::new().with("image", settings.image.clone());
            let (program, args) = probe.render(&vars).context("Invalid availability probe")?;
            executor = executor.with_availability_probe(program, args);
        }
        let executor = Arc::new(executor);
        let process_probe = Arc::new(ProcessProbeImpl::new(time.clone()));

        // 3. Notification settings (absent = notification disabled)
        let notification = load_notification(&settings.notify_config_file)?;
        if notification.is_none() {
            info!(
                file = %settings.notify_config_file.display(),
                "Notification destination or credentials missing, mail job disabled"
            );
        }

        // 4. Application services
        let guard = ExclusionGuard::new(
            lock_file,
            process_probe,
            JobKind::all_companion_patterns(&settings.job_name_prefix),
        );
        let runner = JobRunner::new(
            executor.clone(),
            snapshots.clone(),
            time.clone(),
            RetryPolicy::fixed(settings.poll_attempts, settings.poll_delay()),
            CheckJobConfig {
                job_name_prefix: settings.job_name_prefix.clone(),
                template: settings.check_job.clone(),
                image: settings.image.clone(),
                catalogue: settings.catalogue.clone(),
                request_delay_secs: settings.request_delay_secs,
                logs_dir: settings.logs_dir.clone(),
                timeout: settings.job_timeout(),
            },
        );
        let detector = ChangeDetector::new(snapshots.clone(), settings.notify_on_first_run);
        let dispatcher = NotificationDispatcher::new(
            executor,
            notification,
            MailJobConfig {
                job_name_prefix: settings.job_name_prefix.clone(),
                template: settings.mail_job.clone(),
                image: settings.image.clone(),
                config_file: settings.notify_config_file.clone(),
                subject_prefix: settings.subject_prefix.clone(),
                logs_dir: settings.logs_dir.clone(),
                timeout: settings.job_timeout(),
            },
        )
        .with_dry_run(dry_run);
        let sweeper = RetentionSweeper::new(
            artifacts,
            time,
            RetentionPolicy {
                snapshot_days: settings.snapshot_retention_days,
                log_days: settings.log_retention_days,
            },
        );

        Ok(Self {
            snapshots,
            orchestrator: Orchestrator::new(guard, runner, detector, dispatcher, sweeper),
            run_ids,
        })
    }

    /// `run`: one exclusive cycle, interruptible by SIGINT/SIGTERM
    pub async fn run(&self, stamp: &RunStamp) -> Exit {
        let run_id = self.run_ids.generate_id();
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        spawn_signal_listener(shutdown_tx);

        let span = tracing::info_span!("run", run_id = %run_id, stamp = %stamp);
        let outcome = self
            .orchestrator
            .run_exclusive(stamp, shutdown_rx)
            .instrument(span)
            .await;

        match outcome {
            Ok(RunOutcome::Completed(report)) => {
                info!(
                    run_id = %run_id,
                    snapshot = %report.snapshot.file_name,
                    reason = %report.diff.reason,
                    dispatch = %report.dispatch,
                    swept = report.sweep.deleted.len(),
                    "Run finished"
                );
                Exit::Success
            }
            Ok(RunOutcome::Contended(contention)) => {
                info!(run_id = %run_id, reason = %contention, "Run skipped");
                Exit::Success
            }
            Ok(RunOutcome::Interrupted) => Exit::Interrupted,
            Err(e) => {
                match e.captured_output() {
                    Some(output) => error!(run_id = %run_id, error = %e, output = %output, "Run failed"),
                    None => error!(run_id = %run_id, error = %e, "Run failed"),
                }
                Exit::Failure
            }
        }
    }

    /// `diff`: latest snapshot against its predecessor, without running jobs
    pub async fn diff(&self) -> Result<Exit> {
        let Some((current, diff)) = self.orchestrator.detector().detect_latest().await? else {
            println!("No snapshots in {}", self.snapshots.location().display());
            return Ok(Exit::Success);
        };

        println!("{}", describe_diff(&current, &diff));
        if !diff.changes.is_empty() {
            println!("{}", Table::new(diff.changes.iter().map(ChangeRow::from)));
        }
        Ok(Exit::Success)
    }

    /// `sweep`: retention on demand, optionally with a one-off horizon
    pub async fn sweep(&self, days: Option<u32>) -> Result<Exit> {
        let sweeper = self.orchestrator.sweeper();
        let report = match days {
            Some(days) => sweeper.sweep_with(&RetentionPolicy::uniform(days)).await,
            None => sweeper.sweep().await,
        };

        for path in &report.deleted {
            println!("deleted  {}", path.display());
        }
        for path in &report.failed {
            println!("FAILED   {}", path.display());
        }
        println!(
            "{} deleted, {} failed, {} retained",
            report.deleted.len(),
            report.failed.len(),
            report.retained
        );

        Ok(if report.failed.is_empty() {
            Exit::Success
        } else {
            Exit::Failure
        })
    }

    /// `status`: lock holder, companion jobs and the latest snapshot
    pub async fn status(&self) -> Result<Exit> {
        let guard = self.orchestrator.guard();
        let mut rows = Vec::new();

        let lock = match guard.lock().holder()? {
            None => "free".to_string(),
            Some(holder) => match holder.pid {
                Some(pid) if holder.alive => format!("held by pid {pid}"),
                Some(pid) => format!("stale (pid {pid} not running)"),
                None => format!("corrupt token {:?}", holder.raw),
            },
        };
        rows.push(StatusRow::new("lock", lock));

        let companions = guard.active_companions();
        rows.push(StatusRow::new("running jobs", companions.len().to_string()));
        for companion in &companions {
            rows.push(StatusRow::new(format!("  pid {}", companion.pid), companion.command.clone()));
        }

        match self.snapshots.latest().await? {
            None => rows.push(StatusRow::new("latest snapshot", "none")),
            Some(latest) => {
                rows.push(StatusRow::new("latest snapshot", latest.file_name.clone()));
                match self.snapshots.load(&latest).await {
                    Ok(snapshot) => {
                        let summary = snapshot.effective_summary();
                        rows.push(StatusRow::new("properties checked", summary.total_checked.to_string()));
                        rows.push(StatusRow::new("vacant rooms", summary.total_vacant_rooms.to_string()));
                        rows.push(StatusRow::new(
                            "properties with vacancies",
                            summary.properties_with_vacancies.to_string(),
                        ));
                    }
                    Err(e) => {
                        warn!(snapshot = %latest.file_name, error = %e, "Latest snapshot unreadable");
                        rows.push(StatusRow::new("snapshot state", format!("unreadable: {e}")));
                    }
                }
            }
        }

        println!("{}", Table::new(rows));
        Ok(Exit::Success)
    }
}

#[derive(Tabled)]
struct ChangeRow {
    property: String,
    previous: u32,
    current: u32,
    change: &'static str,
    url: String,
}

impl From<&ListingChange> for ChangeRow {
    fn from(change: &ListingChange) -> Self {
        Self {
            property: change.property_name.clone(),
            previous: change.previous_vacant,
            current: change.current_vacant,
            change: change.kind.as_str(),
            url: change.url.clone(),
        }
    }
}

#[derive(Tabled)]
struct StatusRow {
    item: String,
    value: String,
}

impl StatusRow {
    fn new(item: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            value: value.into(),
        }
    }
}

fn describe_diff(current: &SnapshotRef, diff: &DiffResult) -> String {
    let previous = diff.previous_file.as_deref().unwrap_or("none");
    format!(
        "{} vs {}: {} ({} -> {} listings with vacancies, notify: {})",
        current.file_name,
        previous,
        diff.reason,
        diff.previous_vacant_count,
        diff.current_vacant_count,
        if diff.should_notify { "yes" } else { "no" }
    )
}

fn spawn_signal_listener(sender: ShutdownSender) {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Shutdown signal received");
        sender.shutdown();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
