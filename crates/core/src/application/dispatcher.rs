// Notification Dispatcher
// Decides whether the mail job runs for a diff, and runs it

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::domain::{
    CommandTemplate, DiffResult, DispatchOutcome, JobKind, JobSpec, LogKind, NotificationConfig,
    RunStamp, SkipReason, SnapshotRef, TemplateVars,
};
use crate::error::Result;
use crate::port::{ExecutionStatus, JobExecutor};
use crate::shutdown::ShutdownToken;

/// How to invoke the mail job
#[derive(Debug, Clone)]
pub struct MailJobConfig {
    pub job_name_prefix: String,
    pub template: CommandTemplate,
    pub image: String,
    /// Key-value file the mail job reads its transport settings from
    pub config_file: PathBuf,
    pub subject_prefix: String,
    pub logs_dir: PathBuf,
    pub timeout: Option<Duration>,
}

pub struct NotificationDispatcher {
    executor: Arc<dyn JobExecutor>,
    notification: Option<NotificationConfig>,
    config: MailJobConfig,
    dry_run: bool,
}

impl NotificationDispatcher {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        notification: Option<NotificationConfig>,
        config: MailJobConfig,
    ) -> Self {
        Self {
            executor,
            notification,
            config,
            dry_run: false,
        }
    }

    /// Compute everything but never invoke the mail job
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.notification.is_some()
    }

    /// `<prefix> YYYY-MM-DD HH:MM`
    pub fn subject(&self, stamp: &RunStamp) -> String {
        format!("{} {}", self.config.subject_prefix, stamp.display_minutes())
    }

    pub fn mail_spec(&self, snapshot: &SnapshotRef, stamp: &RunStamp) -> Result<JobSpec> {
        let name = JobKind::Notify.job_name(&self.config.job_name_prefix, stamp);
        let results_dir = snapshot
            .path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let vars = TemplateVars::new()
            .with("job_name", name.clone())
            .with("stamp", stamp.to_string())
            .with("image", self.config.image.clone())
            .with("snapshot", snapshot.path.display().to_string())
            .with("snapshot_name", snapshot.file_name.clone())
            .with("results_dir", results_dir)
            .with("subject", self.subject(stamp))
            .with("config_file", self.config.config_file.display().to_string());

        let log_path = self.config.logs_dir.join(LogKind::Notify.file_name(stamp));
        Ok(JobSpec::from_template(JobKind::Notify, name, &self.config.template, &vars, log_path)?
            .with_input(snapshot.path.clone())
            .with_timeout(self.config.timeout))
    }

    /// Send, skip or fail. Never returns an error: a failure is an outcome
    /// the orchestrator must surface. A mail job stopped by `shutdown` is a
    /// failure too.
    pub async fn dispatch(
        &self,
        diff: &DiffResult,
        snapshot: &SnapshotRef,
        stamp: &RunStamp,
        shutdown: &ShutdownToken,
    ) -> DispatchOutcome {
        let Some(notification) = &self.notification else {
            info!(should_notify = diff.should_notify, "Notification not configured, skipping");
            return DispatchOutcome::Skipped(SkipReason::NotConfigured);
        };

        if !diff.should_notify {
            info!(reason = %diff.reason, "Nothing to notify");
            return DispatchOutcome::Skipped(SkipReason::NothingNew);
        }

        let spec = match self.mail_spec(snapshot, stamp) {
            Ok(spec) => spec,
            Err(e) => {
                error!(error = %e, "Cannot build mail job");
                return DispatchOutcome::Failed {
                    exit_code: None,
                    output: e.to_string(),
                };
            }
        };

        if self.dry_run {
            info!(
                reason = %diff.reason,
                command = %spec.command_line(),
                "Dry run, mail job not started"
            );
            return DispatchOutcome::Skipped(SkipReason::DryRun);
        }

        info!(
            to = %notification.to_addr,
            reason = %diff.reason,
            snapshot = %snapshot.file_name,
            subject = %self.subject(stamp),
            "Sending notification"
        );

        if let Err(e) = self.executor.verify(&spec).await {
            error!(error = %e, "Mail job unavailable");
            return DispatchOutcome::Failed {
                exit_code: None,
                output: e.to_string(),
            };
        }

        match self.executor.execute(&spec, shutdown).await {
            Ok(result) if result.status == ExecutionStatus::Success => {
                info!(job = %spec.name, duration_ms = result.duration_ms, "Notification sent");
                DispatchOutcome::Sent
            }
            Ok(result) => {
                error!(
                    job = %spec.name,
                    exit_code = ?result.exit_code,
                    output = %result.output,
                    "Mail job failed"
                );
                DispatchOutcome::Failed {
                    exit_code: result.exit_code,
                    output: result.output,
                }
            }
            Err(e) => {
                error!(job = %spec.name, error = %e, "Mail job could not run");
                DispatchOutcome::Failed {
                    exit_code: None,
                    output: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use crate::port::job_executor::mocks::MockJobExecutor;
    use crate::port::ExecutionError;
    use std::collections::HashMap;

    fn notification() -> Option<NotificationConfig> {
        let pairs: HashMap<String, String> = [
            ("DEFAULT_TO_ADDR", "ops@example.com"),
            ("SMTP_USER", "bot"),
            ("SMTP_PASS", "secret"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        NotificationConfig::from_pairs(&pairs)
    }

    fn config() -> MailJobConfig {
        MailJobConfig {
            job_name_prefix: "ur-net".to_string(),
            template: CommandTemplate::new(
                "docker",
                ["run", "--name", "{job_name}", "{image}", "/app/results/{snapshot_name}", "{subject}"],
            ),
            image: "ur-net-checker".to_string(),
            config_file: PathBuf::from("/data/.env"),
            subject_prefix: "UR-NET vacancy report".to_string(),
            logs_dir: PathBuf::from("/data/logs"),
            timeout: None,
        }
    }

    fn stamp() -> RunStamp {
        RunStamp::parse("20251006_231825").unwrap()
    }

    fn snapshot_ref() -> SnapshotRef {
        SnapshotRef {
            path: PathBuf::from("/data/results/ur_net_results_20251006_231825.json"),
            file_name: "ur_net_results_20251006_231825.json".to_string(),
            stamp: stamp(),
            modified_millis: 0,
            size_bytes: 10,
        }
    }

    fn notify_worthy() -> DiffResult {
        let current = Snapshot {
            timestamp: String::new(),
            summary: None,
            results: vec![],
        };
        DiffResult::first_run(&current, true)
    }

    fn quiet() -> DiffResult {
        let mut diff = notify_worthy();
        diff.should_notify = false;
        diff
    }

    #[tokio::test]
    async fn test_unconfigured_always_skips() {
        let executor = Arc::new(MockJobExecutor::new_success());
        let dispatcher = NotificationDispatcher::new(executor.clone(), None, config());

        for diff in [notify_worthy(), quiet()] {
            let outcome = dispatcher.dispatch(&diff, &snapshot_ref(), &stamp(), &ShutdownToken::never()).await;
            assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::NotConfigured));
        }
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_quiet_diff_skips_without_side_effects() {
        let executor = Arc::new(MockJobExecutor::new_success());
        let dispatcher = NotificationDispatcher::new(executor.clone(), notification(), config());

        let outcome = dispatcher.dispatch(&quiet(), &snapshot_ref(), &stamp(), &ShutdownToken::never()).await;
        assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::NothingNew));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sends_with_subject_and_snapshot() {
        let executor = Arc::new(MockJobExecutor::new_success());
        let dispatcher = NotificationDispatcher::new(executor.clone(), notification(), config());

        let outcome = dispatcher.dispatch(&notify_worthy(), &snapshot_ref(), &stamp(), &ShutdownToken::never()).await;
        assert_eq!(outcome, DispatchOutcome::Sent);

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "ur-net-notify-20251006_231825");
        assert_eq!(
            calls[0].args[4],
            "/app/results/ur_net_results_20251006_231825.json"
        );
        assert_eq!(calls[0].args[5], "UR-NET vacancy report 2025-10-06 23:18");
        assert_eq!(calls[0].log_path, PathBuf::from("/data/logs/notify_20251006_231825.log"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let executor = Arc::new(MockJobExecutor::new_success().with_exit_code(JobKind::Notify, 1));
        let dispatcher = NotificationDispatcher::new(executor, notification(), config());

        let outcome = dispatcher.dispatch(&notify_worthy(), &snapshot_ref(), &stamp(), &ShutdownToken::never()).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Failed {
                exit_code: Some(1),
                output: "mock notify output".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_spawn_error_fails() {
        let executor = Arc::new(
            MockJobExecutor::new_success().with_execute_error(ExecutionError::SpawnFailed("docker".to_string())),
        );
        let dispatcher = NotificationDispatcher::new(executor, notification(), config());

        let outcome = dispatcher.dispatch(&notify_worthy(), &snapshot_ref(), &stamp(), &ShutdownToken::never()).await;
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_dry_run_never_executes() {
        let executor = Arc::new(MockJobExecutor::new_success());
        let dispatcher = NotificationDispatcher::new(executor.clone(), notification(), config()).with_dry_run(true);

        let outcome = dispatcher.dispatch(&notify_worthy(), &snapshot_ref(), &stamp(), &ShutdownToken::never()).await;
        assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::DryRun));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_mail_job() {
        let executor = Arc::new(MockJobExecutor::new_success().hanging(JobKind::Notify));
        let dispatcher = NotificationDispatcher::new(executor.clone(), notification(), config());
        let (tx, token) = crate::shutdown::shutdown_channel();
        tx.shutdown();

        let outcome = dispatcher.dispatch(&notify_worthy(), &snapshot_ref(), &stamp(), &token).await;
        assert!(outcome.is_failed());
        assert_eq!(executor.interrupted(), vec![JobKind::Notify]);
    }
}
