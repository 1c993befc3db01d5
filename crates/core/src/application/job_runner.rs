// Job Runner
//
// Runs the external check job, then waits (bounded) for its snapshot to
// materialize in the store. The job may flush its output after it exits, so
// a missing snapshot right after exit is not yet a failure.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::retry::{PollOutcome, RetryPolicy};
use crate::domain::{CommandTemplate, JobKind, JobSpec, LogKind, RunStamp, Snapshot, SnapshotRef, TemplateVars};
use crate::error::{AppError, Result};
use crate::port::{ExecutionError, ExecutionStatus, JobExecutor, SnapshotStore, TimeProvider};
use crate::shutdown::ShutdownToken;

/// How to invoke the check job
#[derive(Debug, Clone)]
pub struct CheckJobConfig {
    pub job_name_prefix: String,
    pub template: CommandTemplate,
    pub image: String,
    /// Listing catalogue; must exist before the job starts
    pub catalogue: PathBuf,
    pub request_delay_secs: u64,
    pub logs_dir: PathBuf,
    pub timeout: Option<Duration>,
}

/// A snapshot that passed validation
#[derive(Debug, Clone)]
pub struct MaterializedSnapshot {
    pub reference: SnapshotRef,
    pub snapshot: Snapshot,
    /// Poll attempts it took to appear
    pub attempts: u32,
}

struct Candidate {
    reference: SnapshotRef,
    parsed: Option<Snapshot>,
}

impl Candidate {
    fn is_valid(&self) -> bool {
        !self.reference.is_empty() && self.parsed.is_some()
    }
}

pub struct JobRunner {
    executor: Arc<dyn JobExecutor>,
    store: Arc<dyn SnapshotStore>,
    time: Arc<dyn TimeProvider>,
    retry: RetryPolicy,
    config: CheckJobConfig,
}

impl JobRunner {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        store: Arc<dyn SnapshotStore>,
        time: Arc<dyn TimeProvider>,
        retry: RetryPolicy,
        config: CheckJobConfig,
    ) -> Self {
        Self {
            executor,
            store,
            time,
            retry,
            config,
        }
    }

    /// Render the check job for the run identified by `stamp`
    pub fn check_spec(&self, stamp: &RunStamp) -> Result<JobSpec> {
        let name = JobKind::Check.job_name(&self.config.job_name_prefix, stamp);
        let vars = TemplateVars::new()
            .with("job_name", name.clone())
            .with("stamp", stamp.to_string())
            .with("image", self.config.image.clone())
            .with("catalogue", self.config.catalogue.display().to_string())
            .with("delay", self.config.request_delay_secs.to_string())
            .with("results_dir", self.store.location().display().to_string());

        let log_path = self.config.logs_dir.join(LogKind::Check.file_name(stamp));
        Ok(JobSpec::from_template(JobKind::Check, name, &self.config.template, &vars, log_path)?
            .with_input(self.config.catalogue.clone())
            .with_timeout(self.config.timeout))
    }

    /// Execute `spec` and return the snapshot it produced
    ///
    /// # Errors
    /// - AppError::Environment if the job or its inputs are unavailable
    /// - AppError::Execution if the process could not run to completion
    /// - AppError::JobFailed on a non-zero exit, whatever the store contains
    /// - AppError::SnapshotNotMaterialized if no valid snapshot appeared
    /// - AppError::Interrupted if `shutdown` fired; a running job is stopped
    ///   before this returns
    pub async fn run(&self, spec: &JobSpec, shutdown: &ShutdownToken) -> Result<MaterializedSnapshot> {
        let started = self.time.now_millis();
        // Filesystem mtimes may have second resolution
        let since = started - started.rem_euclid(1000);

        self.executor.verify(spec).await.map_err(classify)?;

        info!(job = %spec.name, command = %spec.command_line(), "Starting check job");
        let result = self.executor.execute(spec, shutdown).await.map_err(classify)?;
        info!(
            job = %spec.name,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            log = %spec.log_path.display(),
            "Check job finished"
        );

        if result.status != ExecutionStatus::Success {
            error!(job = %spec.name, output = %result.output, "Check job failed");
            return Err(AppError::JobFailed {
                job: spec.name.clone(),
                exit_code: result.exit_code,
                output: result.output,
            });
        }

        let mut stop = shutdown.clone();
        let outcome = tokio::select! {
            biased;
            _ = stop.wait() => return Err(AppError::Interrupted),
            outcome = self.retry.poll(|_| self.find_candidate(since), Candidate::is_valid) => outcome,
        };

        match outcome {
            PollOutcome::Ready { value, attempts } => {
                info!(
                    snapshot = %value.reference.file_name,
                    size_bytes = value.reference.size_bytes,
                    attempts = attempts,
                    "Snapshot materialized"
                );
                let Candidate { reference, parsed } = value;
                let snapshot = parsed.ok_or_else(|| {
                    AppError::Internal("validated snapshot candidate without content".to_string())
                })?;
                Ok(MaterializedSnapshot {
                    reference,
                    snapshot,
                    attempts,
                })
            }
            PollOutcome::Exhausted { attempts } => {
                error!(
                    results_dir = %self.store.location().display(),
                    attempts = attempts,
                    "No valid snapshot after check job"
                );
                Err(AppError::SnapshotNotMaterialized { attempts })
            }
        }
    }

    async fn find_candidate(&self, since_millis: i64) -> Option<Candidate> {
        let reference = match self.store.newest_since(since_millis).await {
            Ok(Some(reference)) => reference,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to list snapshots");
                return None;
            }
        };

        if reference.is_empty() {
            debug!(snapshot = %reference.file_name, "Snapshot is still empty");
            return Some(Candidate {
                reference,
                parsed: None,
            });
        }

        let parsed = match self.store.load(&reference).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(snapshot = %reference.file_name, error = %e, "Snapshot not parseable yet");
                None
            }
        };
        Some(Candidate { reference, parsed })
    }
}

/// Missing programs and inputs are environment problems, not job failures
fn classify(error: ExecutionError) -> AppError {
    if error.is_environment() {
        AppError::Environment(error.to_string())
    } else if error == ExecutionError::Interrupted {
        AppError::Interrupted
    } else {
        AppError::Execution(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::job_executor::mocks::MockJobExecutor;
    use crate::port::snapshot_store::mocks::InMemorySnapshotStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::shutdown::shutdown_channel;

    const START: i64 = 1_759_792_705_400;
    const VALID: &str = r#"{"timestamp": "2025-10-06T23:18:25", "results": [{"url": "u", "total_vacant": 1, "status": "success"}]}"#;

    fn config() -> CheckJobConfig {
        CheckJobConfig {
            job_name_prefix: "ur-net".to_string(),
            template: CommandTemplate::new(
                "docker",
                ["run", "--name", "{job_name}", "{image}", "{catalogue}", "{delay}"],
            ),
            image: "ur-net-checker".to_string(),
            catalogue: PathBuf::from("/data/urls.txt"),
            request_delay_secs: 3,
            logs_dir: PathBuf::from("/data/logs"),
            timeout: None,
        }
    }

    fn runner(executor: MockJobExecutor, store: Arc<InMemorySnapshotStore>) -> JobRunner {
        JobRunner::new(
            Arc::new(executor),
            store,
            Arc::new(FixedTimeProvider::new(START)),
            RetryPolicy::fixed(5, Duration::from_secs(3)),
            config(),
        )
    }

    fn stamp() -> RunStamp {
        RunStamp::parse("20251006_231825").unwrap()
    }

    #[test]
    fn test_check_spec() {
        let runner = runner(MockJobExecutor::new_success(), Arc::new(InMemorySnapshotStore::new()));
        let spec = runner.check_spec(&stamp()).unwrap();

        assert_eq!(spec.name, "ur-net-check-20251006_231825");
        assert_eq!(
            spec.args,
            vec!["run", "--name", "ur-net-check-20251006_231825", "ur-net-checker", "/data/urls.txt", "3"]
        );
        assert_eq!(spec.log_path, PathBuf::from("/data/logs/check_20251006_231825.log"));
        assert_eq!(spec.inputs, vec![PathBuf::from("/data/urls.txt")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_new_snapshot() {
        let store = Arc::new(InMemorySnapshotStore::new());
        store.insert("20251006_220000", START - 3_600_000, VALID);

        let hook_store = store.clone();
        let executor = MockJobExecutor::new_success().with_hook(JobKind::Check, move |_| {
            hook_store.insert("20251006_231825", START + 2_000, VALID);
        });

        let runner = runner(executor, store);
        let spec = runner.check_spec(&stamp()).unwrap();
        let materialized = runner.run(&spec, &ShutdownToken::never()).await.unwrap();

        assert_eq!(materialized.reference.file_name, "ur_net_results_20251006_231825.json");
        assert_eq!(materialized.attempts, 1);
        assert_eq!(materialized.snapshot.results.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_second_snapshot_counts_as_new() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let hook_store = store.clone();
        // mtime truncated to the start second
        let executor = MockJobExecutor::new_success().with_hook(JobKind::Check, move |_| {
            hook_store.insert("20251006_231825", START - 400, VALID);
        });

        let runner = runner(executor, store);
        let spec = runner.check_spec(&stamp()).unwrap();
        assert!(runner.run(&spec, &ShutdownToken::never()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_zero_exit_is_fatal_even_with_snapshot() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let hook_store = store.clone();
        let executor = MockJobExecutor::new_success()
            .with_exit_code(JobKind::Check, 2)
            .with_hook(JobKind::Check, move |_| {
                hook_store.insert("20251006_231825", START + 2_000, VALID);
            });

        let runner = runner(executor, store);
        let spec = runner.check_spec(&stamp()).unwrap();
        let err = runner.run(&spec, &ShutdownToken::never()).await.unwrap_err();

        match err {
            AppError::JobFailed { exit_code, output, .. } => {
                assert_eq!(exit_code, Some(2));
                assert_eq!(output, "mock check output");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_snapshot_exhausts_retries() {
        let store = Arc::new(InMemorySnapshotStore::new());
        store.insert("20251006_220000", START - 3_600_000, VALID);

        let runner = runner(MockJobExecutor::new_success(), store);
        let spec = runner.check_spec(&stamp()).unwrap();
        let err = runner.run(&spec, &ShutdownToken::never()).await.unwrap_err();

        assert!(matches!(err, AppError::SnapshotNotMaterialized { attempts: 5 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_or_corrupt_snapshot_is_never_valid() {
        for content in ["", "{\"timestamp\": \"t\", \"results\": ["] {
            let store = Arc::new(InMemorySnapshotStore::new());
            let hook_store = store.clone();
            let content = content.to_string();
            let executor = MockJobExecutor::new_success().with_hook(JobKind::Check, move |_| {
                hook_store.insert("20251006_231825", START + 1_000, &content);
            });

            let runner = runner(executor, store);
            let spec = runner.check_spec(&stamp()).unwrap();
            assert!(matches!(
                runner.run(&spec, &ShutdownToken::never()).await,
                Err(AppError::SnapshotNotMaterialized { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_unavailable_job_is_environment_error() {
        let executor = MockJobExecutor::new_success()
            .with_verify_error(ExecutionError::Unavailable("image ur-net-checker".to_string()));
        let runner = runner(executor, Arc::new(InMemorySnapshotStore::new()));
        let spec = runner.check_spec(&stamp()).unwrap();

        let err = runner.run(&spec, &ShutdownToken::never()).await.unwrap_err();
        assert!(matches!(err, AppError::Environment(_)));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_execution_error() {
        let executor = MockJobExecutor::new_success()
            .with_execute_error(ExecutionError::SpawnFailed("no such file".to_string()));
        let runner = runner(executor, Arc::new(InMemorySnapshotStore::new()));
        let spec = runner.check_spec(&stamp()).unwrap();

        let err = runner.run(&spec, &ShutdownToken::never()).await.unwrap_err();
        assert!(matches!(err, AppError::Execution(ExecutionError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_missing_input_at_spawn_is_environment_error() {
        let executor = MockJobExecutor::new_success()
            .with_execute_error(ExecutionError::MissingInput("/data/urls.txt".to_string()));
        let runner = runner(executor, Arc::new(InMemorySnapshotStore::new()));
        let spec = runner.check_spec(&stamp()).unwrap();

        let err = runner.run(&spec, &ShutdownToken::never()).await.unwrap_err();
        assert!(matches!(err, AppError::Environment(_)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_job() {
        let executor = Arc::new(MockJobExecutor::new_success().hanging(JobKind::Check));
        let runner = JobRunner::new(
            executor.clone(),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(FixedTimeProvider::new(START)),
            RetryPolicy::fixed(5, Duration::from_secs(3)),
            config(),
        );
        let spec = runner.check_spec(&stamp()).unwrap();
        let (tx, token) = shutdown_channel();

        let interrupt = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.shutdown();
        };
        let (result, ()) = tokio::join!(runner.run(&spec, &token), interrupt);

        assert!(matches!(result, Err(AppError::Interrupted)));
        assert_eq!(executor.interrupted(), vec![JobKind::Check]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_snapshot_polling() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let runner = runner(MockJobExecutor::new_success(), store);
        let spec = runner.check_spec(&stamp()).unwrap();
        let (tx, token) = shutdown_channel();
        tx.shutdown();

        let err = runner.run(&spec, &token).await.unwrap_err();
        assert!(matches!(err, AppError::Interrupted));
    }
}
