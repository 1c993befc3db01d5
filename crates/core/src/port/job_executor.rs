// Job Executor Port
// Abstraction for running the external check and mail jobs

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::JobSpec;
use crate::shutdown::ShutdownToken;

/// Result of a finished job process
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub duration_ms: i64,
    pub exit_code: Option<i32>,
    /// Combined stdout/stderr as written to the job log
    pub output: String,
    pub pid: Option<u32>,
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Process timeout after {0}ms")]
    Timeout(u64),

    #[error("Process killed: {0}")]
    Killed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Job unavailable: {0}")]
    Unavailable(String),

    #[error("Required input missing: {0}")]
    MissingInput(String),

    /// Shutdown fired; the process was asked to stop and has exited
    #[error("Interrupted by shutdown")]
    Interrupted,
}

impl ExecutionError {
    /// Precondition failures, raised before anything was started
    pub fn is_environment(&self) -> bool {
        matches!(self, ExecutionError::Unavailable(_) | ExecutionError::MissingInput(_))
    }
}

/// Job Executor trait
///
/// Implementations:
/// - SubprocessExecutor: spawns the job as an external process
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Check that the job can run: its program/image is available and every
    /// input in `spec.inputs` exists
    ///
    /// # Errors
    /// - ExecutionError::Unavailable if the job cannot be started here
    /// - ExecutionError::MissingInput if a required file is absent
    async fn verify(&self, spec: &JobSpec) -> Result<(), ExecutionError>;

    /// Run the job to completion, writing combined output to `spec.log_path`
    ///
    /// A non-zero exit is reported as `ExecutionStatus::Failed`, not an error.
    /// When `shutdown` fires the job is stopped gracefully and reaped before
    /// this returns, so no job outlives an interrupted run.
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the process cannot be started
    /// - ExecutionError::Timeout if `spec.timeout` elapses
    /// - ExecutionError::Interrupted if `shutdown` fired first
    async fn execute(&self, spec: &JobSpec, shutdown: &ShutdownToken) -> Result<ExecutionResult, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::JobKind;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    /// Side effect run when a job "executes", e.g. writing a snapshot file
    pub type JobHook = Arc<dyn Fn(&JobSpec) + Send + Sync>;

    /// Mock Job Executor for testing
    #[derive(Default)]
    pub struct MockJobExecutor {
        exit_codes: Mutex<HashMap<JobKind, i32>>,
        hooks: Mutex<HashMap<JobKind, JobHook>>,
        hanging: Mutex<HashSet<JobKind>>,
        interrupted: Mutex<Vec<JobKind>>,
        verify_error: Mutex<Option<ExecutionError>>,
        execute_error: Mutex<Option<ExecutionError>>,
        calls: Mutex<Vec<JobSpec>>,
    }

    impl MockJobExecutor {
        /// Every job exits zero without side effects
        pub fn new_success() -> Self {
            Self::default()
        }

        pub fn with_exit_code(self, kind: JobKind, code: i32) -> Self {
            self.exit_codes.lock().unwrap().insert(kind, code);
            self
        }

        pub fn with_hook(self, kind: JobKind, hook: impl Fn(&JobSpec) + Send + Sync + 'static) -> Self {
            self.hooks.lock().unwrap().insert(kind, Arc::new(hook));
            self
        }

        /// Jobs of `kind` only finish when shutdown fires
        pub fn hanging(self, kind: JobKind) -> Self {
            self.hanging.lock().unwrap().insert(kind);
            self
        }

        pub fn with_verify_error(self, error: ExecutionError) -> Self {
            *self.verify_error.lock().unwrap() = Some(error);
            self
        }

        pub fn with_execute_error(self, error: ExecutionError) -> Self {
            *self.execute_error.lock().unwrap() = Some(error);
            self
        }

        /// Kinds of the jobs that were stopped by shutdown, in order
        pub fn interrupted(&self) -> Vec<JobKind> {
            self.interrupted.lock().unwrap().clone()
        }

        pub fn calls(&self) -> Vec<JobSpec> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self, kind: JobKind) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|spec| spec.kind == kind)
                .count()
        }
    }

    #[async_trait]
    impl JobExecutor for MockJobExecutor {
        async fn verify(&self, _spec: &JobSpec) -> Result<(), ExecutionError> {
            match self.verify_error.lock().unwrap().clone() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        async fn execute(&self, spec: &JobSpec, shutdown: &ShutdownToken) -> Result<ExecutionResult, ExecutionError> {
            self.calls.lock().unwrap().push(spec.clone());

            if let Some(error) = self.execute_error.lock().unwrap().clone() {
                return Err(error);
            }

            let hangs = self.hanging.lock().unwrap().contains(&spec.kind);
            if hangs {
                shutdown.clone().wait().await;
                self.interrupted.lock().unwrap().push(spec.kind);
                return Err(ExecutionError::Interrupted);
            }

            let hook = self.hooks.lock().unwrap().get(&spec.kind).cloned();
            if let Some(hook) = hook {
                hook(spec);
            }

            let exit_code = self
                .exit_codes
                .lock()
                .unwrap()
                .get(&spec.kind)
                .copied()
                .unwrap_or(0);

            Ok(ExecutionResult {
                status: if exit_code == 0 {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failed
                },
                duration_ms: 10,
                exit_code: Some(exit_code),
                output: format!("mock {} output", spec.kind),
                pid: Some(4000),
            })
        }
    }
}
