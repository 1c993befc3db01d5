// Subprocess executor
// reason: tokio for async process management; the job log doubles as the
// capture buffer for combined stdout/stderr
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use vacancy_watch_core::application::constants::GRACEFUL_SHUTDOWN_TIMEOUT_MS;
use vacancy_watch_core::domain::JobSpec;
use vacancy_watch_core::port::job_executor::{
    ExecutionError, ExecutionResult, ExecutionStatus, JobExecutor,
};
use vacancy_watch_core::port::TimeProvider;
use vacancy_watch_core::shutdown::ShutdownToken;

/// Tail of the job log kept in `ExecutionResult::output`
const MAX_CAPTURED_OUTPUT_BYTES: usize = 64 * 1024;

/// Runs jobs as child processes with an allowlisted environment
pub struct SubprocessExecutor {
    time_provider: Arc<dyn TimeProvider>,
    env_allowlist: Vec<String>,
    /// Command whose success proves the job can run (e.g. image inspect)
    availability_probe: Option<(String, Vec<String>)>,
    /// How long a job may take to exit after SIGTERM on shutdown
    grace_period: Duration,
}

/// How waiting on a child ended
enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Interrupted,
}

impl SubprocessExecutor {
    /// Create a new subprocess executor
    ///
    /// # Arguments
    /// * `time_provider` - Time provider for duration tracking
    /// * `env_allowlist` - Environment variables passed through to jobs
    ///
    /// # Example
    /// ```ignore
    /// let executor = SubprocessExecutor::new(
    ///     Arc::new(SystemTimeProvider),
    ///     vec!["PATH".to_string(), "HOME".to_string(), "USER".to_string()],
    /// );
    /// ```
    pub fn new(time_provider: Arc<dyn TimeProvider>, env_allowlist: Vec<String>) -> Self {
        Self {
            time_provider,
            env_allowlist,
            availability_probe: None,
            grace_period: Duration::from_millis(GRACEFUL_SHUTDOWN_TIMEOUT_MS),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_availability_probe(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.availability_probe = Some((program.into(), args));
        self
    }

    /// Current environment filtered to the allowlist
    fn filtered_env(&self) -> Vec<(String, String)> {
        std::env::vars()
            .filter(|(k, _)| self.env_allowlist.contains(k))
            .collect()
    }

    /// Jobs are stopped explicitly on shutdown; `kill_on_drop` only covers a
    /// future dropped some other way
    fn command(&self, program: &str, args: &[String]) -> Command {
        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .envs(self.filtered_env())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    /// SIGTERM, then SIGKILL once the grace period is over. The child is
    /// reaped either way.
    async fn stop_gracefully(&self, job: &str, child: &mut Child) {
        if let Some(pid) = child.id().filter(|pid| request_stop(*pid)) {
            info!(job = %job, pid = pid, "Sent SIGTERM to job");
            match timeout(self.grace_period, child.wait()).await {
                Ok(Ok(status)) => {
                    info!(job = %job, exit_code = ?status.code(), "Job stopped after SIGTERM");
                    return;
                }
                Ok(Err(e)) => warn!(job = %job, error = %e, "Failed to wait for job after SIGTERM"),
                Err(_) => warn!(
                    job = %job,
                    grace_ms = duration_millis(self.grace_period),
                    "Job ignored SIGTERM, killing"
                ),
            }
        }
        if let Err(e) = child.kill().await {
            warn!(job = %job, error = %e, "Failed to kill job");
        }
    }

    async fn run_availability_probe(&self, program: &str, args: &[String]) -> Result<(), ExecutionError> {
        let status = self
            .command(program, args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ExecutionError::Unavailable(format!("{program}: {e}")))?;

        if status.success() {
            debug!(probe = %program, "Availability probe passed");
            Ok(())
        } else {
            Err(ExecutionError::Unavailable(format!(
                "'{} {}' exited with {:?}",
                program,
                args.join(" "),
                status.code()
            )))
        }
    }

    /// Open the job log; the same file receives stdout and stderr
    fn open_log(path: &Path) -> Result<(Stdio, Stdio), ExecutionError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ExecutionError::IoError(e.to_string()))?;
        }
        let stdout = std::fs::File::create(path)
            .map_err(|e| ExecutionError::IoError(format!("{}: {}", path.display(), e)))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| ExecutionError::IoError(e.to_string()))?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    async fn read_captured(path: &Path) -> String {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let start = bytes.len().saturating_sub(MAX_CAPTURED_OUTPUT_BYTES);
                String::from_utf8_lossy(&bytes[start..]).into_owned()
            }
            Err(e) => {
                warn!(log = %path.display(), error = %e, "Cannot read job log back");
                String::new()
            }
        }
    }
}

/// Ask `pid` to exit; false if no signal could be delivered
#[cfg(unix)]
fn request_stop(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            warn!(pid = pid, error = %e, "SIGTERM failed");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_stop(_pid: u32) -> bool {
    false
}

async fn wait_bounded(child: &mut Child, limit: Option<Duration>) -> Waited {
    match limit {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => Waited::Exited(status),
            Err(_) => Waited::TimedOut(limit),
        },
        None => Waited::Exited(child.wait().await),
    }
}

/// Resolve a bare program name against PATH
fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|path| path.is_file())
    })
}

#[async_trait]
impl JobExecutor for SubprocessExecutor {
    async fn verify(&self, spec: &JobSpec) -> Result<(), ExecutionError> {
        for input in &spec.inputs {
            if !tokio::fs::try_exists(input).await.unwrap_or(false) {
                return Err(ExecutionError::MissingInput(input.display().to_string()));
            }
        }

        if find_program(&spec.program).is_none() {
            return Err(ExecutionError::Unavailable(format!(
                "program '{}' not found",
                spec.program
            )));
        }

        if let Some((program, args)) = &self.availability_probe {
            self.run_availability_probe(program, args).await?;
        }
        Ok(())
    }

    async fn execute(&self, spec: &JobSpec, shutdown: &ShutdownToken) -> Result<ExecutionResult, ExecutionError> {
        if shutdown.is_shutdown() {
            return Err(ExecutionError::Interrupted);
        }
        let start_time = self.time_provider.now_millis();
        let (stdout, stderr) = Self::open_log(&spec.log_path)?;

        info!(
            job = %spec.name,
            command = %spec.program,
            args = ?spec.args,
            log = %spec.log_path.display(),
            timeout_ms = ?spec.timeout.map(duration_millis),
            "Starting subprocess execution"
        );

        let mut child = self
            .command(&spec.program, &spec.args)
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{}: {}", spec.program, e)))?;
        let pid = child.id();

        let mut stop = shutdown.clone();
        let waited = tokio::select! {
            biased;
            _ = stop.wait() => Waited::Interrupted,
            waited = wait_bounded(&mut child, spec.timeout) => waited,
        };

        let status = match waited {
            Waited::Exited(status) => status.map_err(|e| ExecutionError::IoError(e.to_string()))?,
            Waited::TimedOut(limit) => {
                warn!(job = %spec.name, pid = ?pid, "Job timed out, killing");
                if let Err(e) = child.kill().await {
                    warn!(job = %spec.name, error = %e, "Failed to kill timed out job");
                }
                return Err(ExecutionError::Timeout(duration_millis(limit)));
            }
            Waited::Interrupted => {
                warn!(job = %spec.name, pid = ?pid, "Shutdown requested, stopping job");
                self.stop_gracefully(&spec.name, &mut child).await;
                return Err(ExecutionError::Interrupted);
            }
        };

        let duration_ms = self.time_provider.now_millis() - start_time;
        let output = Self::read_captured(&spec.log_path).await;

        let result = ExecutionResult {
            status: if status.success() {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Failed
            },
            duration_ms,
            exit_code: status.code(),
            output,
            pid,
        };

        info!(
            job = %spec.name,
            duration_ms = %duration_ms,
            exit_code = ?result.exit_code,
            status = ?result.status,
            "Subprocess execution completed"
        );

        Ok(result)
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
