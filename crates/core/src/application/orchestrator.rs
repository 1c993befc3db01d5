// Run Orchestrator
//
// One invocation = one sequential run:
//   exclusion -> check job -> diff -> notification -> retention -> release
//
// Lock release and companion cleanup happen on every exit path, including
// interruption. An interrupted run is never abandoned mid-job: the executor
// stops its child first, then the run unwinds normally.

use tracing::{error, info, warn};

use super::change_detector::ChangeDetector;
use super::dispatcher::NotificationDispatcher;
use super::exclusion::{Contention, Exclusion, ExclusionGuard};
use super::job_runner::JobRunner;
use super::retention::{RetentionSweeper, SweepReport};
use crate::shutdown::ShutdownToken;
use crate::domain::{DiffResult, DispatchOutcome, RunStamp, SnapshotRef};
use crate::error::{AppError, Result};

/// Everything a completed run decided
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stamp: RunStamp,
    pub snapshot: SnapshotRef,
    pub diff: DiffResult,
    pub dispatch: DispatchOutcome,
    pub sweep: SweepReport,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Another run is active; nothing was done
    Contended(Contention),
    /// Shutdown was requested mid-run
    Interrupted,
}

pub struct Orchestrator {
    guard: ExclusionGuard,
    runner: JobRunner,
    detector: ChangeDetector,
    dispatcher: NotificationDispatcher,
    sweeper: RetentionSweeper,
}

impl Orchestrator {
    pub fn new(
        guard: ExclusionGuard,
        runner: JobRunner,
        detector: ChangeDetector,
        dispatcher: NotificationDispatcher,
        sweeper: RetentionSweeper,
    ) -> Self {
        Self {
            guard,
            runner,
            detector,
            dispatcher,
            sweeper,
        }
    }

    pub fn guard(&self) -> &ExclusionGuard {
        &self.guard
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn sweeper(&self) -> &RetentionSweeper {
        &self.sweeper
    }

    /// Run under mutual exclusion until done or interrupted
    pub async fn run_exclusive(&self, stamp: &RunStamp, shutdown: ShutdownToken) -> Result<RunOutcome> {
        let handle = match self.guard.acquire()? {
            Exclusion::Acquired(handle) => handle,
            Exclusion::Contended(contention) => {
                info!(reason = %contention, "Another run is active, nothing to do");
                return Ok(RunOutcome::Contended(contention));
            }
        };

        let result = match self.run_once(stamp, &shutdown).await {
            Ok(report) => Ok(RunOutcome::Completed(report)),
            Err(e) if shutdown.is_shutdown() => {
                warn!(stamp = %stamp, error = %e, "Run interrupted");
                Ok(RunOutcome::Interrupted)
            }
            Err(e) => Err(e),
        };

        let terminated = self.guard.terminate_companions().await;
        if terminated > 0 {
            info!(terminated = terminated, "Cleaned up companion jobs");
        }
        if let Err(e) = handle.release() {
            error!(error = %e, "Failed to release lock");
        }

        result
    }

    /// One run without exclusion handling
    ///
    /// A detection error does not suppress the notification: the mail job is
    /// still dispatched and retention still runs before the error is returned.
    /// Once `shutdown` fires no further job is started.
    pub async fn run_once(&self, stamp: &RunStamp, shutdown: &ShutdownToken) -> Result<RunReport> {
        info!(stamp = %stamp, "Run started");

        let spec = self.runner.check_spec(stamp)?;
        let materialized = self.runner.run(&spec, shutdown).await?;

        let (diff, detection_error) = match self
            .detector
            .detect_loaded(&materialized.reference, &materialized.snapshot)
            .await
        {
            Ok(diff) => (diff, None),
            Err(e) => {
                error!(error = %e, "Change detection failed, notifying anyway");
                (DiffResult::detection_failed(e.to_string()), Some(e))
            }
        };

        if shutdown.is_shutdown() {
            return Err(AppError::Interrupted);
        }
        let dispatch = self
            .dispatcher
            .dispatch(&diff, &materialized.reference, stamp, shutdown)
            .await;
        info!(outcome = %dispatch, "Notification dispatch finished");

        let sweep = self.sweeper.sweep().await;

        if let DispatchOutcome::Failed { exit_code, output } = &dispatch {
            return Err(AppError::Notification {
                exit_code: *exit_code,
                output: output.clone(),
            });
        }
        if let Some(e) = detection_error {
            return Err(e.into());
        }

        info!(
            stamp = %stamp,
            snapshot = %materialized.reference.file_name,
            should_notify = diff.should_notify,
            "Run completed"
        );
        Ok(RunReport {
            stamp: *stamp,
            snapshot: materialized.reference,
            diff,
            dispatch,
            sweep,
        })
    }
}
