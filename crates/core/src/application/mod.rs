// Application Layer - Use Cases and Business Logic

pub mod change_detector;
pub mod constants;
pub mod dispatcher;
pub mod exclusion;
pub mod job_runner;
pub mod orchestrator;
pub mod retention;
pub mod retry;

// Re-exports
pub use change_detector::{ChangeDetector, DetectionError};
pub use dispatcher::{MailJobConfig, NotificationDispatcher};
pub use exclusion::{Contention, Exclusion, ExclusionGuard, LockHandle, LockHolder, ProcessLock};
pub use job_runner::{CheckJobConfig, JobRunner, MaterializedSnapshot};
pub use orchestrator::{Orchestrator, RunOutcome, RunReport};
pub use retention::{RetentionPolicy, RetentionSweeper, SweepReport};
pub use retry::{Backoff, PollOutcome, RetryPolicy};
pub use crate::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
