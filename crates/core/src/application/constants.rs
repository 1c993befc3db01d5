// Run orchestration constants
use std::time::Duration;

/// Snapshot materialization poll budget
pub const DEFAULT_POLL_ATTEMPTS: u32 = 5;

/// Fixed delay between snapshot poll attempts (3s)
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(3);

/// Retention horizon for snapshots and logs (days)
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Graceful process shutdown timeout before SIGKILL (5 seconds)
pub const GRACEFUL_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Attempts at replacing a stale lock token before giving up
pub const LOCK_ACQUIRE_ATTEMPTS: u32 = 3;

/// Prefix of every notification subject
pub const DEFAULT_SUBJECT_PREFIX: &str = "UR-NET vacancy report";

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
