// Retention Sweeper
// Best-effort deletion of snapshots and logs older than the horizon

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::constants::{DEFAULT_RETENTION_DAYS, MILLIS_PER_DAY};
use crate::error::Result;
use crate::port::{ArtifactKind, ArtifactStore, TimeProvider};

/// Retention horizons in whole days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub snapshot_days: u32,
    pub log_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::uniform(DEFAULT_RETENTION_DAYS)
    }
}

impl RetentionPolicy {
    pub fn uniform(days: u32) -> Self {
        Self {
            snapshot_days: days,
            log_days: days,
        }
    }

    pub fn horizon_days(&self, kind: ArtifactKind) -> u32 {
        match kind {
            ArtifactKind::Snapshot => self.snapshot_days,
            ArtifactKind::Log => self.log_days,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub retained: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
        self.retained += other.retained;
    }
}

/// Age in whole days, never negative
pub fn age_in_days(now_millis: i64, modified_millis: i64) -> i64 {
    (now_millis - modified_millis).max(0) / MILLIS_PER_DAY
}

pub struct RetentionSweeper {
    store: Arc<dyn ArtifactStore>,
    time: Arc<dyn TimeProvider>,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn ArtifactStore>, time: Arc<dyn TimeProvider>, policy: RetentionPolicy) -> Self {
        Self { store, time, policy }
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_with(&self.policy).await
    }

    /// Sweep with an explicit policy. Individual failures are logged and
    /// reported, never propagated.
    pub async fn sweep_with(&self, policy: &RetentionPolicy) -> SweepReport {
        let mut report = SweepReport::default();
        for kind in [ArtifactKind::Snapshot, ArtifactKind::Log] {
            match self.sweep_kind(kind, policy.horizon_days(kind)).await {
                Ok(partial) => report.merge(partial),
                Err(e) => warn!(kind = kind.as_str(), error = %e, "Failed to list artifacts"),
            }
        }

        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            retained = report.retained,
            "Retention sweep finished"
        );
        report
    }

    async fn sweep_kind(&self, kind: ArtifactKind, horizon_days: u32) -> Result<SweepReport> {
        let now = self.time.now_millis();
        let mut report = SweepReport::default();

        for artifact in self.store.list(kind).await? {
            let age = age_in_days(now, artifact.modified_millis);
            if age <= i64::from(horizon_days) {
                report.retained += 1;
                continue;
            }

            match self.store.remove(&artifact).await {
                Ok(()) => {
                    debug!(path = %artifact.path.display(), age_days = age, "Deleted expired artifact");
                    report.deleted.push(artifact.path);
                }
                Err(e) => {
                    warn!(path = %artifact.path.display(), error = %e, "Failed to delete expired artifact");
                    report.failed.push(artifact.path);
                }
            }
        }

        Ok(report)
    }
}
