// Change Detector
// Picks the previous snapshot and diffs it against the current one

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::diff::compare_snapshots;
use crate::domain::{DiffResult, Snapshot, SnapshotRef};
use crate::port::SnapshotStore;

/// Detection failures. Never to be read as "nothing new".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("current snapshot {file} is unreadable: {reason}")]
    CurrentUnreadable { file: String, reason: String },

    #[error("previous snapshot {file} is unreadable: {reason}")]
    PreviousUnreadable { file: String, reason: String },

    #[error("cannot list snapshots: {0}")]
    Listing(String),
}

pub struct ChangeDetector {
    store: Arc<dyn SnapshotStore>,
    notify_on_first_run: bool,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn SnapshotStore>, notify_on_first_run: bool) -> Self {
        Self {
            store,
            notify_on_first_run,
        }
    }

    /// Most recently modified snapshot other than `current`
    pub async fn select_previous(&self, current: &SnapshotRef) -> Result<Option<SnapshotRef>, DetectionError> {
        let refs = self
            .store
            .list()
            .await
            .map_err(|e| DetectionError::Listing(e.to_string()))?;

        Ok(SnapshotRef::most_recent(refs.iter().filter(|r| r.file_name != current.file_name)).cloned())
    }

    /// Load `current` from the store and diff it against its predecessor
    pub async fn detect(&self, current: &SnapshotRef) -> Result<DiffResult, DetectionError> {
        let snapshot = self
            .store
            .load(current)
            .await
            .map_err(|e| DetectionError::CurrentUnreadable {
                file: current.file_name.clone(),
                reason: e.to_string(),
            })?;
        self.detect_loaded(current, &snapshot).await
    }

    /// Diff an already parsed `current` against its predecessor
    pub async fn detect_loaded(
        &self,
        current_ref: &SnapshotRef,
        current: &Snapshot,
    ) -> Result<DiffResult, DetectionError> {
        let Some(previous_ref) = self.select_previous(current_ref).await? else {
            info!(
                current = %current_ref.file_name,
                notify = self.notify_on_first_run,
                "No previous snapshot, first run"
            );
            return Ok(DiffResult::first_run(current, self.notify_on_first_run));
        };

        let previous = self.store.load(&previous_ref).await.map_err(|e| {
            warn!(previous = %previous_ref.file_name, error = %e, "Previous snapshot unreadable");
            DetectionError::PreviousUnreadable {
                file: previous_ref.file_name.clone(),
                reason: e.to_string(),
            }
        })?;

        let diff = compare_snapshots(&previous, current, previous_ref.file_name.clone());
        info!(
            current = %current_ref.file_name,
            previous = %previous_ref.file_name,
            previous_vacant = diff.previous_vacant_count,
            current_vacant = diff.current_vacant_count,
            new_vacant = diff.new_vacant.len(),
            increased_vacant = diff.increased_vacant.len(),
            should_notify = diff.should_notify,
            "Diff computed"
        );
        for change in &diff.changes {
            info!(
                url = %change.url,
                property = %change.property_name,
                kind = change.kind.as_str(),
                previous = change.previous_vacant,
                current = change.current_vacant,
                "Vacancy change"
            );
        }
        Ok(diff)
    }

    /// Diff the latest snapshot (by filename) against its predecessor
    ///
    /// Returns None if the store holds no snapshot at all.
    pub async fn detect_latest(&self) -> Result<Option<(SnapshotRef, DiffResult)>, DetectionError> {
        let latest = self
            .store
            .latest()
            .await
            .map_err(|e| DetectionError::Listing(e.to_string()))?;

        match latest {
            Some(current) => {
                let diff = self.detect(&current).await?;
                Ok(Some((current, diff)))
            }
            None => Ok(None),
        }
    }
}
