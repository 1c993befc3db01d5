// Snapshot store backed by the results directory
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use vacancy_watch_core::domain::snapshot::parse_snapshot_name;
use vacancy_watch_core::domain::{Snapshot, SnapshotRef};
use vacancy_watch_core::port::SnapshotStore;
use vacancy_watch_core::Result;

use crate::metadata::modified_millis;

/// Reads `<prefix>YYYYMMDD_HHMMSS.json` files from one directory
pub struct FsSnapshotStore {
    dir: PathBuf,
    prefix: String,
}

impl FsSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Create the directory so the check job can mount it
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    fn location(&self) -> &Path {
        &self.dir
    }

    async fn list(&self) -> Result<Vec<SnapshotRef>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut refs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(stamp) = parse_snapshot_name(&file_name, &self.prefix) else {
                continue;
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                // Deleted between read_dir and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            refs.push(SnapshotRef {
                path: entry.path(),
                file_name,
                stamp,
                modified_millis: modified_millis(&metadata),
                size_bytes: metadata.len(),
            });
        }

        refs.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        debug!(dir = %self.dir.display(), count = refs.len(), "Listed snapshots");
        Ok(refs)
    }

    async fn load(&self, snapshot: &SnapshotRef) -> Result<Snapshot> {
        let bytes = tokio::fs::read(&snapshot.path).await?;
        Ok(Snapshot::from_json(&bytes)?)
    }
}
