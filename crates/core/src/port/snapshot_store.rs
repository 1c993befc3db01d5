// Snapshot Store Port
// Read side of the results directory. Snapshots are only ever written by the
// external check job.

use async_trait::async_trait;
use std::path::Path;

use crate::domain::{Snapshot, SnapshotRef};
use crate::Result;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Directory the check job writes into
    fn location(&self) -> &Path;

    /// All snapshot files, sorted by filename (oldest stamp first)
    async fn list(&self) -> Result<Vec<SnapshotRef>>;

    /// Read and parse one snapshot
    ///
    /// # Errors
    /// - AppError::Io if the file cannot be read
    /// - AppError::Serialization if the content is not a valid snapshot
    async fn load(&self, snapshot: &SnapshotRef) -> Result<Snapshot>;

    /// Latest snapshot by filename order
    async fn latest(&self) -> Result<Option<SnapshotRef>> {
        Ok(self.list().await?.pop())
    }

    /// Most recently modified snapshot written at or after `since_millis`
    async fn newest_since(&self, since_millis: i64) -> Result<Option<SnapshotRef>> {
        let refs = self.list().await?;
        Ok(SnapshotRef::most_recent(
            refs.iter().filter(|r| r.modified_millis >= since_millis),
        )
        .cloned())
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::snapshot::{parse_snapshot_name, DEFAULT_SNAPSHOT_PREFIX};
    use crate::AppError;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory store keyed by filename, holding raw file content
    pub struct InMemorySnapshotStore {
        location: PathBuf,
        files: Mutex<Vec<(SnapshotRef, String)>>,
    }

    impl Default for InMemorySnapshotStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemorySnapshotStore {
        pub fn new() -> Self {
            Self {
                location: PathBuf::from("/mem/results"),
                files: Mutex::new(Vec::new()),
            }
        }

        /// Add a file named after `stamp` (`YYYYMMDD_HHMMSS`)
        pub fn insert(&self, stamp: &str, modified_millis: i64, content: &str) -> SnapshotRef {
            let file_name = format!("{DEFAULT_SNAPSHOT_PREFIX}{stamp}.json");
            let reference = SnapshotRef {
                path: self.location.join(&file_name),
                stamp: parse_snapshot_name(&file_name, DEFAULT_SNAPSHOT_PREFIX)
                    .unwrap_or_else(|| panic!("invalid stamp {stamp}")),
                file_name,
                modified_millis,
                size_bytes: content.len() as u64,
            };

            let mut files = self.files.lock().unwrap();
            files.retain(|(r, _)| r.file_name != reference.file_name);
            files.push((reference.clone(), content.to_string()));
            reference
        }

        pub fn len(&self) -> usize {
            self.files.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl SnapshotStore for InMemorySnapshotStore {
        fn location(&self) -> &Path {
            &self.location
        }

        async fn list(&self) -> Result<Vec<SnapshotRef>> {
            let mut refs: Vec<SnapshotRef> = self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|(r, _)| r.clone())
                .collect();
            refs.sort_by(|a, b| a.file_name.cmp(&b.file_name));
            Ok(refs)
        }

        async fn load(&self, snapshot: &SnapshotRef) -> Result<Snapshot> {
            let files = self.files.lock().unwrap();
            let (_, content) = files
                .iter()
                .find(|(r, _)| r.file_name == snapshot.file_name)
                .ok_or_else(|| {
                    AppError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        snapshot.file_name.clone(),
                    ))
                })?;
            Ok(Snapshot::from_json(content.as_bytes())?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::InMemorySnapshotStore;
    use super::*;

    const EMPTY: &str = r#"{"timestamp": "t", "results": []}"#;

    #[tokio::test]
    async fn test_latest_is_by_filename() {
        let store = InMemorySnapshotStore::new();
        store.insert("20251006_120000", 5_000, EMPTY);
        store.insert("20251006_110000", 9_000, EMPTY);

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.file_name, "ur_net_results_20251006_120000.json");
    }

    #[tokio::test]
    async fn test_newest_since_filters_by_mtime() {
        let store = InMemorySnapshotStore::new();
        store.insert("20251006_110000", 1_000, EMPTY);
        assert!(store.newest_since(2_000).await.unwrap().is_none());

        store.insert("20251006_120000", 2_000, EMPTY);
        let found = store.newest_since(2_000).await.unwrap().unwrap();
        assert_eq!(found.modified_millis, 2_000);
    }

    #[tokio::test]
    async fn test_load_rejects_corrupt_content() {
        let store = InMemorySnapshotStore::new();
        let reference = store.insert("20251006_110000", 1_000, "{\"timestamp\":");
        assert!(store.load(&reference).await.is_err());
    }
}
