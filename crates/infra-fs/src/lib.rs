// Vacancy Watch Infrastructure - Filesystem Adapters
// Implements: SnapshotStore, LockStore, ArtifactStore

mod artifact_store;
mod lock_file;
mod metadata;
mod snapshot_store;

pub use artifact_store::FsArtifactStore;
pub use lock_file::PidLockFile;
pub use snapshot_store::FsSnapshotStore;
