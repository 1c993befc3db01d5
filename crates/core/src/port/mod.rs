// Port Layer - Interfaces for external dependencies

pub mod artifact_store;
pub mod id_provider; // For deterministic testing
pub mod job_executor;
pub mod lock_store;
pub mod process_probe;
pub mod snapshot_store;
pub mod time_provider;

// Re-exports
pub use artifact_store::{Artifact, ArtifactKind, ArtifactStore};
pub use id_provider::{IdProvider, UuidProvider};
pub use job_executor::{ExecutionError, ExecutionResult, ExecutionStatus, JobExecutor};
pub use lock_store::LockStore;
pub use process_probe::{CompanionProcess, ProcessProbe};
pub use snapshot_store::SnapshotStore;
pub use time_provider::{SystemTimeProvider, TimeProvider};
