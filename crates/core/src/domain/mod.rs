// Domain Layer - Pure business logic and entities

pub mod diff;
pub mod error;
pub mod job;
pub mod lock;
pub mod notification;
pub mod run;
pub mod snapshot;

// Re-exports
pub use diff::{ChangeKind, DiffResult, ListingChange, NotifyReason};
pub use error::DomainError;
pub use job::{CommandTemplate, JobKind, JobSpec, TemplateVars};
pub use lock::LockToken;
pub use notification::{DispatchOutcome, NotificationConfig, SkipReason};
pub use run::{LogKind, RunStamp};
pub use snapshot::{ListingResult, ListingStatus, Snapshot, SnapshotRef, Summary};
