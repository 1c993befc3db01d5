// Artifact Store Port
// Snapshot and log files as seen by the retention sweeper

use async_trait::async_trait;
use std::path::PathBuf;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Snapshot,
    Log,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Snapshot => "snapshot",
            ArtifactKind::Log => "log",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Modification time (epoch ms)
    pub modified_millis: i64,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn list(&self, kind: ArtifactKind) -> Result<Vec<Artifact>>;

    async fn remove(&self, artifact: &Artifact) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::AppError;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryArtifactStore {
        artifacts: Mutex<Vec<Artifact>>,
        undeletable: Mutex<HashSet<PathBuf>>,
    }

    impl InMemoryArtifactStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add(&self, kind: ArtifactKind, path: impl Into<PathBuf>, modified_millis: i64) {
            self.artifacts.lock().unwrap().push(Artifact {
                kind,
                path: path.into(),
                modified_millis,
            });
        }

        /// `remove` fails for this path
        pub fn protect(&self, path: impl Into<PathBuf>) {
            self.undeletable.lock().unwrap().insert(path.into());
        }

        pub fn paths(&self) -> Vec<PathBuf> {
            self.artifacts
                .lock()
                .unwrap()
                .iter()
                .map(|a| a.path.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ArtifactStore for InMemoryArtifactStore {
        async fn list(&self, kind: ArtifactKind) -> Result<Vec<Artifact>> {
            Ok(self
                .artifacts
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.kind == kind)
                .cloned()
                .collect())
        }

        async fn remove(&self, artifact: &Artifact) -> Result<()> {
            if self.undeletable.lock().unwrap().contains(&artifact.path) {
                return Err(AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    artifact.path.display().to_string(),
                )));
            }
            self.artifacts
                .lock()
                .unwrap()
                .retain(|a| a.path != artifact.path);
            Ok(())
        }
    }
}
