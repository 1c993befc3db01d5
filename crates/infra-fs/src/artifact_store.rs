// Artifact store over the results and log directories
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use vacancy_watch_core::domain::snapshot::SNAPSHOT_EXTENSION;
use vacancy_watch_core::port::{Artifact, ArtifactKind, ArtifactStore};
use vacancy_watch_core::Result;

use crate::metadata::modified_millis;

const LOG_EXTENSION: &str = "log";

/// Snapshots: `<prefix>*.json` in `results_dir`; logs: `*.log` in `logs_dir`
pub struct FsArtifactStore {
    results_dir: PathBuf,
    logs_dir: PathBuf,
    snapshot_prefix: String,
}

impl FsArtifactStore {
    pub fn new(
        results_dir: impl Into<PathBuf>,
        logs_dir: impl Into<PathBuf>,
        snapshot_prefix: impl Into<String>,
    ) -> Self {
        Self {
            results_dir: results_dir.into(),
            logs_dir: logs_dir.into(),
            snapshot_prefix: snapshot_prefix.into(),
        }
    }

    fn matches(&self, kind: ArtifactKind, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let extension = path.extension().and_then(|e| e.to_str());
        match kind {
            ArtifactKind::Snapshot => {
                name.starts_with(&self.snapshot_prefix) && extension == Some(SNAPSHOT_EXTENSION)
            }
            ArtifactKind::Log => extension == Some(LOG_EXTENSION),
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn list(&self, kind: ArtifactKind) -> Result<Vec<Artifact>> {
        let dir = match kind {
            ArtifactKind::Snapshot => &self.results_dir,
            ArtifactKind::Log => &self.logs_dir,
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut artifacts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !self.matches(kind, &path) {
                continue;
            }
            match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => artifacts.push(Artifact {
                    kind,
                    path,
                    modified_millis: modified_millis(&metadata),
                }),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(artifacts)
    }

    async fn remove(&self, artifact: &Artifact) -> Result<()> {
        match tokio::fs::remove_file(&artifact.path).await {
            Ok(()) => Ok(()),
            // Already gone
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
