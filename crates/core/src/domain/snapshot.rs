// Snapshot Domain Model
//
// One JSON file per completed check run. Files are written by the external
// check job and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::run::RunStamp;

/// Filename prefix used by the check job
pub const DEFAULT_SNAPSHOT_PREFIX: &str = "ur_net_results_";

/// Extension of parseable snapshots
pub const SNAPSHOT_EXTENSION: &str = "json";

/// Per-listing check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Success,
    #[serde(alias = "failed")]
    Error,
    #[serde(other)]
    Unknown,
}

/// One listing as reported by the check job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingResult {
    pub url: String,
    #[serde(default)]
    pub property_name: String,
    #[serde(default)]
    pub total_vacant: u32,
    pub status: ListingStatus,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ListingResult {
    /// Whether this listing counts towards vacancy tracking
    pub fn has_vacancy(&self) -> bool {
        self.status == ListingStatus::Success && self.total_vacant > 0
    }
}

/// Aggregate counts of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_checked: u64,
    pub total_vacant_rooms: u64,
    pub properties_with_vacancies: u64,
}

impl Summary {
    pub fn from_results(results: &[ListingResult]) -> Self {
        let mut summary = Summary {
            total_checked: results.len() as u64,
            ..Default::default()
        };

        for result in results.iter().filter(|r| r.has_vacancy()) {
            summary.total_vacant_rooms += u64::from(result.total_vacant);
            summary.properties_with_vacancies += 1;
        }

        summary
    }
}

/// Parsed snapshot file
///
/// Older files carry `total_checked` / `total_vacant_rooms` at the top level
/// instead of a `summary` object; those fields are ignored and the summary is
/// derived from `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    pub results: Vec<ListingResult>,
}

impl Snapshot {
    pub fn effective_summary(&self) -> Summary {
        self.summary
            .unwrap_or_else(|| Summary::from_results(&self.results))
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Reference to a snapshot file in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    pub path: PathBuf,
    pub file_name: String,
    pub stamp: RunStamp,
    /// Modification time (epoch ms)
    pub modified_millis: i64,
    pub size_bytes: u64,
}

impl SnapshotRef {
    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    /// Most recent by modification time; ties resolved by filename
    pub fn most_recent<'a, I>(refs: I) -> Option<&'a SnapshotRef>
    where
        I: IntoIterator<Item = &'a SnapshotRef>,
    {
        refs.into_iter().max_by(|a, b| {
            a.modified_millis
                .cmp(&b.modified_millis)
                .then_with(|| a.file_name.cmp(&b.file_name))
        })
    }
}

/// Build the filename for a snapshot taken at `stamp`
pub fn snapshot_file_name(prefix: &str, stamp: &RunStamp) -> String {
    format!("{prefix}{stamp}.{SNAPSHOT_EXTENSION}")
}

/// Extract the run stamp from a snapshot filename
///
/// Returns None for files that do not follow `<prefix><stamp>.json`.
pub fn parse_snapshot_name(file_name: &str, prefix: &str) -> Option<RunStamp> {
    let stem = file_name
        .strip_prefix(prefix)?
        .strip_suffix(SNAPSHOT_EXTENSION)?
        .strip_suffix('.')?;
    RunStamp::parse(stem).ok()
}
