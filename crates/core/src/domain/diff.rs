//! Snapshot comparison.
//!
//! Compares the vacancy counts of two snapshots:
//! - Listings are matched by URL
//! - Only listings with at least one vacancy are tracked
//! - A listing is `new` when it gained vacancies, `increased` when its count grew
//!
//! The result is deterministic: the same pair always yields an identical
//! `DiffResult`.

use std::collections::{BTreeMap, BTreeSet};

use super::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    New,
    Increased,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::New => "new",
            ChangeKind::Increased => "increased",
        }
    }
}

/// One notify-worthy listing change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingChange {
    pub url: String,
    pub property_name: String,
    pub previous_vacant: u32,
    pub current_vacant: u32,
    pub kind: ChangeKind,
}

/// Why a diff is (or is not) notify-worthy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyReason {
    /// No previous snapshot exists
    FirstRun,
    /// At least one listing gained vacancies
    VacanciesAppeared,
    /// Nothing new since the previous snapshot
    NoChange,
    /// The comparison itself failed; notification errs on the side of sending
    DetectionFailed(String),
}

impl std::fmt::Display for NotifyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyReason::FirstRun => write!(f, "first run"),
            NotifyReason::VacanciesAppeared => write!(f, "new vacancies"),
            NotifyReason::NoChange => write!(f, "no new vacancies"),
            NotifyReason::DetectionFailed(e) => write!(f, "detection failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub new_vacant: BTreeSet<String>,
    pub increased_vacant: BTreeSet<String>,
    pub should_notify: bool,
    pub reason: NotifyReason,
    /// Filename of the snapshot compared against
    pub previous_file: Option<String>,
    /// Notify-worthy changes, ordered by URL
    pub changes: Vec<ListingChange>,
    pub previous_vacant_count: usize,
    pub current_vacant_count: usize,
}

impl DiffResult {
    /// Result for a run with no previous snapshot
    pub fn first_run(current: &Snapshot, notify: bool) -> Self {
        Self {
            new_vacant: BTreeSet::new(),
            increased_vacant: BTreeSet::new(),
            should_notify: notify,
            reason: NotifyReason::FirstRun,
            previous_file: None,
            changes: Vec::new(),
            previous_vacant_count: 0,
            current_vacant_count: vacancy_map(current).len(),
        }
    }

    /// Result used when detection failed and the run must not stay silent
    pub fn detection_failed(error: impl Into<String>) -> Self {
        Self {
            new_vacant: BTreeSet::new(),
            increased_vacant: BTreeSet::new(),
            should_notify: true,
            reason: NotifyReason::DetectionFailed(error.into()),
            previous_file: None,
            changes: Vec::new(),
            previous_vacant_count: 0,
            current_vacant_count: 0,
        }
    }

    pub fn is_first_run(&self) -> bool {
        matches!(self.reason, NotifyReason::FirstRun)
    }
}

/// URL -> (vacancy count, property name), vacant listings only
fn vacancy_map(snapshot: &Snapshot) -> BTreeMap<&str, (u32, &str)> {
    snapshot
        .results
        .iter()
        .filter(|r| r.has_vacancy())
        .map(|r| (r.url.as_str(), (r.total_vacant, r.property_name.as_str())))
        .collect()
}

/// Compare `current` against `previous`
pub fn compare_snapshots(
    previous: &Snapshot,
    current: &Snapshot,
    previous_file: impl Into<String>,
) -> DiffResult {
    let previous_map = vacancy_map(previous);
    let current_map = vacancy_map(current);

    let mut new_vacant = BTreeSet::new();
    let mut increased_vacant = BTreeSet::new();
    let mut changes = Vec::new();

    for (url, (current_count, name)) in &current_map {
        let change = match previous_map.get(url) {
            None => Some((0, ChangeKind::New)),
            Some((previous_count, _)) if current_count > previous_count => {
                Some((*previous_count, ChangeKind::Increased))
            }
            Some(_) => None,
        };

        let Some((previous_count, kind)) = change else {
            continue;
        };

        match kind {
            ChangeKind::New => new_vacant.insert(url.to_string()),
            ChangeKind::Increased => increased_vacant.insert(url.to_string()),
        };

        changes.push(ListingChange {
            url: url.to_string(),
            property_name: name.to_string(),
            previous_vacant: previous_count,
            current_vacant: *current_count,
            kind,
        });
    }

    let should_notify = !new_vacant.is_empty() || !increased_vacant.is_empty();

    DiffResult {
        new_vacant,
        increased_vacant,
        should_notify,
        reason: if should_notify {
            NotifyReason::VacanciesAppeared
        } else {
            NotifyReason::NoChange
        },
        previous_file: Some(previous_file.into()),
        changes,
        previous_vacant_count: previous_map.len(),
        current_vacant_count: current_map.len(),
    }
}
