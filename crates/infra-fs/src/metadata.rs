// File metadata helpers

use chrono::{DateTime, Utc};
use std::fs::Metadata;

/// Modification time in epoch ms, 0 if the platform does not report it
pub(crate) fn modified_millis(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
        .unwrap_or(0)
}
