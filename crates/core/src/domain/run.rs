// Run identity: the sortable timestamp every artifact of a run is keyed by

use chrono::{NaiveDateTime, Timelike};
use std::fmt;

use super::error::{DomainError, Result};

/// Filename timestamp format, lexically sortable
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Second-resolution timestamp identifying one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunStamp(NaiveDateTime);

impl RunStamp {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at.with_nanosecond(0).unwrap_or(at))
    }

    /// Parse the `YYYYMMDD_HHMMSS` form embedded in filenames
    pub fn parse(s: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(s, STAMP_FORMAT)
            .map(Self)
            .map_err(|_| DomainError::InvalidStamp(s.to_string()))
    }

    pub fn as_datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// Human-readable form used in notification subjects
    pub fn display_minutes(&self) -> String {
        self.0.format("%Y-%m-%d %H:%M").to_string()
    }
}

impl fmt::Display for RunStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(STAMP_FORMAT))
    }
}

/// Per-run log files written to the log directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Orchestrator decisions
    Run,
    /// Combined output of the check job
    Check,
    /// Combined output of the mail job
    Notify,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Run => "run",
            LogKind::Check => "check",
            LogKind::Notify => "notify",
        }
    }

    pub fn file_name(&self, stamp: &RunStamp) -> String {
        format!("{}_{}.log", self.as_str(), stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 6)
            .unwrap()
            .and_hms_milli_opt(h, m, s, 734)
            .unwrap()
    }

    #[test]
    fn test_stamp_drops_subseconds() {
        let stamp = RunStamp::new(at(23, 18, 25));
        assert_eq!(stamp.to_string(), "20251006_231825");
        assert_eq!(stamp.as_datetime().nanosecond(), 0);
    }

    #[test]
    fn test_stamp_parse_matches_display() {
        let stamp = RunStamp::parse("20251006_231825").unwrap();
        assert_eq!(stamp, RunStamp::new(at(23, 18, 25)));
        assert_eq!(stamp.display_minutes(), "2025-10-06 23:18");
    }

    #[test]
    fn test_stamp_parse_rejects_garbage() {
        assert!(matches!(
            RunStamp::parse("2025-10-06"),
            Err(DomainError::InvalidStamp(_))
        ));
    }

    #[test]
    fn test_lexical_order_is_chronological() {
        let earlier = RunStamp::new(at(9, 5, 0)).to_string();
        let later = RunStamp::new(at(23, 0, 0)).to_string();
        assert!(earlier < later);
    }

    #[test]
    fn test_log_file_names() {
        let stamp = RunStamp::parse("20251006_231825").unwrap();
        assert_eq!(LogKind::Run.file_name(&stamp), "run_20251006_231825.log");
        assert_eq!(LogKind::Check.file_name(&stamp), "check_20251006_231825.log");
    }
}
