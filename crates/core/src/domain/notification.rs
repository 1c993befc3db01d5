// Notification Domain Model

use std::collections::HashMap;
use std::fmt;

/// Transport settings shared with the external mail job
///
/// Notification is opt-in: the config only exists when a destination and
/// both SMTP credentials are present.
#[derive(Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub to_addr: String,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
    pub from_addr: Option<String>,
    pub bcc_addr: Option<String>,
}

impl NotificationConfig {
    /// Build from `KEY=VALUE` pairs. Keys are matched case-insensitively and
    /// blank values count as absent.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Option<Self> {
        let lookup: HashMap<String, &str> = pairs
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        let get = |key: &str| lookup.get(key).map(|v| v.to_string());

        Some(Self {
            to_addr: get("default_to_addr")?,
            smtp_user: get("smtp_user")?,
            smtp_pass: get("smtp_pass")?,
            smtp_server: get("smtp_server"),
            smtp_port: get("smtp_port").and_then(|p| p.parse().ok()),
            from_addr: get("from_addr"),
            bcc_addr: get("bcc_addr"),
        })
    }
}

impl fmt::Debug for NotificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationConfig")
            .field("to_addr", &self.to_addr)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_pass", &"<redacted>")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("from_addr", &self.from_addr)
            .field("bcc_addr", &self.bcc_addr)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Destination or credentials missing
    NotConfigured,
    /// Diff is not notify-worthy
    NothingNew,
    /// Run was started with `--dry-run`
    DryRun,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotConfigured => write!(f, "notification not configured"),
            SkipReason::NothingNew => write!(f, "nothing new"),
            SkipReason::DryRun => write!(f, "dry run"),
        }
    }
}

/// What the dispatcher did with a diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Skipped(SkipReason),
    Failed {
        exit_code: Option<i32>,
        output: String,
    },
}

impl DispatchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchOutcome::Failed { .. })
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Sent => write!(f, "sent"),
            DispatchOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
            DispatchOutcome::Failed { exit_code: Some(code), .. } => {
                write!(f, "failed (exit code {code})")
            }
            DispatchOutcome::Failed { exit_code: None, .. } => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_requires_destination_and_credentials() {
        assert!(NotificationConfig::from_pairs(&pairs(&[])).is_none());
        assert!(NotificationConfig::from_pairs(&pairs(&[
            ("DEFAULT_TO_ADDR", "ops@example.com"),
            ("SMTP_USER", "bot"),
        ]))
        .is_none());
        assert!(NotificationConfig::from_pairs(&pairs(&[
            ("DEFAULT_TO_ADDR", "  "),
            ("SMTP_USER", "bot"),
            ("SMTP_PASS", "secret"),
        ]))
        .is_none());
    }

    #[test]
    fn test_config_from_pairs() {
        let config = NotificationConfig::from_pairs(&pairs(&[
            ("DEFAULT_TO_ADDR", "ops@example.com"),
            ("smtp_user", "bot"),
            ("SMTP_PASS", "secret"),
            ("SMTP_PORT", "587"),
        ]))
        .unwrap();

        assert_eq!(config.to_addr, "ops@example.com");
        assert_eq!(config.smtp_port, Some(587));
        assert!(config.smtp_server.is_none());
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(DispatchOutcome::Sent.to_string(), "sent");
        assert_eq!(
            DispatchOutcome::Skipped(SkipReason::NotConfigured).to_string(),
            "skipped (notification not configured)"
        );
        let failed = DispatchOutcome::Failed {
            exit_code: Some(2),
            output: String::new(),
        };
        assert!(failed.is_failed());
        assert_eq!(failed.to_string(), "failed (exit code 2)");
    }
}
