// Lock Token
//
// Content of the singleton lock file: the owner's PID on a single line.

use super::error::{DomainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken {
    pub pid: u32,
}

impl LockToken {
    pub fn for_pid(pid: u32) -> Self {
        Self { pid }
    }

    /// Parse raw file content. Surrounding whitespace is ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let trimmed = content.trim();
        match trimmed.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(Self { pid }),
            _ => Err(DomainError::InvalidLockToken(format!("'{trimmed}'"))),
        }
    }

    pub fn to_file_content(&self) -> String {
        format!("{}\n", self.pid)
    }

    /// Whether `content` is exactly the token this process wrote
    pub fn matches(&self, content: &str) -> bool {
        Self::parse(content).map(|t| t == *self).unwrap_or(false)
    }
}
