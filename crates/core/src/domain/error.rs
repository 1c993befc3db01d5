// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid run stamp '{0}': expected YYYYMMDD_HHMMSS")]
    InvalidStamp(String),

    #[error("Invalid lock token: {0}")]
    InvalidLockToken(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
