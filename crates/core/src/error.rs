// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Missing external job, missing input, lock file cannot be created
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Execution error: {0}")]
    Execution(#[from] crate::port::ExecutionError),

    /// Captured output is kept for the log, not the message
    #[error("Job '{job}' failed with exit code {exit_code:?}")]
    JobFailed {
        job: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("No valid snapshot appeared after {attempts} attempts")]
    SnapshotNotMaterialized { attempts: u32 },

    #[error("Detection error: {0}")]
    Detection(#[from] crate::application::change_detector::DetectionError),

    #[error("Notification failed with exit code {exit_code:?}")]
    Notification {
        exit_code: Option<i32>,
        output: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown was requested before the run finished
    #[error("Run interrupted")]
    Interrupted,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Captured job output, if the error carries any
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            AppError::JobFailed { output, .. } | AppError::Notification { output, .. } => {
                Some(output.as_str())
            }
            _ => None,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
