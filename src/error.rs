//! Error handling module for the installer core
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Descriptor, validation, progress and worker failures all surface through
//! [`InstallerError`] so callers have a single channel to report from.

use crate::descriptor::DescriptorError;
use crate::progress::ProgressError;
use crate::validation::ValidationErrors;
use crate::worker::WorkerTransitionError;
use thiserror::Error;

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallerError {
    /// IO errors (file operations, device probing, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor could not be read, parsed, expanded or written
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// The installation plan violates one or more constraints
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// A pre-check or install step failed
    #[error("{0}")]
    Worker(String),

    /// A progress client received an out-of-order or malformed event
    #[error("Progress protocol error: {0}")]
    Progress(#[from] ProgressError),

    /// Another worker already owns the progress session
    #[error("Another installation run is already in progress")]
    Busy,

    /// Worker lifecycle or other state errors
    #[error("State error: {0}")]
    State(String),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallerError>;

impl InstallerError {
    /// Create a worker step error
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }

    /// First line of the message, suitable for inline display.
    ///
    /// The remaining lines are diagnostic detail and belong in the log.
    pub fn summary(&self) -> String {
        first_line(&self.to_string()).to_string()
    }
}

impl From<WorkerTransitionError> for InstallerError {
    fn from(err: WorkerTransitionError) -> Self {
        InstallerError::State(err.to_string())
    }
}

/// Returns the first line of an error message.
pub fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstallerError::state("worker already signaled");
        assert_eq!(err.to_string(), "State error: worker already signaled");

        let err = InstallerError::worker("mkfs failed");
        assert_eq!(err.to_string(), "mkfs failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: InstallerError = io_err.into();
        assert!(matches!(err, InstallerError::Io(_)));
    }

    #[test]
    fn test_summary_takes_first_line() {
        let err = InstallerError::worker("partitioning failed\nsgdisk: device busy\nexit 4");
        assert_eq!(err.summary(), "partitioning failed");
    }

    #[test]
    fn test_first_line_of_empty_message() {
        assert_eq!(first_line(""), "");
    }
}
