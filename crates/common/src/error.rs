//! Error types for docsuite

use std::time::Duration;
use thiserror::Error;

use crate::types::Status;

/// Result type alias using the core error
pub type Result<T> = std::result::Result<T, CoreError>;

/// Misuse of the step / metadata API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Step ordering violated: expected to close '{expected}', got '{actual}'")]
    StepOrdering { expected: String, actual: String },

    #[error("Invalid state: cannot {operation} while test is {status}")]
    InvalidState { operation: String, status: Status },
}

impl CoreError {
    pub(crate) fn invalid_state(operation: &str, status: Status) -> Self {
        CoreError::InvalidState {
            operation: operation.to_string(),
            status,
        }
    }
}

/// Anything that can end a step or a test with a non-passing outcome
#[derive(Error, Debug, Clone)]
pub enum TestError {
    #[error("Assertion failed: {message} (expected: {expected}, actual: {actual})")]
    AssertionMismatch {
        message: String,
        expected: String,
        actual: String,
    },

    #[error("Driver error: {message}")]
    Driver { message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Test timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Test panicked: {0}")]
    Panicked(String),
}

impl TestError {
    /// Build an assertion mismatch
    pub fn mismatch(
        message: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        TestError::AssertionMismatch {
            message: message.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Terminal status this error maps to.
    ///
    /// Assertion mismatches and timeouts are reported failures; everything
    /// else signals an environment or programming problem and is `broken`.
    pub fn status(&self) -> Status {
        match self {
            TestError::AssertionMismatch { .. } | TestError::Timeout(_) => Status::Failed,
            TestError::Driver { .. } | TestError::Core(_) | TestError::Panicked(_) => {
                Status::Broken
            }
        }
    }
}
