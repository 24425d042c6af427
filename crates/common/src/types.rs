//! Core types for docsuite

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TestError;

/// Lifecycle status shared by tests and steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
    Broken,
}

impl Default for Status {
    fn default() -> Self {
        Self::Pending
    }
}

impl Status {
    /// Whether this is one of the terminal states
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Passed | Status::Failed | Status::Skipped | Status::Broken
        )
    }

    /// Ordering used when combining outcomes: broken > failed > skipped > passed
    fn severity(self) -> u8 {
        match self {
            Status::Pending | Status::Running => 0,
            Status::Passed => 1,
            Status::Skipped => 2,
            Status::Failed => 3,
            Status::Broken => 4,
        }
    }

    /// The worse of two statuses
    pub fn worst(self, other: Status) -> Status {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Passed or skipped
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Passed | Status::Skipped)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Running => write!(f, "running"),
            Status::Passed => write!(f, "passed"),
            Status::Failed => write!(f, "failed"),
            Status::Skipped => write!(f, "skipped"),
            Status::Broken => write!(f, "broken"),
        }
    }
}

/// Classification label kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Epic,
    Feature,
    Story,
}

impl LabelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelKind::Epic => "epic",
            LabelKind::Feature => "feature",
            LabelKind::Story => "story",
        }
    }
}

impl std::fmt::Display for LabelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file captured during execution (screenshot, video, trace)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub source: PathBuf,
    #[serde(rename = "type")]
    pub content_type: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, content_type: &str) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            content_type: content_type.to_string(),
        }
    }

    pub fn png(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self::new(name, source, "image/png")
    }
}

/// Error payload carried by failed or broken steps and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl From<&TestError> for ErrorDetail {
    fn from(err: &TestError) -> Self {
        match err {
            TestError::AssertionMismatch {
                expected, actual, ..
            } => Self {
                message: err.to_string(),
                expected: Some(expected.clone()),
                actual: Some(actual.clone()),
            },
            _ => Self {
                message: err.to_string(),
                expected: None,
                actual: None,
            },
        }
    }
}

/// How a step or implicit action ended
#[derive(Debug, Clone)]
pub enum Outcome {
    Passed,
    Skipped,
    Error(TestError),
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Passed => Status::Passed,
            Outcome::Skipped => Status::Skipped,
            Outcome::Error(e) => e.status(),
        }
    }

    pub fn error(&self) -> Option<&TestError> {
        match self {
            Outcome::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl<T> From<&std::result::Result<T, TestError>> for Outcome {
    fn from(result: &std::result::Result<T, TestError>) -> Self {
        match result {
            Ok(_) => Outcome::Passed,
            Err(e) => Outcome::Error(e.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_status() {
        assert_eq!(Status::Passed.worst(Status::Failed), Status::Failed);
        assert_eq!(Status::Failed.worst(Status::Passed), Status::Failed);
        assert_eq!(Status::Failed.worst(Status::Broken), Status::Broken);
        assert_eq!(Status::Skipped.worst(Status::Passed), Status::Skipped);
        assert_eq!(Status::Running.worst(Status::Passed), Status::Passed);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&Status::Broken).unwrap();
        assert_eq!(json, "\"broken\"");
        assert!(!Status::Running.is_terminal());
        assert!(Status::Skipped.is_terminal());
    }

    #[test]
    fn test_error_detail_keeps_expected_and_actual() {
        let err = TestError::mismatch("url", "/faq", "/");
        let detail = ErrorDetail::from(&err);
        assert_eq!(detail.expected.as_deref(), Some("/faq"));
        assert_eq!(detail.actual.as_deref(), Some("/"));
    }
}
