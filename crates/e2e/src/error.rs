//! Error types for E2E testing

use docsuite_common::TestError;
use thiserror::Error;

/// Failures reported by a browser driver
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("Element not found: {selector}")]
    NotFound { selector: String },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Driver protocol error: {0}")]
    Protocol(String),

    #[error("Driver timed out: {0}")]
    Timeout(String),

    #[error("Browser session closed")]
    Closed,

    #[error("Driver IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e.to_string())
    }
}

impl From<DriverError> for TestError {
    fn from(e: DriverError) -> Self {
        TestError::Driver {
            message: e.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Test not found: {0}")]
    TestNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Core(#[from] docsuite_common::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<E2eError> for TestError {
    fn from(e: E2eError) -> Self {
        match e {
            E2eError::Driver(e) => e.into(),
            E2eError::Core(e) => TestError::Core(e),
            other => TestError::Driver {
                message: other.to_string(),
            },
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
