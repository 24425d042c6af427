//! Browser driver seam
//!
//! Everything the suite needs from a browser goes through [`BrowserDriver`].
//! A [`DriverLauncher`] hands out one fresh driver per test.

use async_trait::async_trait;
use docsuite_common::Attachment;
use std::path::Path;

use crate::config::Project;
use crate::error::DriverError;

pub mod memory;
pub mod playwright;

pub use memory::{InMemoryDriver, InMemoryLauncher, Page, Site};
pub use playwright::{PlaywrightDriver, PlaywrightLauncher};

pub type DriverResult<T> = Result<T, DriverError>;

/// Reference to a located element, valid for the driver that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub id: u64,
    pub selector: String,
}

/// Browser automation operations.
///
/// Every call may suspend while the browser works. Failures are driver-level
/// errors, distinct from assertion mismatches.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// Resolve a selector; `DriverError::NotFound` when nothing matches
    async fn locate(&mut self, selector: &str) -> DriverResult<ElementHandle>;

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    async fn fill(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    /// Press a key or chord on the page, e.g. `Enter` or `Control+KeyK`
    async fn send_key(&mut self, key: &str) -> DriverResult<()>;

    async fn title(&mut self) -> DriverResult<String>;

    async fn url(&mut self) -> DriverResult<String>;

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String>;

    async fn is_visible(&mut self, element: &ElementHandle) -> DriverResult<bool>;

    /// Capture the current page as PNG
    async fn screenshot(&mut self, path: &Path) -> DriverResult<()>;

    /// End the session, returning any recorded video/trace artifacts
    async fn close(&mut self) -> DriverResult<Vec<Attachment>>;
}

/// Starts browser sessions for a project
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    /// `artifacts_dir` is private to this test run
    async fn launch(
        &self,
        project: &Project,
        artifacts_dir: &Path,
    ) -> DriverResult<Box<dyn BrowserDriver>>;
}
