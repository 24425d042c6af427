//! Suite configuration (`docsuite.toml`)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};

/// Top-level suite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Directory containing YAML test specs
    pub test_dir: PathBuf,

    /// Directory for run artifacts and `test-results.json`
    pub output_dir: PathBuf,

    /// Per-test timeout
    pub timeout_ms: u64,

    /// How long assertions keep retrying before reporting a mismatch
    pub expect_timeout_ms: u64,

    /// Number of tests executed concurrently
    pub workers: usize,

    /// Reporting sinks
    pub reporters: ReporterConfig,

    /// Artifact capture
    #[serde(rename = "use")]
    pub artifacts: ArtifactConfig,

    /// Browser projects; every test runs once per project
    pub projects: Vec<Project>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            test_dir: PathBuf::from("specs"),
            output_dir: PathBuf::from("test-results"),
            timeout_ms: 30_000,
            expect_timeout_ms: 5_000,
            workers: 1,
            reporters: ReporterConfig::default(),
            artifacts: ArtifactConfig::default(),
            projects: vec![Project::default()],
        }
    }
}

impl SuiteConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| E2eError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.workers == 0 {
            return Err(E2eError::Config("workers must be at least 1".into()));
        }
        if self.projects.is_empty() {
            return Err(E2eError::Config("at least one project is required".into()));
        }
        let mut names: Vec<&str> = self.projects.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.projects.len() {
            return Err(E2eError::Config("project names must be unique".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn expect_timeout(&self) -> Duration {
        Duration::from_millis(self.expect_timeout_ms)
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Get the artifacts directory
    pub fn artifacts_dir(&self) -> PathBuf {
        self.output_dir.join("artifacts")
    }
}

/// Which reporting sinks are active
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Terminal "list" output
    pub list: bool,

    /// Allure results output
    pub allure: Option<AllureConfig>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            list: true,
            allure: Some(AllureConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllureConfig {
    pub results_dir: PathBuf,

    /// Include step trees in the results
    pub detail: bool,

    /// Remove previous results before the run
    pub clean: bool,

    /// Extra `environment.properties` entries
    pub environment_info: BTreeMap<String, String>,
}

impl Default for AllureConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("allure-results"),
            detail: true,
            clean: true,
            environment_info: BTreeMap::new(),
        }
    }
}

impl AllureConfig {
    /// Host environment merged with configured entries (configured wins)
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("os_platform".to_string(), std::env::consts::OS.to_string());
        env.insert("os_arch".to_string(), std::env::consts::ARCH.to_string());
        if let Some((release, version)) = os_release() {
            env.insert("os_release".to_string(), release);
            env.insert("os_version".to_string(), version);
        }
        env.insert(
            "docsuite_version".to_string(),
            docsuite_common::VERSION.to_string(),
        );
        env.extend(self.environment_info.clone());
        env
    }
}

/// Kernel release and version string, as `uname -r` and `uname -v` print them
#[cfg(unix)]
fn os_release() -> Option<(String, String)> {
    let uts = nix::sys::utsname::uname().ok()?;
    Some((
        uts.release().to_string_lossy().into_owned(),
        uts.version().to_string_lossy().into_owned(),
    ))
}

#[cfg(not(unix))]
fn os_release() -> Option<(String, String)> {
    None
}

/// When an artifact is kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    #[default]
    On,
    Off,
    OnlyOnFailure,
}

impl CaptureMode {
    pub fn enabled(self) -> bool {
        self != CaptureMode::Off
    }

    /// Whether to keep the artifact given whether the test passed
    pub fn keep(self, passed: bool) -> bool {
        match self {
            CaptureMode::On => true,
            CaptureMode::Off => false,
            CaptureMode::OnlyOnFailure => !passed,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub screenshot: CaptureMode,
    pub video: CaptureMode,
    pub trace: CaptureMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// A named browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub browser: Browser,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub viewport: Viewport,
}

fn default_headless() -> bool {
    true
}

impl Default for Project {
    fn default() -> Self {
        Self {
            name: "Google Chrome".to_string(),
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
        }
    }
}
