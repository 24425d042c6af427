//! Test runner: schedules specs across projects and reports each outcome

use docsuite_common::{
    Aggregator, AllureSink, Attachment, FanoutSink, ReportRecord, ReportSink, Status, TestCase,
    TestError, TestHandle,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::{Project, SuiteConfig};
use crate::driver::playwright::{TRACE_CONTENT_TYPE, VIDEO_CONTENT_TYPE};
use crate::driver::{BrowserDriver, DriverLauncher};
use crate::error::{E2eError, E2eResult};
use crate::executor::{sanitize, Executor, RandomSource};
use crate::expect::Expect;
use crate::reporter::ListReporter;
use crate::spec::TestSpec;

/// Time allowed to collect artifacts once a test has already failed
const ARTIFACT_GRACE: Duration = Duration::from_secs(10);

/// Result of running a set of tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub broken: usize,
    pub skipped: usize,
    /// Tests carrying the flaky hint, whatever their status
    pub flaky: usize,
    pub duration_ms: u64,
    pub records: Vec<ReportRecord>,
}

impl TestSuiteResult {
    fn push(&mut self, record: ReportRecord) {
        self.total += 1;
        match record.status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
            Status::Broken | Status::Pending | Status::Running => self.broken += 1,
        }
        if record.flaky {
            self.flaky += 1;
        }
        self.records.push(record);
    }

    /// No failed or broken tests
    pub fn success(&self) -> bool {
        self.failed == 0 && self.broken == 0
    }

    pub fn record(&self, name: &str) -> Option<&ReportRecord> {
        self.records.iter().find(|r| r.name == name)
    }
}

struct Shared {
    config: SuiteConfig,
    launcher: Arc<dyn DriverLauncher>,
    aggregator: Aggregator,
    random: Option<RandomSource>,
}

/// Runs test specs through a driver launcher and a reporting sink
pub struct TestRunner {
    shared: Arc<Shared>,
}

impl TestRunner {
    /// Create a runner reporting into `sink`
    pub fn new(config: SuiteConfig, launcher: Arc<dyn DriverLauncher>, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                launcher,
                aggregator: Aggregator::new(sink),
                random: None,
            }),
        }
    }

    /// Create a runner with the sinks named in the configuration, plus
    /// any `extra` sinks
    pub fn from_config(
        config: SuiteConfig,
        launcher: Arc<dyn DriverLauncher>,
        extra: Vec<Arc<dyn ReportSink>>,
    ) -> E2eResult<Self> {
        let mut fanout = FanoutSink::new();
        if config.reporters.list {
            fanout.push(Arc::new(ListReporter::new()));
        }
        if let Some(allure) = &config.reporters.allure {
            let sink = AllureSink::new(&allure.results_dir)
                .with_detail(allure.detail)
                .with_environment(allure.environment());
            sink.init(allure.clean)?;
            fanout.push(Arc::new(sink));
        }
        for sink in extra {
            fanout.push(sink);
        }
        if fanout.is_empty() {
            warn!("No reporters configured; results only go to test-results.json");
        }
        Ok(Self::new(config, launcher, Arc::new(fanout)))
    }

    /// Replace the random source used by `expect_random_above`
    pub fn with_random(mut self, random: RandomSource) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.random = Some(random);
        }
        self
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.shared.config
    }

    /// Run all tests in the test directory
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.shared.config.test_dir)?;
        Ok(self.run_specs(&specs).await)
    }

    /// Run tests matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.shared.config.test_dir)?;
        let filtered: Vec<TestSpec> = TestSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_specs(&filtered).await)
    }

    /// Run a specific test by name, once per project
    pub async fn run_test(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.shared.config.test_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::TestNotFound(name.to_string()))?;
        Ok(self.run_specs(std::slice::from_ref(&spec)).await)
    }

    /// Run specs against every configured project.
    ///
    /// Up to `workers` tests run at once, each with its own driver and test
    /// handle. Records come back in spec order.
    pub async fn run_specs(&self, specs: &[TestSpec]) -> TestSuiteResult {
        let start = Instant::now();
        let config = &self.shared.config;
        let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));

        info!(
            "Running {} test(s) across {} project(s) with {} worker(s)...",
            specs.len(),
            config.projects.len(),
            config.workers
        );

        let mut jobs = Vec::new();
        for spec in specs {
            for project in &config.projects {
                let test = TestHandle::new(
                    TestCase::new(&spec.name)
                        .with_full_name(spec.full_name())
                        .with_project(&project.name),
                );
                let task = {
                    let shared = self.shared.clone();
                    let semaphore = semaphore.clone();
                    let test = test.clone();
                    let spec = spec.clone();
                    let project = project.clone();
                    tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await;
                        run_one(&shared, &test, &spec, &project).await
                    })
                };
                jobs.push((test, task));
            }
        }

        let mut result = TestSuiteResult::default();
        for (test, task) in jobs {
            let record = match task.await {
                Ok(Ok(record)) => Some(record),
                Ok(Err(e)) => {
                    error!("✗ {} - {}", test.name(), e);
                    self.report_failure(&test, e.into())
                }
                Err(join) if join.is_panic() => {
                    let msg = panic_message(join.into_panic());
                    error!("✗ {} panicked: {}", test.name(), msg);
                    self.report_failure(&test, TestError::Panicked(msg))
                }
                Err(join) => {
                    error!("✗ {} - task cancelled: {}", test.name(), join);
                    self.report_failure(&test, TestError::Panicked(join.to_string()))
                }
            };
            if let Some(record) = record {
                result.push(record);
            }
        }

        self.shared.aggregator.flush();
        result.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} failed, {} broken, {} skipped ({} ms)",
            result.passed, result.failed, result.broken, result.skipped, result.duration_ms
        );
        result
    }

    /// Emit the record for a test whose task ended without reporting it.
    ///
    /// Works whether or not the test got to start; `None` only when a record
    /// was already emitted.
    fn report_failure(&self, test: &TestHandle, err: TestError) -> Option<ReportRecord> {
        match self.shared.aggregator.abort(test, err) {
            Ok(record) => Some(record),
            Err(e) => {
                error!("Could not report '{}': {}", test.name(), e);
                None
            }
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        let output_dir = &self.shared.config.output_dir;
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Apply spec metadata, then either skip or execute the test
async fn run_one(
    shared: &Shared,
    test: &TestHandle,
    spec: &TestSpec,
    project: &Project,
) -> E2eResult<ReportRecord> {
    if let Some(description) = &spec.description {
        test.set_description(description.clone())?;
    }
    if let Some(epic) = &spec.epic {
        test.epic(epic.clone())?;
    }
    if let Some(feature) = &spec.feature {
        test.feature(feature.clone())?;
    }
    if let Some(story) = &spec.story {
        test.story(story.clone())?;
    }
    test.add_tags(spec.tags.iter().cloned())?;
    if spec.flaky {
        test.mark_flaky()?;
    }

    if let Some(reason) = spec.skip.reason() {
        test.request_skip(reason)?;
        debug!("Skipping test: {}", spec.name);
        return Ok(shared.aggregator.skip(test)?);
    }

    let timeout = spec
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| shared.config.timeout());

    test.start()?;
    // launch, steps and artifact collection all count against the timeout
    let deadline = tokio::time::Instant::now() + timeout;
    debug!("Running test: {} [{}]", spec.name, project.name);

    let dir = shared.config.artifacts_dir().join(format!(
        "{}-{}-{}",
        sanitize(&spec.full_name()),
        sanitize(&project.name),
        test.with(|c| c.uuid().simple().to_string()[..8].to_string())
    ));

    let launched = tokio::time::timeout_at(deadline, shared.launcher.launch(project, &dir)).await;
    let mut driver = match launched {
        Ok(Ok(driver)) => driver,
        Ok(Err(e)) => return Ok(shared.aggregator.complete(test, Err(e.into()))?),
        Err(_) => return timed_out(shared, test, spec, timeout),
    };

    let mut executor = Executor::new(test, Expect::new(shared.config.expect_timeout()), &dir);
    if let Some(random) = shared.random {
        executor = executor.with_random(random);
    }

    let outcome =
        tokio::time::timeout_at(deadline, executor.run_steps(driver.as_mut(), &spec.steps)).await;
    let passed = matches!(outcome, Ok(Ok(())));

    // a passing test must still close its browser in time
    let collect_by = if passed {
        deadline
    } else {
        tokio::time::Instant::now() + ARTIFACT_GRACE
    };
    let collected = tokio::time::timeout_at(
        collect_by,
        collect_artifacts(shared, test, driver.as_mut(), &dir, passed),
    )
    .await
    .is_ok();
    if !collected {
        warn!("Collecting artifacts for '{}' ran out of time", spec.name);
    }

    match outcome {
        Ok(result) if collected || result.is_err() => Ok(shared.aggregator.complete(test, result)?),
        _ => timed_out(shared, test, spec, timeout),
    }
}

fn timed_out(
    shared: &Shared,
    test: &TestHandle,
    spec: &TestSpec,
    timeout: Duration,
) -> E2eResult<ReportRecord> {
    warn!("Test '{}' timed out after {:?}", spec.name, timeout);
    Ok(shared.aggregator.abort(test, TestError::Timeout(timeout))?)
}

/// Final screenshot plus whatever the driver recorded, filtered by the
/// capture modes
async fn collect_artifacts(
    shared: &Shared,
    test: &TestHandle,
    driver: &mut dyn BrowserDriver,
    dir: &Path,
    passed: bool,
) {
    let capture = &shared.config.artifacts;
    if capture.screenshot.keep(passed) {
        let path = dir.join("screenshot.png");
        match driver.screenshot(&path).await {
            Ok(()) => attach(test, Attachment::png("screenshot", path)),
            Err(e) => debug!("Final screenshot failed: {}", e),
        }
    }

    match driver.close().await {
        Ok(artifacts) => {
            for artifact in artifacts {
                let keep = match artifact.content_type.as_str() {
                    VIDEO_CONTENT_TYPE => capture.video.keep(passed),
                    TRACE_CONTENT_TYPE => capture.trace.keep(passed),
                    _ => true,
                };
                if keep {
                    attach(test, artifact);
                } else if let Err(e) = std::fs::remove_file(&artifact.source) {
                    debug!("Could not remove {}: {}", artifact.source.display(), e);
                }
            }
        }
        Err(e) => warn!("Closing browser for '{}' failed: {}", test.name(), e),
    }
}

fn attach(test: &TestHandle, attachment: Attachment) {
    if let Err(e) = test.attach_to_test(attachment) {
        warn!("Dropping attachment: {}", e);
    }
}
