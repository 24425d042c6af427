//! Test case state machine and the handle tests use to record into it
//!
//! ```text
//! pending ──start──▶ running ──finish──▶ passed | failed | broken
//!    │                  └──────abort───▶ failed | broken
//!    ├──abort (never started)──────────▶ failed | broken
//!    └──request_skip + finish_skipped──▶ skipped
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result, TestError};
use crate::metadata::Metadata;
use crate::recorder::{StepHandle, StepRecorder};
use crate::report::{duration_ms, ReportRecord};
use crate::types::{Attachment, ErrorDetail, LabelKind, Outcome, Status};

/// One test's identity, status, steps and metadata
#[derive(Debug)]
pub struct TestCase {
    uuid: Uuid,
    name: String,
    full_name: String,
    project: Option<String>,
    status: Status,
    recorder: StepRecorder,
    metadata: Metadata,
    flaky: bool,
    skip_reason: Option<String>,
    start: Option<DateTime<Utc>>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uuid: Uuid::new_v4(),
            full_name: name.clone(),
            name,
            project: None,
            status: Status::Pending,
            recorder: StepRecorder::new(),
            metadata: Metadata::new(),
            flaky: false,
            skip_reason: None,
            start: None,
        }
    }

    /// Qualified name, e.g. `documentation.yaml::Should display the logo`
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    /// Browser project this run belongs to
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn recorder(&self) -> &StepRecorder {
        &self.recorder
    }

    pub fn is_flaky(&self) -> bool {
        self.flaky
    }

    pub fn skip_requested(&self) -> bool {
        self.skip_reason.is_some()
    }

    /// `pending → running`
    pub fn start(&mut self) -> Result<()> {
        if self.status != Status::Pending || self.skip_requested() {
            return Err(CoreError::invalid_state("start", self.status));
        }
        self.status = Status::Running;
        self.start = Some(Utc::now());
        debug!(test = %self.name, "test started");
        Ok(())
    }

    /// Ask for the test to be skipped; only valid before it starts
    pub fn request_skip(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.status != Status::Pending {
            return Err(CoreError::invalid_state("skip", self.status));
        }
        self.skip_reason = Some(reason.into());
        Ok(())
    }

    /// Annotate the report as known-flaky. Does not affect the outcome.
    pub fn mark_flaky(&mut self) -> Result<()> {
        self.ensure_mutable("mark flaky")?;
        self.flaky = true;
        Ok(())
    }

    pub fn set_description(&mut self, text: impl Into<String>) -> Result<()> {
        self.ensure_mutable("set description")?;
        self.metadata.set_description(text);
        Ok(())
    }

    pub fn set_label(&mut self, kind: LabelKind, value: impl Into<String>) -> Result<()> {
        self.ensure_mutable("set label")?;
        self.metadata.set_label(kind, value);
        Ok(())
    }

    pub fn add_tags<I, S>(&mut self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_mutable("add tags")?;
        self.metadata.add_tags(tags);
        Ok(())
    }

    pub fn begin_step(&mut self, name: impl Into<String>) -> Result<StepHandle> {
        self.ensure_running("begin step")?;
        Ok(self.recorder.begin(name))
    }

    pub fn end_step(&mut self, handle: StepHandle, outcome: &Outcome) -> Result<Status> {
        self.ensure_running("end step")?;
        self.recorder.end(handle, outcome)
    }

    pub fn record_action(&mut self, outcome: &Outcome) -> Result<()> {
        self.ensure_running("record action")?;
        self.recorder.record_action(outcome);
        Ok(())
    }

    pub fn attach(&mut self, attachment: Attachment) -> Result<()> {
        self.ensure_running("attach")?;
        self.recorder.attach(attachment);
        Ok(())
    }

    /// Attach a test-level artifact (final screenshot, video, trace)
    pub fn attach_to_test(&mut self, attachment: Attachment) -> Result<()> {
        self.ensure_running("attach")?;
        self.recorder.attach_root(attachment);
        Ok(())
    }

    /// Finalize after the test body returned.
    ///
    /// Steps still open at this point were never closed by the body; they are
    /// closed as broken with a step ordering error.
    pub fn finish(&mut self, result: std::result::Result<(), TestError>) -> Result<ReportRecord> {
        if self.status == Status::Pending && self.skip_requested() {
            return self.finish_skipped();
        }
        self.ensure_running("finish")?;

        let mut result = result;
        if let Some(open) = self.recorder.current() {
            let err = TestError::Core(CoreError::StepOrdering {
                expected: open.to_string(),
                actual: "<end of test>".to_string(),
            });
            self.recorder.abort_open(&err);
            if result.is_ok() {
                result = Err(err);
            }
        }

        let mut status = self.recorder.status();
        let mut error = self.recorder.error().cloned();
        if let Err(e) = &result {
            status = status.worst(e.status());
            error = Some(ErrorDetail::from(e));
        }
        Ok(self.seal(status, error))
    }

    /// Finalize a test that was asked to skip before it started
    pub fn finish_skipped(&mut self) -> Result<ReportRecord> {
        if self.status != Status::Pending {
            return Err(CoreError::invalid_state("finish skipped", self.status));
        }
        if self.skip_reason.is_none() {
            self.skip_reason = Some(String::new());
        }
        self.start = Some(Utc::now());
        Ok(self.seal(Status::Skipped, None))
    }

    /// Truncate a test (timeout, panic). Open steps are closed with the
    /// error and the partial tree is reported.
    ///
    /// A test that never started (it failed during setup) is reported with an
    /// empty tree.
    pub fn abort(&mut self, err: TestError) -> Result<ReportRecord> {
        match self.status {
            Status::Running => {}
            Status::Pending => self.start = Some(Utc::now()),
            status => return Err(CoreError::invalid_state("abort", status)),
        }
        self.recorder.abort_open(&err);
        let status = self.recorder.status().worst(err.status());
        Ok(self.seal(status, Some(ErrorDetail::from(&err))))
    }

    fn seal(&mut self, status: Status, error: Option<ErrorDetail>) -> ReportRecord {
        self.status = status;
        let steps = self.recorder.records();
        let start = self.start.unwrap_or_else(Utc::now);
        let mut stop = Utc::now().max(start);
        if let Some(last) = steps.last() {
            stop = stop.max(last.stop);
        }
        debug!(test = %self.name, %status, "test finished");

        ReportRecord {
            uuid: self.uuid,
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            project: self.project.clone(),
            status,
            description: self.metadata.description.clone(),
            labels: self.metadata.labels.clone(),
            tags: self.metadata.tags.clone(),
            steps,
            attachments: self.recorder.root_attachments().to_vec(),
            start,
            stop,
            duration_ms: duration_ms(start, stop),
            error: error.or_else(|| {
                self.skip_reason
                    .as_ref()
                    .filter(|r| status == Status::Skipped && !r.is_empty())
                    .map(|r| ErrorDetail {
                        message: r.clone(),
                        expected: None,
                        actual: None,
                    })
            }),
            flaky: self.flaky,
        }
    }

    fn ensure_mutable(&self, operation: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CoreError::invalid_state(operation, self.status));
        }
        Ok(())
    }

    fn ensure_running(&self, operation: &str) -> Result<()> {
        if self.status != Status::Running {
            return Err(CoreError::invalid_state(operation, self.status));
        }
        Ok(())
    }
}

/// Shared handle to a [`TestCase`].
///
/// Every step and metadata call goes through a handle owned by the test
/// being executed. Handles are cheap to clone; the lock is never held across
/// an `.await`.
#[derive(Debug, Clone)]
pub struct TestHandle {
    inner: Arc<Mutex<TestCase>>,
}

impl TestHandle {
    pub fn new(case: TestCase) -> Self {
        Self {
            inner: Arc::new(Mutex::new(case)),
        }
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn status(&self) -> Status {
        self.inner.lock().status
    }

    /// Run a closure against the underlying test case
    pub fn with<R>(&self, f: impl FnOnce(&mut TestCase) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn start(&self) -> Result<()> {
        self.inner.lock().start()
    }

    pub fn request_skip(&self, reason: impl Into<String>) -> Result<()> {
        self.inner.lock().request_skip(reason)
    }

    pub fn mark_flaky(&self) -> Result<()> {
        self.inner.lock().mark_flaky()
    }

    pub fn set_description(&self, text: impl Into<String>) -> Result<()> {
        self.inner.lock().set_description(text)
    }

    pub fn set_label(&self, kind: LabelKind, value: impl Into<String>) -> Result<()> {
        self.inner.lock().set_label(kind, value)
    }

    pub fn epic(&self, value: impl Into<String>) -> Result<()> {
        self.set_label(LabelKind::Epic, value)
    }

    pub fn feature(&self, value: impl Into<String>) -> Result<()> {
        self.set_label(LabelKind::Feature, value)
    }

    pub fn story(&self, value: impl Into<String>) -> Result<()> {
        self.set_label(LabelKind::Story, value)
    }

    pub fn add_tags<I, S>(&self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.lock().add_tags(tags)
    }

    pub fn begin_step(&self, name: impl Into<String>) -> Result<StepHandle> {
        self.inner.lock().begin_step(name)
    }

    pub fn end_step(&self, handle: StepHandle, outcome: &Outcome) -> Result<Status> {
        self.inner.lock().end_step(handle, outcome)
    }

    pub fn attach(&self, attachment: Attachment) -> Result<()> {
        self.inner.lock().attach(attachment)
    }

    pub fn attach_to_test(&self, attachment: Attachment) -> Result<()> {
        self.inner.lock().attach_to_test(attachment)
    }

    /// Run `body` as a named step.
    ///
    /// The step is opened before `body` is polled and closed with its
    /// outcome. Errors are recorded on the step and returned unchanged so
    /// enclosing steps see them too.
    pub async fn step<T, F>(&self, name: impl Into<String>, body: F) -> std::result::Result<T, TestError>
    where
        F: Future<Output = std::result::Result<T, TestError>>,
    {
        let handle = self.begin_step(name)?;
        let result = body.await;
        if let Err(e) = self.end_step(handle, &Outcome::from(&result)) {
            // the body's own failure is the more useful one to report
            if result.is_err() {
                warn!(test = %self.name(), error = %e, "could not close step");
                return result;
            }
            return Err(e.into());
        }
        result
    }

    /// Run `body` as an implicit, unnamed action
    pub async fn action<T, F>(&self, body: F) -> std::result::Result<T, TestError>
    where
        F: Future<Output = std::result::Result<T, TestError>>,
    {
        let result = body.await;
        self.inner.lock().record_action(&Outcome::from(&result))?;
        result
    }

    pub fn finish(&self, result: std::result::Result<(), TestError>) -> Result<ReportRecord> {
        self.inner.lock().finish(result)
    }

    pub fn finish_skipped(&self) -> Result<ReportRecord> {
        self.inner.lock().finish_skipped()
    }

    pub fn abort(&self, err: TestError) -> Result<ReportRecord> {
        self.inner.lock().abort(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn running(name: &str) -> TestHandle {
        let t = TestHandle::new(TestCase::new(name));
        t.start().unwrap();
        t
    }

    #[test]
    fn test_zero_steps_passes_with_empty_tree() {
        let t = running("no steps");
        let record = t.finish(Ok(())).unwrap();
        assert_eq!(record.status, Status::Passed);
        assert!(record.steps.is_empty());
        assert!(record.error.is_none());
        assert!(record.start <= record.stop);
    }

    #[tokio::test]
    async fn test_step_helper_records_passing_step() {
        let t = running("title");
        let title = t
            .step("check title", async { Ok::<_, TestError>("Example Domain") })
            .await
            .unwrap();
        assert_eq!(title, "Example Domain");

        let record = t.finish(Ok(())).unwrap();
        assert_eq!(record.status, Status::Passed);
        assert_eq!(record.steps.len(), 1);
        assert_eq!(record.steps[0].name, "check title");
        assert_eq!(record.steps[0].status, Status::Passed);
    }

    #[tokio::test]
    async fn test_nested_failure_propagates_to_test() {
        let t = running("nested");
        let result: std::result::Result<(), TestError> = t
            .step("outer", async {
                t.step("inner", async { Err(TestError::mismatch("h1", "FAQ", "Home")) })
                    .await
            })
            .await;
        assert!(result.is_err());

        let record = t.finish(result).unwrap();
        assert_eq!(record.status, Status::Failed);
        assert_eq!(record.steps[0].status, Status::Failed);
        assert_eq!(record.steps[0].steps[0].status, Status::Failed);
        let err = record.error.unwrap();
        assert_eq!(err.expected.as_deref(), Some("FAQ"));
    }

    #[tokio::test]
    async fn test_driver_error_is_broken() {
        let t = running("broken");
        let result = t
            .step("click missing element", async {
                Err::<(), _>(TestError::Driver {
                    message: "element not found: text=Nonexistent".into(),
                })
            })
            .await;
        let record = t.finish(result).unwrap();
        assert_eq!(record.status, Status::Broken);
        assert_eq!(record.steps[0].status, Status::Broken);
    }

    #[tokio::test]
    async fn test_implicit_action_failure_fails_test() {
        let t = running("implicit");
        let _ = t
            .action(async { Err::<(), _>(TestError::mismatch("title", "A", "B")) })
            .await;
        let record = t.finish(Ok(())).unwrap();
        assert_eq!(record.status, Status::Failed);
        assert!(record.steps.is_empty());
        assert!(record.error.is_some());
    }

    #[test]
    fn test_skip_before_start() {
        let t = TestHandle::new(TestCase::new("skipped"));
        t.set_description("under development").unwrap();
        t.add_tags(["Navigation"]).unwrap();
        t.request_skip("Features section is under development").unwrap();
        assert!(t.start().is_err());

        let record = t.finish_skipped().unwrap();
        assert_eq!(record.status, Status::Skipped);
        assert!(record.steps.is_empty());
        assert_eq!(record.description.as_deref(), Some("under development"));
        assert_eq!(record.tags, vec!["Navigation"]);
    }

    #[test]
    fn test_skip_after_start_is_rejected() {
        let t = running("late skip");
        assert!(matches!(
            t.request_skip("too late"),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_metadata_after_finish_is_rejected() {
        let t = running("meta");
        t.set_description("before").unwrap();
        t.add_tags(["UI", "UI"]).unwrap();
        let record = t.finish(Ok(())).unwrap();

        let err = t.set_description("after").unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidState {
                operation: "set description".into(),
                status: Status::Passed
            }
        );
        assert!(t.epic("late").is_err());
        assert!(t.add_tags(["late"]).is_err());
        assert!(t.mark_flaky().is_err());

        assert_eq!(record.description.as_deref(), Some("before"));
        assert_eq!(record.tags, vec!["UI", "UI"]);
    }

    #[test]
    fn test_step_api_after_finish_is_rejected() {
        let t = running("done");
        t.finish(Ok(())).unwrap();
        assert!(t.begin_step("late").is_err());
        assert!(t.finish(Ok(())).is_err());
    }

    #[test]
    fn test_unclosed_step_is_broken_at_finish() {
        let t = running("unclosed");
        let _open = t.begin_step("never closed").unwrap();
        let record = t.finish(Ok(())).unwrap();
        assert_eq!(record.status, Status::Broken);
        assert_eq!(record.steps[0].status, Status::Broken);
    }

    #[test]
    fn test_out_of_order_end_via_handle() {
        let t = running("ordering");
        let outer = t.begin_step("outer").unwrap();
        let _inner = t.begin_step("inner").unwrap();
        let err = t.end_step(outer, &Outcome::Passed).unwrap_err();
        assert!(matches!(err, CoreError::StepOrdering { .. }));
    }

    #[test]
    fn test_abort_reports_partial_tree() {
        let t = running("timeout");
        let a = t.begin_step("done").unwrap();
        t.end_step(a, &Outcome::Passed).unwrap();
        let _b = t.begin_step("hanging").unwrap();

        let record = t.abort(TestError::Timeout(Duration::from_millis(50))).unwrap();
        assert_eq!(record.status, Status::Failed);
        assert_eq!(record.steps.len(), 2);
        assert_eq!(record.steps[0].status, Status::Passed);
        assert_eq!(record.steps[1].status, Status::Failed);
        assert!(record.error.unwrap().message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_step_keeps_body_error_when_close_fails() {
        let t = running("leaky body");
        let result: std::result::Result<(), TestError> = t
            .step("outer", async {
                // leaves a step open, so closing `outer` is out of order
                let _inner = t.begin_step("inner").unwrap();
                Err(TestError::mismatch("title", "FAQ", "Home"))
            })
            .await;

        match result {
            Err(TestError::AssertionMismatch { expected, .. }) => assert_eq!(expected, "FAQ"),
            other => panic!("expected the mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_step_reports_ordering_error_when_body_passed() {
        let t = running("leaky pass");
        let result: std::result::Result<(), TestError> = t
            .step("outer", async {
                let _inner = t.begin_step("inner").unwrap();
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(TestError::Core(CoreError::StepOrdering { .. }))
        ));
    }

    #[test]
    fn test_abort_before_start_is_broken() {
        let t = TestHandle::new(TestCase::new("never ran"));
        t.add_tags(["UI"]).unwrap();

        let record = t.abort(TestError::Panicked("launcher exploded".into())).unwrap();
        assert_eq!(record.status, Status::Broken);
        assert!(record.steps.is_empty());
        assert_eq!(record.tags, vec!["UI"]);
        assert!(record.start <= record.stop);
        assert!(t.abort(TestError::Panicked("again".into())).is_err());
    }

    #[test]
    fn test_attach_to_test_bypasses_open_step() {
        let t = running("artifacts");
        let _open = t.begin_step("hanging").unwrap();
        t.attach(Attachment::png("in step", "/tmp/a.png")).unwrap();
        t.attach_to_test(Attachment::new("video", "/tmp/v.webm", "video/webm"))
            .unwrap();

        let record = t.abort(TestError::Timeout(Duration::from_millis(10))).unwrap();
        assert_eq!(record.steps[0].attachments.len(), 1);
        assert_eq!(record.attachments.len(), 1);
        assert_eq!(record.attachments[0].name, "video");
    }

    #[test]
    fn test_flaky_hint_does_not_change_status() {
        let t = running("flaky");
        t.mark_flaky().unwrap();
        let record = t.finish(Ok(())).unwrap();
        assert!(record.flaky);
        assert_eq!(record.status, Status::Passed);
    }

    #[test]
    fn test_labels_in_record() {
        let t = running("labels");
        t.epic("Allure TestOps Documentation").unwrap();
        t.feature("Content").unwrap();
        t.story("Logo").unwrap();
        t.story("Page Title").unwrap();
        let record = t.finish(Ok(())).unwrap();
        assert_eq!(record.labels.epic.as_deref(), Some("Allure TestOps Documentation"));
        assert_eq!(record.labels.story.as_deref(), Some("Page Title"));
    }
}
