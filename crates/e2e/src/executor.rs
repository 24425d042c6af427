//! Executes spec steps against a browser, recording into a test handle

use docsuite_common::{Attachment, TestError, TestHandle};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::driver::BrowserDriver;
use crate::expect::{greater_than, Condition, Expect};
use crate::spec::{Action, SpecStep};

/// Source of uniform random numbers in [0, 1)
pub type RandomSource = fn() -> f64;

fn thread_random() -> f64 {
    rand::random::<f64>()
}

/// Per-test execution context
pub struct Executor<'a> {
    test: &'a TestHandle,
    expect: Expect,
    artifacts_dir: PathBuf,
    random: RandomSource,
}

impl<'a> Executor<'a> {
    pub fn new(test: &'a TestHandle, expect: Expect, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            test,
            expect,
            artifacts_dir: artifacts_dir.into(),
            random: thread_random,
        }
    }

    pub fn with_random(mut self, random: RandomSource) -> Self {
        self.random = random;
        self
    }

    /// Run `steps` in order, stopping at the first error.
    ///
    /// Named groups become recorded steps; bare actions are implicit and
    /// only contribute their outcome to the enclosing step.
    pub fn run_steps<'b>(
        &'b self,
        driver: &'b mut dyn BrowserDriver,
        steps: &'b [SpecStep],
    ) -> BoxFuture<'b, Result<(), TestError>> {
        async move {
            for step in steps {
                match step {
                    SpecStep::Group(group) => {
                        debug!(test = %self.test.name(), step = %group.step, "begin step");
                        self.test
                            .step(group.step.clone(), self.run_steps(&mut *driver, &group.steps))
                            .await?;
                    }
                    SpecStep::Action(action) => {
                        self.test.action(self.perform(&mut *driver, action)).await?;
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn perform(&self, driver: &mut dyn BrowserDriver, action: &Action) -> Result<(), TestError> {
        debug!(action = %action.label(), "perform");
        match action {
            Action::Navigate { url } => driver.navigate(url).await?,
            Action::Click { selector } => {
                let el = driver.locate(selector).await?;
                driver.click(&el).await?;
            }
            Action::Fill { selector, value } => {
                let el = driver.locate(selector).await?;
                driver.fill(&el, value).await?;
            }
            Action::Press { key } => driver.send_key(key).await?,
            Action::ExpectTitle(pattern) => {
                let condition = Condition::Title(matcher(pattern)?);
                self.expect.check(driver, &condition).await?;
            }
            Action::ExpectUrl(pattern) => {
                let condition = Condition::Url(matcher(pattern)?);
                self.expect.check(driver, &condition).await?;
            }
            Action::ExpectText(assertion) => {
                let condition = Condition::Text {
                    selector: assertion.selector.clone(),
                    matcher: matcher(&assertion.pattern)?,
                };
                self.expect.check(driver, &condition).await?;
            }
            Action::ExpectVisible { selector } => self.expect.visible(driver, selector).await?,
            Action::ExpectRandomAbove { threshold } => {
                let value = (self.random)();
                debug!(value, threshold, "random draw");
                greater_than("random value", value, *threshold)?;
            }
            Action::Sleep { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
            Action::Screenshot { name } => {
                std::fs::create_dir_all(&self.artifacts_dir).map_err(|e| TestError::Driver {
                    message: format!("cannot create {}: {}", self.artifacts_dir.display(), e),
                })?;
                let path = self.artifacts_dir.join(format!("{}.png", sanitize(name)));
                driver.screenshot(&path).await?;
                self.test.attach(Attachment::png(name.clone(), path))?;
            }
            Action::Log { message } => info!("[TEST LOG] {}", message),
        }
        Ok(())
    }
}

fn matcher(pattern: &crate::spec::Pattern) -> Result<crate::expect::Matcher, TestError> {
    pattern.matcher().map_err(|e| TestError::Driver {
        message: e.to_string(),
    })
}

/// File-system safe version of an artifact name
pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{InMemoryDriver, Page, Site};
    use crate::spec::TestSpec;
    use docsuite_common::{Status, TestCase};
    use std::sync::Arc;

    fn site() -> Arc<Site> {
        Arc::new(
            Site::new()
                .page(
                    Page::new("https://docs.example.com/", "Docs | Example")
                        .element("h1", "Example Docs")
                        .link("text=FAQ", "FAQ", "/faq/"),
                )
                .page(Page::new("https://docs.example.com/faq/", "FAQ").element("h1", "Frequently Asked Questions")),
        )
    }

    fn spec(yaml: &str) -> TestSpec {
        TestSpec::from_yaml(yaml).unwrap().remove(0)
    }

    async fn run(spec: &TestSpec, random: RandomSource) -> (docsuite_common::ReportRecord, tempfile::TempDir) {
        let tmp = tempfile::TempDir::new().unwrap();
        let test = TestHandle::new(TestCase::new(&spec.name));
        test.start().unwrap();
        let mut driver = InMemoryDriver::new(site());
        let result = Executor::new(&test, Expect::new(Duration::ZERO), tmp.path())
            .with_random(random)
            .run_steps(&mut driver, &spec.steps)
            .await;
        (test.finish(result).unwrap(), tmp)
    }

    #[tokio::test]
    async fn test_nested_groups_become_steps() {
        let s = spec(
            r#"
name: faq
steps:
  - step: Open docs
    steps:
      - action: navigate
        url: https://docs.example.com/
  - step: Go to FAQ
    steps:
      - step: Click link
        steps:
          - action: click
            selector: text=FAQ
      - action: expect_url
        matches: .*faq
      - action: expect_text
        selector: h1
        contains: Frequently Asked
"#,
        );
        let (record, _tmp) = run(&s, thread_random).await;
        assert_eq!(record.status, Status::Passed);
        assert_eq!(record.steps.len(), 2);
        assert_eq!(record.steps[1].steps.len(), 1);
        assert_eq!(record.steps[1].steps[0].name, "Click link");
    }

    #[tokio::test]
    async fn test_bare_actions_record_no_steps() {
        let s = spec(
            r#"
name: no steps
steps:
  - action: navigate
    url: https://docs.example.com/
  - action: expect_title
    contains: Docs
"#,
        );
        let (record, _tmp) = run(&s, thread_random).await;
        assert_eq!(record.status, Status::Passed);
        assert!(record.steps.is_empty());
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let s = spec(
            r#"
name: wrong url
steps:
  - step: Open
    steps:
      - action: navigate
        url: https://docs.example.com/
  - step: Check
    steps:
      - action: expect_url
        equals: https://intentionally-incorrect-url.com
  - step: Never reached
    steps:
      - action: log
        message: unreachable
"#,
        );
        let (record, _tmp) = run(&s, thread_random).await;
        assert_eq!(record.status, Status::Failed);
        assert_eq!(record.steps.len(), 2);
        assert_eq!(record.steps[1].status, Status::Failed);
    }

    #[tokio::test]
    async fn test_missing_element_click_is_broken() {
        let s = spec(
            r#"
name: nonexistent
steps:
  - action: navigate
    url: https://docs.example.com/
  - step: Click a link that does not exist
    steps:
      - action: click
        selector: text=Nonexistent
"#,
        );
        let (record, _tmp) = run(&s, thread_random).await;
        assert_eq!(record.status, Status::Broken);
        assert!(record.error.unwrap().message.contains("text=Nonexistent"));
    }

    #[tokio::test]
    async fn test_random_threshold_uses_source() {
        let s = spec(
            r#"
name: flaky
steps:
  - step: Roll
    steps:
      - action: expect_random_above
        threshold: 0.5
"#,
        );
        let (high, _a) = run(&s, || 0.9).await;
        assert_eq!(high.status, Status::Passed);
        let (low, _b) = run(&s, || 0.1).await;
        assert_eq!(low.status, Status::Failed);
    }

    #[tokio::test]
    async fn test_screenshot_is_attached_to_step() {
        let s = spec(
            r#"
name: shot
steps:
  - step: Capture
    steps:
      - action: navigate
        url: https://docs.example.com/
      - action: screenshot
        name: home page
"#,
        );
        let (record, _tmp) = run(&s, thread_random).await;
        let attachment = &record.steps[0].attachments[0];
        assert_eq!(attachment.name, "home page");
        assert!(attachment.source.ends_with("home_page.png"));
        assert!(attachment.source.exists());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a b/c"), "a_b_c");
        assert_eq!(sanitize("ok-name_1"), "ok-name_1");
    }
}
