//! Assertions against the browser
//!
//! Conditions are re-checked until they hold or the expect timeout runs
//! out, then reported as an assertion mismatch with what was last observed.

use docsuite_common::TestError;
use regex::Regex;
use std::time::{Duration, Instant};

use crate::driver::BrowserDriver;
use crate::error::DriverError;

/// How an observed string is compared
#[derive(Debug, Clone)]
pub enum Matcher {
    Equals(String),
    Contains(String),
    Regex(Regex),
}

impl Matcher {
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Regex(Regex::new(pattern)?))
    }

    pub fn is_match(&self, actual: &str) -> bool {
        match self {
            Matcher::Equals(s) => actual == s,
            Matcher::Contains(s) => actual.contains(s.as_str()),
            Matcher::Regex(re) => re.is_match(actual),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Matcher::Equals(s) => format!("\"{}\"", s),
            Matcher::Contains(s) => format!("containing \"{}\"", s),
            Matcher::Regex(re) => format!("/{}/", re.as_str()),
        }
    }
}

/// Something to assert about the current page
#[derive(Debug, Clone)]
pub enum Condition {
    Title(Matcher),
    Url(Matcher),
    Visible { selector: String },
    Text { selector: String, matcher: Matcher },
}

impl Condition {
    fn subject(&self) -> String {
        match self {
            Condition::Title(_) => "page title".to_string(),
            Condition::Url(_) => "page URL".to_string(),
            Condition::Visible { selector } => format!("visibility of {}", selector),
            Condition::Text { selector, .. } => format!("text of {}", selector),
        }
    }

    fn expected(&self) -> String {
        match self {
            Condition::Title(m) | Condition::Url(m) | Condition::Text { matcher: m, .. } => {
                m.describe()
            }
            Condition::Visible { .. } => "visible".to_string(),
        }
    }

    /// Observe once. A missing element is an observation, not a driver
    /// failure: the element may still appear.
    async fn observe(&self, driver: &mut dyn BrowserDriver) -> Result<(bool, String), DriverError> {
        match self {
            Condition::Title(m) => {
                let title = driver.title().await?;
                Ok((m.is_match(&title), title))
            }
            Condition::Url(m) => {
                let url = driver.url().await?;
                Ok((m.is_match(&url), url))
            }
            Condition::Visible { selector } => match driver.locate(selector).await {
                Ok(el) => {
                    let visible = driver.is_visible(&el).await?;
                    let actual = if visible { "visible" } else { "hidden" };
                    Ok((visible, actual.to_string()))
                }
                Err(DriverError::NotFound { .. }) => Ok((false, "<not found>".to_string())),
                Err(e) => Err(e),
            },
            Condition::Text { selector, matcher } => match driver.locate(selector).await {
                Ok(el) => {
                    let text = driver.text(&el).await?;
                    Ok((matcher.is_match(&text), text))
                }
                Err(DriverError::NotFound { .. }) => Ok((false, "<not found>".to_string())),
                Err(e) => Err(e),
            },
        }
    }
}

/// Polling assertion runner
#[derive(Debug, Clone, Copy)]
pub struct Expect {
    timeout: Duration,
    interval: Duration,
}

impl Default for Expect {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Expect {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Duration::from_millis(100),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Check `condition` until it holds or the timeout elapses
    pub async fn check(
        &self,
        driver: &mut dyn BrowserDriver,
        condition: &Condition,
    ) -> Result<(), TestError> {
        let start = Instant::now();
        loop {
            let (ok, actual) = condition.observe(driver).await?;
            if ok {
                return Ok(());
            }
            if start.elapsed() >= self.timeout {
                return Err(TestError::mismatch(
                    condition.subject(),
                    condition.expected(),
                    actual,
                ));
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn title(&self, driver: &mut dyn BrowserDriver, m: Matcher) -> Result<(), TestError> {
        self.check(driver, &Condition::Title(m)).await
    }

    pub async fn url(&self, driver: &mut dyn BrowserDriver, m: Matcher) -> Result<(), TestError> {
        self.check(driver, &Condition::Url(m)).await
    }

    pub async fn visible(&self, driver: &mut dyn BrowserDriver, selector: &str) -> Result<(), TestError> {
        let condition = Condition::Visible {
            selector: selector.to_string(),
        };
        self.check(driver, &condition).await
    }

    pub async fn text(
        &self,
        driver: &mut dyn BrowserDriver,
        selector: &str,
        m: Matcher,
    ) -> Result<(), TestError> {
        let condition = Condition::Text {
            selector: selector.to_string(),
            matcher: m,
        };
        self.check(driver, &condition).await
    }
}

/// `actual > threshold`
pub fn greater_than(subject: &str, actual: f64, threshold: f64) -> Result<(), TestError> {
    if actual > threshold {
        Ok(())
    } else {
        Err(TestError::mismatch(subject, format!("> {}", threshold), actual))
    }
}
