//! Declarative YAML test specification

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{E2eError, E2eResult};
use crate::expect::Matcher;

/// A complete test specification parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub epic: Option<String>,

    #[serde(default)]
    pub feature: Option<String>,

    #[serde(default)]
    pub story: Option<String>,

    /// Tags for filtering and reporting; duplicates are kept
    #[serde(default)]
    pub tags: Vec<String>,

    /// Skip before execution: `true` or a reason
    #[serde(default)]
    pub skip: Skip,

    /// Known to be non-deterministic; reporting hint only
    #[serde(default)]
    pub flaky: bool,

    /// Overrides the suite timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Steps to execute in order
    #[serde(default)]
    pub steps: Vec<SpecStep>,

    /// File the spec was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Skip {
    Flag(bool),
    Reason(String),
}

impl Default for Skip {
    fn default() -> Self {
        Skip::Flag(false)
    }
}

impl Skip {
    /// `None` when the test should run
    pub fn reason(&self) -> Option<String> {
        match self {
            Skip::Flag(false) => None,
            Skip::Flag(true) => Some(String::new()),
            Skip::Reason(r) => Some(r.clone()),
        }
    }
}

/// Either a named (possibly nested) step or a bare action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecStep {
    Group(StepGroup),
    Action(Action),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepGroup {
    /// Step name shown in reports
    pub step: String,
    #[serde(default)]
    pub steps: Vec<SpecStep>,
}

/// String expectation: exactly one of the fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(default)]
    pub equals: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub matches: Option<String>,
}

impl Pattern {
    pub fn matcher(&self) -> E2eResult<Matcher> {
        match (&self.equals, &self.contains, &self.matches) {
            (Some(s), None, None) => Ok(Matcher::Equals(s.clone())),
            (None, Some(s), None) => Ok(Matcher::Contains(s.clone())),
            (None, None, Some(re)) => Matcher::regex(re)
                .map_err(|e| E2eError::SpecParse(format!("invalid pattern /{}/: {}", re, e))),
            _ => Err(E2eError::SpecParse(
                "expected exactly one of equals, contains, matches".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextAssertion {
    pub selector: String,
    #[serde(flatten)]
    pub pattern: Pattern,
}

/// A single browser action or assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Navigate to an absolute URL
    Navigate { url: String },

    /// Click an element
    Click { selector: String },

    /// Fill an input field
    Fill { selector: String, value: String },

    /// Press a key or chord on the page
    Press { key: String },

    ExpectTitle(Pattern),

    ExpectUrl(Pattern),

    ExpectText(TextAssertion),

    ExpectVisible { selector: String },

    /// Draw a random number in [0, 1) and assert it exceeds the threshold
    ExpectRandomAbove { threshold: f64 },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Take a screenshot and attach it
    Screenshot { name: String },

    /// Log a message (for debugging)
    Log { message: String },
}

impl Action {
    /// Short label used in logs
    pub fn label(&self) -> String {
        match self {
            Action::Navigate { url } => format!("navigate:{}", url),
            Action::Click { selector } => format!("click:{}", selector),
            Action::Fill { selector, .. } => format!("fill:{}", selector),
            Action::Press { key } => format!("press:{}", key),
            Action::ExpectTitle(_) => "expect_title".to_string(),
            Action::ExpectUrl(_) => "expect_url".to_string(),
            Action::ExpectText(t) => format!("expect_text:{}", t.selector),
            Action::ExpectVisible { selector } => format!("expect_visible:{}", selector),
            Action::ExpectRandomAbove { threshold } => format!("expect_random_above:{}", threshold),
            Action::Sleep { ms } => format!("sleep:{}ms", ms),
            Action::Screenshot { name } => format!("screenshot:{}", name),
            Action::Log { message } => {
                let cut = message
                    .char_indices()
                    .nth(30)
                    .map(|(i, _)| i)
                    .unwrap_or(message.len());
                format!("log:{}", &message[..cut])
            }
        }
    }

    fn validate(&self) -> E2eResult<()> {
        match self {
            Action::ExpectTitle(p) | Action::ExpectUrl(p) => p.matcher().map(|_| ()),
            Action::ExpectText(t) => t.pattern.matcher().map(|_| ()),
            _ => Ok(()),
        }
    }
}

/// A YAML file holds either one test or a `tests:` list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecFile {
    Suite { tests: Vec<TestSpec> },
    Single(TestSpec),
}

impl TestSpec {
    /// Parse test specs from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Vec<Self>> {
        let file: SpecFile = serde_yaml::from_str(yaml)?;
        let specs = match file {
            SpecFile::Suite { tests } => tests,
            SpecFile::Single(spec) => vec![spec],
        };
        for spec in &specs {
            spec.validate()?;
        }
        Ok(specs)
    }

    /// Parse test specs from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        let mut specs = Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))?;
        for spec in &mut specs {
            spec.source = Some(path.to_path_buf());
        }
        Ok(specs)
    }

    /// Load all test specs from a directory, in path order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(E2eError::SpecParse(format!(
                "test directory not found: {}",
                dir.display()
            )));
        }

        let mut specs = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            specs.extend(Self::from_file(entry.path())?);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// `<file>::<name>`, or the bare name for inline specs
    pub fn full_name(&self) -> String {
        match self.source.as_ref().and_then(|p| p.file_name()) {
            Some(file) => format!("{}::{}", file.to_string_lossy(), self.name),
            None => self.name.clone(),
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("test name must not be empty".into()));
        }
        fn walk(steps: &[SpecStep]) -> E2eResult<()> {
            for step in steps {
                match step {
                    SpecStep::Group(g) => walk(&g.steps)?,
                    SpecStep::Action(a) => a.validate()?,
                }
            }
            Ok(())
        }
        walk(&self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_spec() {
        let yaml = r#"
name: title-check
description: Check the title
tags: [Homepage, UI]
steps:
  - action: navigate
    url: https://example.com/
  - action: expect_title
    contains: Example
"#;
        let specs = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "title-check");
        assert_eq!(specs[0].steps.len(), 2);
        assert!(matches!(
            specs[0].steps[0],
            SpecStep::Action(Action::Navigate { .. })
        ));
        assert_eq!(specs[0].skip.reason(), None);
    }

    #[test]
    fn test_parse_suite_with_nested_steps() {
        let yaml = r#"
tests:
  - name: Should navigate to the FAQ page
    epic: Docs
    feature: Navigation
    story: Sections
    tags: [Section, Navigation, UI]
    steps:
      - step: Navigate to the homepage
        steps:
          - action: navigate
            url: https://docs.example.com/
      - step: Check the FAQ page
        steps:
          - step: Click FAQ
            steps:
              - action: click
                selector: text=FAQ
          - action: expect_url
            matches: .*faq
          - action: expect_text
            selector: h1
            contains: Frequently Asked Questions
  - name: Skipped
    skip: Features section is under development
  - name: Flaky
    flaky: true
    skip: true
"#;
        let specs = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(specs.len(), 3);

        let faq = &specs[0];
        assert_eq!(faq.epic.as_deref(), Some("Docs"));
        match &faq.steps[1] {
            SpecStep::Group(g) => {
                assert_eq!(g.step, "Check the FAQ page");
                assert_eq!(g.steps.len(), 3);
                assert!(matches!(g.steps[0], SpecStep::Group(_)));
                match &g.steps[2] {
                    SpecStep::Action(Action::ExpectText(t)) => {
                        assert_eq!(t.selector, "h1");
                        assert!(matches!(t.pattern.matcher().unwrap(), Matcher::Contains(_)));
                    }
                    other => panic!("unexpected step: {:?}", other),
                }
            }
            other => panic!("unexpected step: {:?}", other),
        }

        assert_eq!(
            specs[1].skip.reason().as_deref(),
            Some("Features section is under development")
        );
        assert!(specs[2].flaky);
        assert_eq!(specs[2].skip.reason().as_deref(), Some(""));
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let yaml = r#"
name: bad
steps:
  - action: expect_title
    matches: "("
"#;
        assert!(matches!(TestSpec::from_yaml(yaml), Err(E2eError::SpecParse(_))));

        let yaml = r#"
name: ambiguous
steps:
  - action: expect_url
    contains: a
    equals: b
"#;
        assert!(TestSpec::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_all_sets_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("b.yaml"), "name: second\n").unwrap();
        std::fs::write(tmp.path().join("a.yml"), "name: first\n").unwrap();
        std::fs::write(tmp.path().join("nested").join("c.yaml"), "tests:\n  - name: third\n").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let specs = TestSpec::load_all(tmp.path()).unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(specs[0].full_name(), "a.yml::first");
    }

    #[test]
    fn test_filter_by_tag() {
        let specs = TestSpec::from_yaml(
            "tests:\n  - name: a\n    tags: [UI]\n  - name: b\n    tags: [Flaky]\n",
        )
        .unwrap();
        let ui = TestSpec::filter_by_tag(&specs, "UI");
        assert_eq!(ui.len(), 1);
        assert_eq!(ui[0].name, "a");
    }

    #[test]
    fn test_action_label_truncates_log() {
        let action = Action::Log {
            message: "x".repeat(50),
        };
        assert_eq!(action.label(), format!("log:{}", "x".repeat(30)));
    }
}
