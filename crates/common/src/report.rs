//! Immutable report records handed to reporting sinks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Attachment, ErrorDetail, LabelKind, Status};

/// One finalized node of the step tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: Status,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl StepRecord {
    /// Depth-first walk over this step and its descendants
    pub fn walk(&self) -> Vec<&StepRecord> {
        let mut out = vec![self];
        for child in &self.steps {
            out.extend(child.walk());
        }
        out
    }
}

/// Classification labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
}

impl Labels {
    pub fn get(&self, kind: LabelKind) -> Option<&str> {
        match kind {
            LabelKind::Epic => self.epic.as_deref(),
            LabelKind::Feature => self.feature.as_deref(),
            LabelKind::Story => self.story.as_deref(),
        }
    }

    pub(crate) fn set(&mut self, kind: LabelKind, value: String) {
        let slot = match kind {
            LabelKind::Epic => &mut self.epic,
            LabelKind::Feature => &mut self.feature,
            LabelKind::Story => &mut self.story,
        };
        *slot = Some(value);
    }

    /// Present labels in epic, feature, story order
    pub fn iter(&self) -> impl Iterator<Item = (LabelKind, &str)> {
        [LabelKind::Epic, LabelKind::Feature, LabelKind::Story]
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|v| (kind, v)))
    }
}

/// Finalized summary of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub uuid: Uuid,
    pub name: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub labels: Labels,
    pub tags: Vec<String>,
    pub steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub flaky: bool,
}

impl ReportRecord {
    /// Every step in the tree, depth-first
    pub fn all_steps(&self) -> Vec<&StepRecord> {
        self.steps.iter().flat_map(|s| s.walk()).collect()
    }

    /// Find the first step with the given name anywhere in the tree
    pub fn find_step(&self, name: &str) -> Option<&StepRecord> {
        self.all_steps().into_iter().find(|s| s.name == name)
    }
}

pub(crate) fn duration_ms(start: DateTime<Utc>, stop: DateTime<Utc>) -> u64 {
    (stop - start).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, status: Status, steps: Vec<StepRecord>) -> StepRecord {
        let now = Utc::now();
        StepRecord {
            name: name.to_string(),
            status,
            start: now,
            stop: now,
            duration_ms: 0,
            error: None,
            attachments: Vec::new(),
            steps,
        }
    }

    #[test]
    fn test_find_step_searches_depth_first() {
        let now = Utc::now();
        let record = ReportRecord {
            uuid: Uuid::new_v4(),
            name: "tree".into(),
            full_name: "tree".into(),
            project: None,
            status: Status::Failed,
            description: None,
            labels: Labels::default(),
            tags: Vec::new(),
            steps: vec![
                step(
                    "open",
                    Status::Passed,
                    vec![step("load", Status::Passed, vec![])],
                ),
                step(
                    "check",
                    Status::Failed,
                    vec![step("load", Status::Failed, vec![])],
                ),
            ],
            attachments: Vec::new(),
            start: now,
            stop: now,
            duration_ms: 0,
            error: None,
            flaky: false,
        };

        let names: Vec<&str> = record.all_steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["open", "load", "check", "load"]);
        assert_eq!(record.find_step("load").unwrap().status, Status::Passed);
        assert!(record.find_step("missing").is_none());
    }
}
