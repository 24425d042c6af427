//! Allure results writer
//!
//! Writes one `<uuid>-result.json` per report record in the Allure 2 results
//! format, copies attachments next to it as `<uuid>-attachment.<ext>`, and
//! records run environment in `environment.properties`.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::report::{ReportRecord, StepRecord};
use crate::sink::ReportSink;
use crate::types::{Attachment, ErrorDetail, Status};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllureResult {
    uuid: String,
    history_id: String,
    test_case_id: String,
    name: String,
    full_name: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_details: Option<StatusDetails>,
    stage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    steps: Vec<AllureStep>,
    attachments: Vec<AllureAttachment>,
    parameters: Vec<NameValue>,
    labels: Vec<NameValue>,
    links: Vec<NameValue>,
    start: i64,
    stop: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllureStep {
    name: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_details: Option<StatusDetails>,
    stage: &'static str,
    steps: Vec<AllureStep>,
    attachments: Vec<AllureAttachment>,
    parameters: Vec<NameValue>,
    start: i64,
    stop: i64,
}

#[derive(Debug, Serialize)]
struct StatusDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
    flaky: bool,
    known: bool,
    muted: bool,
}

#[derive(Debug, Serialize)]
struct AllureAttachment {
    name: String,
    source: String,
    #[serde(rename = "type")]
    content_type: String,
}

#[derive(Debug, Serialize)]
struct NameValue {
    name: String,
    value: String,
}

impl NameValue {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

fn allure_status(status: Status) -> &'static str {
    match status {
        Status::Passed => "passed",
        Status::Failed => "failed",
        Status::Broken => "broken",
        Status::Skipped => "skipped",
        // Never terminal; Allure has no equivalent.
        Status::Pending | Status::Running => "unknown",
    }
}

fn status_details(error: Option<&ErrorDetail>, flaky: bool) -> Option<StatusDetails> {
    if error.is_none() && !flaky {
        return None;
    }
    Some(StatusDetails {
        message: error.map(|e| e.message.clone()),
        trace: error.and_then(|e| match (&e.expected, &e.actual) {
            (Some(expected), Some(actual)) => {
                Some(format!("Expected: {}\nReceived: {}", expected, actual))
            }
            _ => None,
        }),
        flaky,
        known: false,
        muted: false,
    })
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Writes Allure result files into a results directory
pub struct AllureSink {
    results_dir: PathBuf,
    detail: bool,
    environment: BTreeMap<String, String>,
}

impl AllureSink {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            detail: true,
            environment: BTreeMap::new(),
        }
    }

    /// When false, step trees are left out of the results
    pub fn with_detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Create the results directory, optionally wiping previous results, and
    /// write `environment.properties`
    pub fn init(&self, clean: bool) -> std::io::Result<()> {
        if clean && self.results_dir.exists() {
            std::fs::remove_dir_all(&self.results_dir)?;
        }
        std::fs::create_dir_all(&self.results_dir)?;

        if !self.environment.is_empty() {
            let body: String = self
                .environment
                .iter()
                .map(|(k, v)| format!("{}={}\n", k, v.replace('\n', " ")))
                .collect();
            std::fs::write(self.results_dir.join("environment.properties"), body)?;
        }
        Ok(())
    }

    /// Write one record; returns the result file path
    pub fn write(&self, record: &ReportRecord) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.results_dir)?;

        let identity = match &record.project {
            Some(project) => format!("{}#{}", record.full_name, project),
            None => record.full_name.clone(),
        };

        let mut labels: Vec<NameValue> = record
            .labels
            .iter()
            .map(|(kind, value)| NameValue::new(kind.as_str(), value))
            .collect();
        labels.extend(record.tags.iter().map(|t| NameValue::new("tag", t.clone())));
        if let Some(project) = &record.project {
            labels.push(NameValue::new("parentSuite", project.clone()));
        }
        if let Some((suite, _)) = record.full_name.split_once("::") {
            labels.push(NameValue::new("suite", suite));
        }
        labels.push(NameValue::new("framework", "docsuite"));
        labels.push(NameValue::new("language", "rust"));

        let parameters = record
            .project
            .iter()
            .map(|p| NameValue::new("Project", p.clone()))
            .collect();

        let result = AllureResult {
            uuid: record.uuid.to_string(),
            history_id: sha256_hex(&identity),
            test_case_id: sha256_hex(&record.full_name),
            name: record.name.clone(),
            full_name: record.full_name.clone(),
            status: allure_status(record.status),
            status_details: status_details(record.error.as_ref(), record.flaky),
            stage: "finished",
            description: record.description.clone(),
            steps: if self.detail {
                record.steps.iter().map(|s| self.step(s)).collect()
            } else {
                Vec::new()
            },
            attachments: self.attachments(&record.attachments),
            parameters,
            labels,
            links: Vec::new(),
            start: record.start.timestamp_millis(),
            stop: record.stop.timestamp_millis(),
        };

        let path = self.results_dir.join(format!("{}-result.json", record.uuid));
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(&path, json)?;
        debug!("Allure result written to {}", path.display());
        Ok(path)
    }

    fn step(&self, step: &StepRecord) -> AllureStep {
        AllureStep {
            name: step.name.clone(),
            status: allure_status(step.status),
            status_details: status_details(step.error.as_ref(), false),
            stage: "finished",
            steps: step.steps.iter().map(|s| self.step(s)).collect(),
            attachments: self.attachments(&step.attachments),
            parameters: Vec::new(),
            start: step.start.timestamp_millis(),
            stop: step.stop.timestamp_millis(),
        }
    }

    /// Copy attachment files into the results directory. Missing sources
    /// are logged and dropped.
    fn attachments(&self, attachments: &[Attachment]) -> Vec<AllureAttachment> {
        attachments
            .iter()
            .filter_map(|a| {
                let ext = a
                    .source
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_else(|| "bin".to_string());
                let file_name = format!("{}-attachment.{}", Uuid::new_v4(), ext);
                match std::fs::copy(&a.source, self.results_dir.join(&file_name)) {
                    Ok(_) => Some(AllureAttachment {
                        name: a.name.clone(),
                        source: file_name,
                        content_type: a.content_type.clone(),
                    }),
                    Err(e) => {
                        warn!("Skipping attachment {}: {}", a.source.display(), e);
                        None
                    }
                }
            })
            .collect()
    }
}

impl ReportSink for AllureSink {
    fn emit(&self, record: &ReportRecord) {
        if let Err(e) = self.write(record) {
            warn!("Failed to write Allure result for '{}': {}", record.name, e);
        }
    }
}
