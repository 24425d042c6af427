//! Step recorder
//!
//! Records the tree of named steps executed by a single test. Open steps are
//! tracked on an explicit stack; finished nodes live in an arena and are
//! linked by index. Steps must close in strict LIFO order.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{CoreError, TestError};
use crate::report::{duration_ms, StepRecord};
use crate::types::{Attachment, ErrorDetail, Outcome, Status};

/// Opaque reference to a step returned by [`StepRecorder::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepHandle {
    index: usize,
}

#[derive(Debug)]
struct StepNode {
    name: String,
    parent: Option<usize>,
    children: Vec<usize>,
    start: DateTime<Utc>,
    stop: Option<DateTime<Utc>>,
    /// `Running` until closed
    status: Status,
    /// Worst outcome propagated up from descendants and implicit actions
    inherited: Status,
    inherited_error: Option<ErrorDetail>,
    error: Option<ErrorDetail>,
    attachments: Vec<Attachment>,
}

/// Per-test step tree with an explicit stack of open steps
#[derive(Debug)]
pub struct StepRecorder {
    nodes: Vec<StepNode>,
    roots: Vec<usize>,
    stack: Vec<usize>,
    root_status: Status,
    root_error: Option<ErrorDetail>,
    root_attachments: Vec<Attachment>,
}

impl Default for StepRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StepRecorder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            stack: Vec::new(),
            root_status: Status::Passed,
            root_error: None,
            root_attachments: Vec::new(),
        }
    }

    /// Open a step as a child of the innermost open step (or the test root)
    pub fn begin(&mut self, name: impl Into<String>) -> StepHandle {
        let name = name.into();
        let parent = self.stack.last().copied();
        let index = self.nodes.len();

        // Never start before the parent or before the previous sibling ended.
        let mut start = Utc::now();
        if let Some(p) = parent {
            start = start.max(self.nodes[p].start);
        }
        if let Some(prev) = self.siblings(parent).last() {
            if let Some(stop) = self.nodes[*prev].stop {
                start = start.max(stop);
            }
        }

        debug!(step = %name, depth = self.stack.len(), "step started");

        self.nodes.push(StepNode {
            name,
            parent,
            children: Vec::new(),
            start,
            stop: None,
            status: Status::Running,
            inherited: Status::Passed,
            inherited_error: None,
            error: None,
            attachments: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p].children.push(index),
            None => self.roots.push(index),
        }
        self.stack.push(index);

        StepHandle { index }
    }

    /// Close the innermost open step with the given outcome.
    ///
    /// Returns the step's final status, which is the worst of its own outcome
    /// and everything propagated from below.
    pub fn end(&mut self, handle: StepHandle, outcome: &Outcome) -> Result<Status, CoreError> {
        let top = match self.stack.last() {
            Some(top) => *top,
            None => {
                return Err(CoreError::StepOrdering {
                    expected: "<no open step>".to_string(),
                    actual: self.name_of(handle),
                })
            }
        };
        if top != handle.index {
            return Err(CoreError::StepOrdering {
                expected: self.nodes[top].name.clone(),
                actual: self.name_of(handle),
            });
        }
        self.stack.pop();

        let mut stop = Utc::now().max(self.nodes[top].start);
        if let Some(last) = self.nodes[top].children.last() {
            if let Some(child_stop) = self.nodes[*last].stop {
                stop = stop.max(child_stop);
            }
        }

        let node = &mut self.nodes[top];
        let status = outcome.status().worst(node.inherited);
        node.stop = Some(stop);
        node.status = status;
        if !status.is_ok() {
            node.error = outcome
                .error()
                .map(ErrorDetail::from)
                .or_else(|| node.inherited_error.clone());
        }
        let error = node.error.clone();
        let parent = node.parent;

        debug!(step = %node.name, %status, "step finished");

        if !status.is_ok() {
            self.propagate(parent, status, error);
        }

        Ok(status)
    }

    /// Record the outcome of an action performed outside any named step of
    /// its own. It counts toward the innermost open step, or the test root.
    pub fn record_action(&mut self, outcome: &Outcome) {
        let status = outcome.status();
        if status.is_ok() {
            return;
        }
        let error = outcome.error().map(ErrorDetail::from);
        self.propagate(self.stack.last().copied(), status, error);
    }

    /// Attach an artifact to the innermost open step, or the test root
    pub fn attach(&mut self, attachment: Attachment) {
        match self.stack.last() {
            Some(top) => self.nodes[*top].attachments.push(attachment),
            None => self.root_attachments.push(attachment),
        }
    }

    /// Attach to the test itself regardless of open steps
    pub fn attach_root(&mut self, attachment: Attachment) {
        self.root_attachments.push(attachment);
    }

    /// Close every open step, innermost first, with the given error
    pub fn abort_open(&mut self, err: &TestError) {
        let outcome = Outcome::Error(err.clone());
        while let Some(top) = self.stack.last().copied() {
            // Always the top of the stack, so ordering cannot fail.
            let _ = self.end(StepHandle { index: top }, &outcome);
        }
    }

    /// Number of currently open steps
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Name of the innermost open step
    pub fn current(&self) -> Option<&str> {
        self.stack.last().map(|i| self.nodes[*i].name.as_str())
    }

    /// Worst outcome seen at the test root so far
    pub fn status(&self) -> Status {
        self.root_status
    }

    /// First error that reached the test root
    pub fn error(&self) -> Option<&ErrorDetail> {
        self.root_error.as_ref()
    }

    pub fn root_attachments(&self) -> &[Attachment] {
        &self.root_attachments
    }

    /// Snapshot the step tree
    pub fn records(&self) -> Vec<StepRecord> {
        self.roots.iter().map(|i| self.record(*i)).collect()
    }

    fn record(&self, index: usize) -> StepRecord {
        let node = &self.nodes[index];
        let stop = node.stop.unwrap_or(node.start);
        StepRecord {
            name: node.name.clone(),
            status: node.status,
            start: node.start,
            stop,
            duration_ms: duration_ms(node.start, stop),
            error: node.error.clone(),
            attachments: node.attachments.clone(),
            steps: node.children.iter().map(|c| self.record(*c)).collect(),
        }
    }

    fn propagate(&mut self, mut cursor: Option<usize>, status: Status, error: Option<ErrorDetail>) {
        while let Some(i) = cursor {
            let node = &mut self.nodes[i];
            node.inherited = node.inherited.worst(status);
            if node.inherited_error.is_none() {
                node.inherited_error = error.clone();
            }
            cursor = node.parent;
        }
        self.root_status = self.root_status.worst(status);
        if self.root_error.is_none() {
            self.root_error = error;
        }
    }

    fn siblings(&self, parent: Option<usize>) -> &[usize] {
        match parent {
            Some(p) => &self.nodes[p].children,
            None => &self.roots,
        }
    }

    fn name_of(&self, handle: StepHandle) -> String {
        self.nodes
            .get(handle.index)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| "<unknown step>".to_string())
    }
}
