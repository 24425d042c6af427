//! Descriptive metadata attached to a test

use serde::{Deserialize, Serialize};

use crate::report::Labels;
use crate::types::LabelKind;

/// Description, classification labels and tags of one test.
///
/// Description and labels are last-write-wins. Tags are append-only and keep
/// duplicates in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub description: Option<String>,
    pub labels: Labels,
    pub tags: Vec<String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_description(&mut self, text: impl Into<String>) {
        self.description = Some(text.into());
    }

    pub fn set_label(&mut self, kind: LabelKind, value: impl Into<String>) {
        self.labels.set(kind, value.into());
    }

    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
    }

    /// Number of times a tag was added
    pub fn tag_count(&self, tag: &str) -> usize {
        self.tags.iter().filter(|t| *t == tag).count()
    }
}
