//! Seed fixtures: hand-written records with their intended label.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sigtest_eval::Record;

use crate::error::Result;

/// A seed record and the label it is expected to produce.
#[derive(Debug, Clone, Copy)]
pub struct Seed<'a> {
    pub record: &'a Record,
    pub should_trigger: bool,
}

/// Positive and negative seeds for one rule.
///
/// Stored on disk as `{"positive": [...], "negative": [...]}`; either list
/// may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedSet {
    #[serde(default)]
    pub positive: Vec<Record>,
    #[serde(default)]
    pub negative: Vec<Record>,
}

impl SeedSet {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Keep at most `per_label` seeds of each label.
    pub fn truncate(&mut self, per_label: usize) {
        self.positive.truncate(per_label);
        self.negative.truncate(per_label);
    }

    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

/// Pair each record with the same label.
pub(crate) fn labelled(
    records: &[Record],
    should_trigger: bool,
) -> impl Iterator<Item = Seed<'_>> {
    records.iter().map(move |record| Seed {
        record,
        should_trigger,
    })
}
