//! Summarize a generated Panther suite: count the `test_*.json` cases by
//! label and collect the files that fail to parse.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::Result;

const CASE_PATTERN: &str = "test_*.json";
const MANIFEST: &str = "test_manifest.json";

#[derive(Debug, Default)]
pub struct ReviewSummary {
    pub trigger: Vec<(PathBuf, Value)>,
    pub non_trigger: Vec<(PathBuf, Value)>,
    pub errors: Vec<(PathBuf, String)>,
}

impl ReviewSummary {
    pub fn total(&self) -> usize {
        self.trigger.len() + self.non_trigger.len() + self.errors.len()
    }
}

/// Test case files directly under `dir`, sorted by name.
pub fn find_case_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name != MANIFEST && glob_match::glob_match(CASE_PATTERN, name) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load and classify every case file. A case without a truthy
/// `should_trigger` counts as non-triggering.
pub fn review_files(files: &[PathBuf]) -> ReviewSummary {
    let mut summary = ReviewSummary::default();
    for path in files {
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(case) if case["should_trigger"].as_bool() == Some(true) => {
                summary.trigger.push((path.clone(), case));
            }
            Ok(case) => summary.non_trigger.push((path.clone(), case)),
            Err(e) => {
                log::debug!("{}: {e}", path.display());
                summary.errors.push((path.clone(), e));
            }
        }
    }
    summary
}
