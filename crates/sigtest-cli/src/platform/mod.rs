//! Output formats for generated test suites.
//!
//! Each platform turns labeled variants into the files its test harness
//! expects. Platforms are looked up by name with [`get_platform`].

mod elastic;
mod panther;
mod splunk;

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use sigtest_eval::{LogSource, Record, RuleDocument};

pub use elastic::ElasticPlatform;
pub use panther::PantherPlatform;
pub use splunk::SplunkPlatform;

use crate::error::{CliError, Result};

/// Name written into generated files.
pub const GENERATOR: &str = "sigtest";

const PLATFORMS: [&str; 3] = ["panther", "splunk", "elastic"];

/// A test-suite writer for one target platform.
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render one variant as a platform test case.
    fn format_test_case(
        &self,
        record: &Record,
        should_trigger: bool,
        index: usize,
        rule_id: &str,
    ) -> Value;

    /// Write all test cases under `dir` and return the main file written.
    fn write_test_suite(&self, cases: &[Value], dir: &Path, rule_id: &str) -> Result<PathBuf>;

    /// Whether the platform is known to ingest this log source.
    fn supports_logsource(&self, _logsource: &LogSource) -> bool {
        true
    }

    /// Notes about detection fields that may need a platform mapping.
    fn field_hints(&self, _fields: &[String]) -> Vec<String> {
        Vec::new()
    }

    /// Human-readable compatibility issues for a rule; empty when none.
    fn compatibility_warnings(&self, rule: &RuleDocument) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.supports_logsource(&rule.logsource) {
            warnings.push(format!(
                "Logsource {} may not be fully supported",
                logsource_label(&rule.logsource)
            ));
        }
        let hints = self.field_hints(&detection_fields(rule));
        if !hints.is_empty() {
            warnings.push(format!("Fields may need mapping: {}", hints.join(", ")));
        }
        warnings
    }
}

/// Look up a platform by name.
pub fn get_platform(name: &str) -> Result<Box<dyn Platform>> {
    match name {
        "panther" => Ok(Box::new(PantherPlatform)),
        "splunk" => Ok(Box::new(SplunkPlatform::default())),
        "elastic" => Ok(Box::new(ElasticPlatform)),
        _ => Err(CliError::UnknownPlatform {
            name: name.to_string(),
            available: PLATFORMS.join(", "),
        }),
    }
}

pub fn list_platforms() -> &'static [&'static str] {
    &PLATFORMS
}

/// `product/service`, with `unknown` for missing parts.
pub(crate) fn logsource_label(logsource: &LogSource) -> String {
    format!(
        "{}/{}",
        logsource.product.as_deref().unwrap_or("unknown"),
        logsource.service.as_deref().unwrap_or("unknown")
    )
}

/// Field names used by a rule's selections, without modifiers, in first-seen order.
pub(crate) fn detection_fields(rule: &RuleDocument) -> Vec<String> {
    fn walk(map: &Map<String, Value>, out: &mut Vec<String>) {
        for (key, value) in map {
            match value {
                Value::Array(items) if items.iter().all(Value::is_object) && !items.is_empty() => {
                    for item in items.iter().filter_map(Value::as_object) {
                        walk(item, out);
                    }
                }
                _ => {
                    let field = key.split('|').next().unwrap_or(key).to_string();
                    if !out.contains(&field) {
                        out.push(field);
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    for (name, selection) in &rule.detection {
        if matches!(name.as_str(), "condition" | "timeframe") {
            continue;
        }
        match selection {
            Value::Object(map) => walk(map, &mut out),
            Value::Array(items) => {
                for item in items.iter().filter_map(Value::as_object) {
                    walk(item, &mut out);
                }
            }
            _ => {}
        }
    }
    out
}

/// `(positive, negative)` counts of formatted test cases.
pub(crate) fn label_counts(cases: &[Value]) -> (usize, usize) {
    let positive = cases
        .iter()
        .filter(|c| c["should_trigger"].as_bool().unwrap_or(false))
        .count();
    (positive, cases.len() - positive)
}

pub(crate) fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}
