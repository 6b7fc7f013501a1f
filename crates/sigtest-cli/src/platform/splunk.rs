use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use sigtest_eval::{LogSource, Record};

use super::{Platform, label_counts, write_json};
use crate::error::Result;

const SUPPORTED_PRODUCTS: [&str; 9] = [
    "windows", "linux", "aws", "azure", "gcp", "network", "web", "database", "antivirus",
];

/// Sigma field names with a different CIM name in Splunk.
const CIM_FIELDS: [(&str, &str); 5] = [
    ("EventID", "EventCode"),
    ("CommandLine", "process"),
    ("Image", "process_name"),
    ("User", "user"),
    ("Computer", "host"),
];

/// An SPL search, an ingestible data file and a manifest per rule.
#[derive(Debug, Clone)]
pub struct SplunkPlatform {
    index: String,
}

impl Default for SplunkPlatform {
    fn default() -> Self {
        SplunkPlatform {
            index: "main".to_string(),
        }
    }
}

impl Platform for SplunkPlatform {
    fn name(&self) -> &'static str {
        "splunk"
    }

    fn format_test_case(
        &self,
        record: &Record,
        should_trigger: bool,
        index: usize,
        rule_id: &str,
    ) -> Value {
        let raw = Value::Object(record.clone()).to_string();
        json!({
            "index": index,
            "rule_id": rule_id,
            "log": record,
            "should_trigger": should_trigger,
            "splunk_index": self.index,
            "sourcetype": sourcetype(record, &raw),
            "source": format!("test_data_{rule_id}"),
            "timestamp": record.get("timestamp").cloned().unwrap_or_else(|| json!("now()")),
            "raw_log": raw,
        })
    }

    fn write_test_suite(&self, cases: &[Value], dir: &Path, rule_id: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let spl_name = format!("{rule_id}.spl");
        let data_name = format!("{rule_id}_data.json");
        let spl_path = dir.join(&spl_name);

        std::fs::write(&spl_path, spl_search(cases, rule_id))?;

        let data: Vec<Value> = cases
            .iter()
            .map(|c| {
                json!({
                    "index": c["splunk_index"],
                    "sourcetype": c["sourcetype"],
                    "source": c["source"],
                    "_time": c["timestamp"],
                    "_raw": c["raw_log"],
                    "should_trigger": c["should_trigger"],
                })
            })
            .collect();
        write_json(&dir.join(&data_name), &data)?;

        let (positive, negative) = label_counts(cases);
        write_json(
            &dir.join("test_manifest.json"),
            &json!({
                "rule_id": rule_id,
                "platform": self.name(),
                "test_count": cases.len(),
                "positive_tests": positive,
                "negative_tests": negative,
                "files": {
                    "spl_search": spl_name,
                    "test_data": data_name,
                    "manifest": "test_manifest.json",
                },
                "usage": {
                    "description": "Import test_data into Splunk and run the SPL search",
                    "search_file": spl_name,
                },
            }),
        )?;
        Ok(spl_path)
    }

    fn supports_logsource(&self, logsource: &LogSource) -> bool {
        let product = logsource.product.as_deref().unwrap_or_default().to_lowercase();
        product.is_empty() || SUPPORTED_PRODUCTS.contains(&product.as_str())
    }

    fn field_hints(&self, fields: &[String]) -> Vec<String> {
        fields
            .iter()
            .filter_map(|f| {
                CIM_FIELDS
                    .iter()
                    .find(|(sigma, _)| *sigma == f.as_str())
                    .map(|(_, cim)| format!("{f} (consider mapping to {cim})"))
            })
            .collect()
    }
}

/// Guess a sourcetype from the record's keys and content.
fn sourcetype(record: &Record, raw: &str) -> &'static str {
    let raw = raw.to_lowercase();
    if record.contains_key("EventLog") || record.contains_key("EventID") {
        "WinEventLog"
    } else if raw.contains("aws") {
        "aws:cloudtrail"
    } else if raw.contains("syslog") {
        "syslog"
    } else if raw.contains("access_log") || record.contains_key("method") {
        "access_combined"
    } else {
        "json"
    }
}

/// A `makeresults` search that tabulates the expected outcome of every case.
fn spl_search(cases: &[Value], rule_id: &str) -> String {
    let ids: Vec<String> = (0..cases.len()).map(|i| i.to_string()).collect();
    let conditions: Vec<String> = cases
        .iter()
        .enumerate()
        .map(|(i, c)| format!("test_case=={i}, {}", c["should_trigger"].as_bool().unwrap_or(false)))
        .collect();

    let mut spl = String::new();
    let _ = writeln!(spl, "| makeresults count={}", cases.len());
    let _ = writeln!(spl, "| eval test_case=mvindex(split(\"{}\", \"|\"), 0)", ids.join("|"));
    let _ = writeln!(spl, "| eval should_trigger=case(\n{}\n)", conditions.join(",\n"));
    let _ = writeln!(spl, "| eval rule_id=\"{rule_id}\"");
    let _ = writeln!(spl, "| eval platform=\"splunk\"");
    let _ = writeln!(spl, "| eval test_description=\"Automated test case for {rule_id}\"");
    let _ = writeln!(spl, "| table test_case, should_trigger, rule_id, platform, test_description");
    let _ = writeln!(spl);
    let _ = writeln!(spl, "| comment \"");
    let _ = writeln!(spl, "Usage:");
    let _ = writeln!(spl, "1. Import test data from {rule_id}_data.json");
    let _ = writeln!(spl, "2. Run this search to validate rule behavior");
    let _ = writeln!(spl, "3. Compare should_trigger with actual rule results");
    let _ = writeln!(spl, "\"");
    spl
}
