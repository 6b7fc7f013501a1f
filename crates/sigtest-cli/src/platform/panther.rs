use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use sigtest_eval::{LogSource, Record, RuleDocument};

use super::{GENERATOR, Platform, detection_fields, label_counts, logsource_label, write_json};
use crate::error::Result;

/// Fields Panther's managed schemas expose under the same name.
const KNOWN_FIELDS: [&str; 12] = [
    "eventName",
    "sourceIPAddress",
    "userIdentity.type",
    "awsRegion",
    "timestamp",
    "source_ip",
    "dest_ip",
    "user",
    "process",
    "user.name",
    "process.name",
    "network.protocol",
];

/// Log sources with a managed Panther schema; an empty service list accepts any service.
const SUPPORTED_SOURCES: [(&str, &[&str]); 10] = [
    ("aws", &["cloudtrail", "vpcflow", "s3", "cloudwatch"]),
    ("gcp", &["audit", "vpc"]),
    ("azure", &["audit", "activitylog"]),
    ("okta", &["system"]),
    ("onelogin", &["events"]),
    ("github", &["audit"]),
    ("gsuite", &["admin", "drive", "login"]),
    ("osquery", &["result"]),
    ("suricata", &["eve"]),
    ("zeek", &["conn", "dns", "http"]),
];

/// One `test_NNN.json` per case plus `test_manifest.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PantherPlatform;

impl Platform for PantherPlatform {
    fn name(&self) -> &'static str {
        "panther"
    }

    fn format_test_case(
        &self,
        record: &Record,
        should_trigger: bool,
        index: usize,
        rule_id: &str,
    ) -> Value {
        json!({
            "id": format!("{rule_id}-{index}"),
            "type": "generated_test",
            "log": record,
            "should_trigger": should_trigger,
            "rule_id": rule_id,
            "generator": GENERATOR,
        })
    }

    fn write_test_suite(&self, cases: &[Value], dir: &Path, rule_id: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let mut files = Vec::with_capacity(cases.len());
        for (i, case) in cases.iter().enumerate() {
            let name = format!("test_{i:03}.json");
            write_json(&dir.join(&name), case)?;
            files.push(name);
        }

        let (positive, negative) = label_counts(cases);
        let manifest_path = dir.join("test_manifest.json");
        write_json(
            &manifest_path,
            &json!({
                "rule_id": rule_id,
                "generator": GENERATOR,
                "test_count": cases.len(),
                "positive_tests": positive,
                "negative_tests": negative,
                "test_files": files,
            }),
        )?;
        Ok(manifest_path)
    }

    fn supports_logsource(&self, logsource: &LogSource) -> bool {
        let product = logsource.product.as_deref().unwrap_or_default().to_lowercase();
        let service = logsource.service.as_deref().unwrap_or_default().to_lowercase();
        SUPPORTED_SOURCES
            .iter()
            .find(|(p, _)| *p == product)
            .is_some_and(|(_, services)| service.is_empty() || services.contains(&service.as_str()))
    }

    fn field_hints(&self, fields: &[String]) -> Vec<String> {
        fields
            .iter()
            .filter(|f| !KNOWN_FIELDS.contains(&f.as_str()))
            .take(5)
            .cloned()
            .collect()
    }

    fn compatibility_warnings(&self, rule: &RuleDocument) -> Vec<String> {
        let mut warnings = Vec::new();
        let unmapped = self.field_hints(&detection_fields(rule));
        if !unmapped.is_empty() {
            warnings.push(format!("Fields may need Panther mapping: {}", unmapped.join(", ")));
        }
        if !self.supports_logsource(&rule.logsource) {
            warnings.push(format!(
                "Logsource {} may require custom Panther log schema",
                logsource_label(&rule.logsource)
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigtest_eval::parse_rule_yaml;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_format_test_case() {
        let entry = record(json!({"eventName": "StopLogging"}));
        let case = PantherPlatform.format_test_case(&entry, true, 3, "r1");
        assert_eq!(case["id"], "r1-3");
        assert_eq!(case["type"], "generated_test");
        assert_eq!(case["log"]["eventName"], "StopLogging");
        assert_eq!(case["should_trigger"], true);
        assert_eq!(case["generator"], "sigtest");
    }

    #[test]
    fn test_write_test_suite() {
        let dir = tempfile::tempdir().unwrap();
        let cases: Vec<Value> = (0..3)
            .map(|i| PantherPlatform.format_test_case(&record(json!({"n": i})), i != 1, i, "r1"))
            .collect();

        let manifest_path = PantherPlatform.write_test_suite(&cases, dir.path(), "r1").unwrap();
        assert_eq!(manifest_path, dir.path().join("test_manifest.json"));
        assert!(dir.path().join("test_000.json").is_file());
        assert!(dir.path().join("test_002.json").is_file());

        let content = std::fs::read_to_string(&manifest_path).unwrap();
        let manifest: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(manifest["test_count"], 3);
        assert_eq!(manifest["positive_tests"], 2);
        assert_eq!(manifest["negative_tests"], 1);
        assert_eq!(manifest["test_files"][1], "test_001.json");
    }

    #[test]
    fn test_compatibility() {
        let rule = parse_rule_yaml(
            r#"
title: t
id: t
logsource:
    product: aws
    service: cloudtrail
detection:
    selection:
        eventName: StopLogging
    condition: selection
"#,
        )
        .unwrap();
        assert!(PantherPlatform.compatibility_warnings(&rule).is_empty());

        let rule = parse_rule_yaml(
            r#"
title: t
id: t
logsource:
    product: windows
    category: process_creation
detection:
    selection:
        CommandLine|contains: whoami
    condition: selection
"#,
        )
        .unwrap();
        let warnings = PantherPlatform.compatibility_warnings(&rule);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("CommandLine"));
        assert!(warnings[1].contains("windows/unknown"));
    }
}
