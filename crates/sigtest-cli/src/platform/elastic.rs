use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use sigtest_eval::{LogSource, Record};

use super::{Platform, write_json};
use crate::error::Result;

const SUPPORTED_PRODUCTS: [&str; 12] = [
    "windows",
    "linux",
    "aws",
    "azure",
    "gcp",
    "kubernetes",
    "network",
    "web",
    "database",
    "antivirus",
    "zeek",
    "suricata",
];

/// Source fields copied to their Elastic Common Schema location.
const ECS_FIELDS: [(&str, &str); 11] = [
    ("EventID", "event.code"),
    ("Computer", "host.name"),
    ("User", "user.name"),
    ("CommandLine", "process.command_line"),
    ("Image", "process.executable"),
    ("ProcessId", "process.pid"),
    ("ParentProcessId", "process.parent.pid"),
    ("SourceIp", "source.ip"),
    ("DestinationIp", "destination.ip"),
    ("SourcePort", "source.port"),
    ("DestinationPort", "destination.port"),
];

const ECS_VERSION: &str = "8.0";

/// ECS documents as a `_bulk` NDJSON file, a readable document list and a
/// manifest with an index template suggestion.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElasticPlatform;

impl Platform for ElasticPlatform {
    fn name(&self) -> &'static str {
        "elastic"
    }

    fn format_test_case(
        &self,
        record: &Record,
        should_trigger: bool,
        index: usize,
        rule_id: &str,
    ) -> Value {
        let raw = Value::Object(record.clone()).to_string().to_lowercase();
        let dataset = dataset(record, &raw);
        let test_type = if should_trigger { "positive" } else { "negative" };
        json!({
            "_index": format!("logs-{dataset}-default"),
            "_id": format!("{rule_id}_{index}"),
            "_source": ecs_document(record, &raw, dataset),
            "test_metadata": {
                "rule_id": rule_id,
                "test_case_index": index,
                "should_trigger": should_trigger,
                "test_type": test_type,
                "generated_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        })
    }

    fn write_test_suite(&self, cases: &[Value], dir: &Path, rule_id: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let bulk_name = format!("{rule_id}_bulk.ndjson");
        let documents_name = format!("{rule_id}_documents.json");
        let documents_path = dir.join(&documents_name);

        let mut bulk = String::new();
        for case in cases {
            let action = json!({"index": {"_index": case["_index"], "_id": case["_id"]}});
            bulk.push_str(&action.to_string());
            bulk.push('\n');
            bulk.push_str(&case["_source"].to_string());
            bulk.push('\n');
        }
        std::fs::write(dir.join(&bulk_name), bulk)?;

        let documents: Vec<Value> = cases
            .iter()
            .map(|c| json!({"metadata": c["test_metadata"], "document": c["_source"]}))
            .collect();
        write_json(&documents_path, &json!({ "test_documents": documents }))?;

        let positive = cases
            .iter()
            .filter(|c| c["test_metadata"]["should_trigger"].as_bool().unwrap_or(false))
            .count();
        let pattern = index_pattern(cases);
        write_json(
            &dir.join("test_manifest.json"),
            &json!({
                "rule_id": rule_id,
                "platform": self.name(),
                "test_count": cases.len(),
                "positive_tests": positive,
                "negative_tests": cases.len() - positive,
                "files": {
                    "bulk_import": bulk_name,
                    "documents": documents_name,
                    "manifest": "test_manifest.json",
                },
                "usage": {
                    "description": "Import test documents into Elasticsearch and test rule behavior",
                    "bulk_import_command": format!(
                        "curl -X POST 'localhost:9200/_bulk' \
                         -H 'Content-Type: application/x-ndjson' --data-binary @{bulk_name}"
                    ),
                    "index_pattern": pattern,
                },
                "elastic_info": {
                    "ecs_version": ECS_VERSION,
                    "recommended_index_template": index_template(&pattern),
                },
            }),
        )?;
        Ok(documents_path)
    }

    fn supports_logsource(&self, logsource: &LogSource) -> bool {
        let product = logsource.product.as_deref().unwrap_or_default().to_lowercase();
        product.is_empty() || SUPPORTED_PRODUCTS.contains(&product.as_str())
    }

    fn field_hints(&self, fields: &[String]) -> Vec<String> {
        fields
            .iter()
            .filter_map(|f| {
                ECS_FIELDS
                    .iter()
                    .find(|(source, _)| *source == f.as_str())
                    .map(|(_, ecs)| format!("{f} (recommend ECS field: {ecs})"))
            })
            .collect()
    }
}

/// Data stream dataset guessed from the record's keys and content.
/// `raw` is the lowercased JSON rendering of the record.
fn dataset(record: &Record, raw: &str) -> &'static str {
    if raw.contains("aws") {
        "aws.cloudtrail"
    } else if record.contains_key("EventLog") || record.contains_key("EventID") {
        "windows.sysmon"
    } else if raw.contains("syslog") {
        "system.syslog"
    } else {
        "generic"
    }
}

fn event_categories(record: &Record, raw: &str) -> Vec<&'static str> {
    let has_any = |fields: &[&str]| fields.iter().any(|f| record.contains_key(*f));

    let mut categories = Vec::new();
    if has_any(&["CommandLine", "Image", "ProcessId"]) {
        categories.push("process");
    }
    if has_any(&["SourceIp", "DestinationIp", "SourcePort"]) {
        categories.push("network");
    }
    if ["login", "logon", "auth"].iter().any(|k| raw.contains(k)) {
        categories.push("authentication");
    }
    if has_any(&["FileName", "FilePath", "TargetFilename"]) {
        categories.push("file");
    }
    if categories.is_empty() {
        categories.push("host");
    }
    categories
}

/// The record with `@timestamp`, ECS copies of known fields, `event.category`
/// and `data_stream` added. Original fields are kept.
fn ecs_document(record: &Record, raw: &str, dataset: &str) -> Record {
    let mut doc = record.clone();

    if let Some(ts) = record.get("timestamp") {
        doc.insert("@timestamp".to_string(), ts.clone());
    } else if !record.contains_key("@timestamp") {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        doc.insert("@timestamp".to_string(), Value::String(now));
    }

    for (source, target) in ECS_FIELDS {
        if let Some(value) = record.get(source) {
            set_path(&mut doc, target, value.clone());
        }
    }
    set_path(&mut doc, "event.category", json!(event_categories(record, raw)));

    doc.entry("data_stream").or_insert_with(|| {
        json!({"type": "logs", "dataset": dataset, "namespace": "default"})
    });
    doc
}

/// Write `value` at a dotted path, creating missing objects on the way.
/// A non-object value in the way is left alone and nothing is written.
fn set_path(doc: &mut Record, path: &str, value: Value) {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };

    let mut current = doc;
    for part in parents.into_iter().flat_map(|p| p.split('.')) {
        let slot = current
            .entry(part)
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(next) = slot else {
            log::debug!("not writing {path}: {part} is not an object");
            return;
        };
        current = next;
    }
    current.insert(leaf.to_string(), value);
}

/// The one index every case uses, or the longest shared `-`-separated prefix
/// followed by `-*`.
fn index_pattern(cases: &[Value]) -> String {
    let mut indices: Vec<&str> = cases.iter().filter_map(|c| c["_index"].as_str()).collect();
    indices.sort_unstable();
    indices.dedup();

    match indices.as_slice() {
        [] => "logs-*".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => {
            let mut common: Vec<&str> = first.split('-').collect();
            for index in rest {
                let shared = common
                    .iter()
                    .zip(index.split('-'))
                    .take_while(|(a, b)| **a == *b)
                    .count();
                common.truncate(shared);
            }
            if common.is_empty() {
                "logs-*".to_string()
            } else {
                format!("{}-*", common.join("-"))
            }
        }
    }
}

fn index_template(pattern: &str) -> Value {
    json!({
        "name": "sigtest-test-template",
        "index_patterns": [pattern],
        "data_stream": {},
        "template": {
            "settings": {"number_of_shards": 1, "number_of_replicas": 0},
            "mappings": {
                "properties": {
                    "@timestamp": {"type": "date"},
                    "event": {"properties": {
                        "category": {"type": "keyword"},
                        "code": {"type": "keyword"},
                    }},
                    "host": {"properties": {"name": {"type": "keyword"}}},
                    "process": {"properties": {
                        "command_line": {"type": "text"},
                        "executable": {"type": "keyword"},
                        "pid": {"type": "long"},
                    }},
                },
            },
        },
    })
}
