//! Build criteria trees from dict-shaped criteria documents.
//!
//! A criteria document is a JSON (or YAML) mapping:
//!
//! - `{"and": [...]}`, `{"or": [...]}` and `{"not": {...}}` become logical nodes;
//! - any other mapping is a field group whose keys are `field` or
//!   `field|modifier[|modifier]`.
//!
//! Field values without modifiers compile by shape: scalars to
//! [`FieldCondition::Equals`], lists to [`FieldCondition::OneOf`], mappings to
//! [`FieldCondition::Ops`]. The `|re` modifier compiles its pattern once, here.
//!
//! Compilation is fail-soft. Anything that cannot be interpreted becomes a
//! node that never matches, and a warning is returned alongside the tree.

use regex::Regex;
use serde_json::{Map, Value};

use crate::criteria::{Criteria, CriticalFields, FieldGroup};
use crate::error::{Result, RuleError};
use crate::matcher::{FieldCondition, OpCheck, Operator};

/// A criteria tree plus the warnings produced while building it.
#[derive(Debug, Clone, Default)]
pub struct CompiledCriteria {
    pub criteria: Criteria,
    pub warnings: Vec<String>,
}

impl CompiledCriteria {
    pub fn critical_fields(&self) -> CriticalFields {
        self.criteria.critical_fields()
    }
}

/// Compile a criteria document.
///
/// Only a non-mapping root is an error; every other defect is reported as a
/// warning and compiled into a condition that never matches.
pub fn compile_criteria(value: &Value) -> Result<CompiledCriteria> {
    let map = value
        .as_object()
        .ok_or_else(|| RuleError::NotAMapping(kind_of(value).to_string()))?;

    let mut warnings = Vec::new();
    let criteria = compile_node(map, &mut warnings);
    Ok(CompiledCriteria { criteria, warnings })
}

/// Compile one mapping node. Logical keys win over field keys, in the order
/// `and`, `or`, `not`.
pub(crate) fn compile_node(map: &Map<String, Value>, warnings: &mut Vec<String>) -> Criteria {
    if let Some(children) = map.get("and") {
        return compile_children("and", children, warnings).map_or_else(
            |reason| malformed(reason, warnings),
            Criteria::And,
        );
    }
    if let Some(children) = map.get("or") {
        return compile_children("or", children, warnings).map_or_else(
            |reason| malformed(reason, warnings),
            Criteria::Or,
        );
    }
    if let Some(child) = map.get("not") {
        return match child {
            Value::Object(inner) => Criteria::Not(Box::new(compile_node(inner, warnings))),
            other => malformed(
                format!("'not' expects a mapping, got {}", kind_of(other)),
                warnings,
            ),
        };
    }

    let mut group = FieldGroup::new();
    for (key, value) in map {
        let (field, condition) = compile_field(key, value, warnings);
        group.insert(field, condition);
    }
    Criteria::Fields(group)
}

fn compile_children(
    op: &str,
    value: &Value,
    warnings: &mut Vec<String>,
) -> std::result::Result<Vec<Criteria>, String> {
    let Value::Array(items) = value else {
        return Err(format!("'{op}' expects a list, got {}", kind_of(value)));
    };
    Ok(items
        .iter()
        .map(|item| match item {
            Value::Object(inner) => compile_node(inner, warnings),
            other => malformed(
                format!("'{op}' children must be mappings, got {}", kind_of(other)),
                warnings,
            ),
        })
        .collect())
}

fn malformed(reason: String, warnings: &mut Vec<String>) -> Criteria {
    warnings.push(reason.clone());
    Criteria::Malformed(reason)
}

/// Compile a `field|modifiers: value` entry into its field name and condition.
pub(crate) fn compile_field(
    key: &str,
    value: &Value,
    warnings: &mut Vec<String>,
) -> (String, FieldCondition) {
    let mut parts = key.split('|');
    let field = parts.next().unwrap_or_default().to_string();
    let modifiers: Vec<&str> = parts.collect();

    let condition = if modifiers.is_empty() {
        compile_plain(key, value, warnings)
    } else {
        compile_modified(key, &modifiers, value, warnings)
    };
    (field, condition)
}

fn compile_plain(key: &str, value: &Value, warnings: &mut Vec<String>) -> FieldCondition {
    match value {
        Value::Array(values) => FieldCondition::OneOf(values.clone()),
        Value::Object(ops) => compile_ops(key, ops, warnings),
        scalar => FieldCondition::Equals(scalar.clone()),
    }
}

fn compile_modified(
    key: &str,
    modifiers: &[&str],
    value: &Value,
    warnings: &mut Vec<String>,
) -> FieldCondition {
    let all = modifiers.contains(&"all");
    let mut ops = Vec::new();
    for m in modifiers.iter().filter(|m| **m != "all") {
        match Operator::from_name(m) {
            Some(op) => ops.push(op),
            None => return unsupported(format!("{key}: unknown modifier '{m}'"), warnings),
        }
    }

    let op = match ops.as_slice() {
        [op] => *op,
        [] => return unsupported(format!("{key}: '|all' needs an operator"), warnings),
        _ => {
            return unsupported(
                format!("{key}: only one operator modifier is supported"),
                warnings,
            );
        }
    };

    if op == Operator::Re && !all {
        return compile_regex(key, value, warnings);
    }
    if op == Operator::Re {
        check_patterns(key, value, warnings);
    }

    FieldCondition::Ops(vec![OpCheck::Compare {
        op,
        operand: value.clone(),
        all,
    }])
}

/// Compile a `|re` value once. A list of patterns becomes one alternation.
fn compile_regex(key: &str, value: &Value, warnings: &mut Vec<String>) -> FieldCondition {
    let pattern = match value {
        Value::String(p) => p.clone(),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string) => {
            let alternatives: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(|p| format!("(?:{p})"))
                .collect();
            alternatives.join("|")
        }
        other => {
            return unsupported(
                format!("{key}: regex must be a string, got {}", kind_of(other)),
                warnings,
            );
        }
    };

    match Regex::new(&pattern) {
        Ok(re) => FieldCondition::Regex(re),
        Err(e) => unsupported(format!("{key}: invalid regex pattern: {e}"), warnings),
    }
}

/// Warn about `re` operands that will never compile at evaluation time.
fn check_patterns(key: &str, operand: &Value, warnings: &mut Vec<String>) {
    let patterns: Vec<&str> = match operand {
        Value::String(p) => vec![p.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    for p in patterns {
        if let Err(e) = Regex::new(p) {
            warnings.push(format!("{key}: invalid regex pattern: {e}"));
        }
    }
}

fn compile_ops(key: &str, ops: &Map<String, Value>, warnings: &mut Vec<String>) -> FieldCondition {
    let checks = ops
        .iter()
        .map(|(name, operand)| match Operator::from_name(name) {
            Some(op) => {
                if op == Operator::Re {
                    check_patterns(key, operand, warnings);
                }
                OpCheck::Compare {
                    op,
                    operand: operand.clone(),
                    all: false,
                }
            }
            None => {
                let criteria = match operand {
                    Value::Object(inner) => compile_node(inner, warnings),
                    other => malformed(
                        format!(
                            "{key}: operator '{name}' is unknown and its operand is {}, not a mapping",
                            kind_of(other)
                        ),
                        warnings,
                    ),
                };
                OpCheck::Nested {
                    key: name.clone(),
                    criteria,
                }
            }
        })
        .collect();
    FieldCondition::Ops(checks)
}

fn unsupported(reason: String, warnings: &mut Vec<String>) -> FieldCondition {
    warnings.push(reason.clone());
    FieldCondition::Unsupported(reason)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
