//! Sigma rule documents and their detection criteria.
//!
//! Only the parts of a rule needed to generate tests are modelled: metadata
//! for naming output, the logsource for platform checks, and the detection
//! section, which is turned into a single [`Criteria`] tree.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::compiler::{CompiledCriteria, compile_criteria, compile_node};
use crate::condition::{ConditionExpr, Quantifier, parse_condition};
use crate::criteria::Criteria;
use crate::error::{Result, RuleError};

/// Upper bound on the number of combinations a `N of ...` selector may expand to.
const MAX_SELECTOR_COMBINATIONS: usize = 1024;

/// Detection keys that are not selections.
const RESERVED_DETECTION_KEYS: [&str; 2] = ["condition", "timeframe"];

/// A parsed Sigma rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDocument {
    pub title: String,
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub logsource: LogSource,
    pub detection: Map<String, Value>,
}

/// Log source specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSource {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}

/// Parse a rule from a YAML string.
pub fn parse_rule_yaml(yaml: &str) -> Result<RuleDocument> {
    let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    let Some(mapping) = raw.as_mapping() else {
        return Err(RuleError::InvalidRule("rule document must be a mapping".into()));
    };
    for required in ["title", "id", "detection"] {
        if !mapping.contains_key(required) {
            return Err(RuleError::MissingField(required.to_string()));
        }
    }
    Ok(serde_yaml::from_value(raw)?)
}

/// Parse a rule from a YAML file.
pub fn parse_rule_file(path: &Path) -> Result<RuleDocument> {
    let content = std::fs::read_to_string(path)?;
    parse_rule_yaml(&content)
}

impl RuleDocument {
    /// Build the criteria tree for this rule's detection section.
    ///
    /// - With a `condition`, every named selection is compiled and combined
    ///   as the condition describes. A list of conditions is OR-ed.
    /// - Without one, the `selection` entry is used if present, otherwise the
    ///   whole detection mapping is treated as one criteria document.
    pub fn detection_criteria(&self) -> Result<CompiledCriteria> {
        match self.detection.get("condition") {
            Some(Value::String(condition)) => self.compile_condition(&[condition.as_str()]),
            Some(Value::Array(conditions)) => {
                let conditions: Vec<&str> = conditions
                    .iter()
                    .map(|c| {
                        c.as_str().ok_or_else(|| {
                            RuleError::InvalidDetection(
                                "condition list entries must be strings".into(),
                            )
                        })
                    })
                    .collect::<Result<_>>()?;
                self.compile_condition(&conditions)
            }
            Some(other) => Err(RuleError::InvalidDetection(format!(
                "condition must be a string, got {other}"
            ))),
            None => match self.detection.get("selection") {
                Some(selection) => {
                    let mut warnings = Vec::new();
                    let criteria = compile_selection("selection", selection, &mut warnings);
                    Ok(CompiledCriteria { criteria, warnings })
                }
                None => compile_criteria(&Value::Object(
                    self.selections()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                )),
            },
        }
    }

    /// Named selections, without the reserved keys.
    fn selections(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.detection
            .iter()
            .filter(|(name, _)| !RESERVED_DETECTION_KEYS.contains(&name.as_str()))
    }

    fn compile_condition(&self, conditions: &[&str]) -> Result<CompiledCriteria> {
        let mut warnings = Vec::new();
        let named: Vec<(&str, Criteria)> = self
            .selections()
            .map(|(name, value)| (name.as_str(), compile_selection(name, value, &mut warnings)))
            .collect();

        let mut trees = conditions
            .iter()
            .map(|c| {
                let expr = parse_condition(c)?;
                resolve(&expr, &named)
            })
            .collect::<Result<Vec<_>>>()?;

        let criteria = if trees.len() == 1 {
            trees.remove(0)
        } else {
            Criteria::Or(trees)
        };
        Ok(CompiledCriteria { criteria, warnings })
    }
}

/// Compile one named selection: a mapping is a field group, a list of
/// mappings is OR-ed. Keyword lists are not supported.
fn compile_selection(name: &str, value: &Value, warnings: &mut Vec<String>) -> Criteria {
    match value {
        Value::Object(map) => compile_node(map, warnings),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            Criteria::Or(
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|map| compile_node(map, warnings))
                    .collect(),
            )
        }
        Value::Array(_) => {
            let reason = format!("selection '{name}': keyword lists are not supported");
            warnings.push(reason.clone());
            Criteria::Malformed(reason)
        }
        other => {
            let reason = format!("selection '{name}' must be a mapping or a list, got {other}");
            warnings.push(reason.clone());
            Criteria::Malformed(reason)
        }
    }
}

/// Replace selection references in a condition with their criteria trees.
fn resolve(expr: &ConditionExpr, named: &[(&str, Criteria)]) -> Result<Criteria> {
    match expr {
        ConditionExpr::Identifier(name) => named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| RuleError::UnknownDetection(name.clone())),
        ConditionExpr::And(args) => Ok(Criteria::And(
            args.iter().map(|a| resolve(a, named)).collect::<Result<_>>()?,
        )),
        ConditionExpr::Or(args) => Ok(Criteria::Or(
            args.iter().map(|a| resolve(a, named)).collect::<Result<_>>()?,
        )),
        ConditionExpr::Not(arg) => Ok(Criteria::Not(Box::new(resolve(arg, named)?))),
        ConditionExpr::Selector {
            quantifier,
            pattern,
        } => {
            let matching: Vec<Criteria> = named
                .iter()
                .filter(|(n, _)| pattern.matches(n))
                .map(|(_, c)| c.clone())
                .collect();
            match quantifier {
                Quantifier::Any => Ok(Criteria::Or(matching)),
                Quantifier::All => Ok(Criteria::And(matching)),
                Quantifier::Count(n) => at_least(*n as usize, matching),
            }
        }
    }
}

/// `at least n of items`, expanded into an OR of n-element ANDs.
fn at_least(n: usize, items: Vec<Criteria>) -> Result<Criteria> {
    if n == 0 {
        return Ok(Criteria::And(Vec::new()));
    }
    if n > items.len() {
        return Ok(Criteria::Or(Vec::new()));
    }

    let mut combos = Vec::new();
    let mut indices: Vec<usize> = (0..n).collect();
    loop {
        if combos.len() >= MAX_SELECTOR_COMBINATIONS {
            return Err(RuleError::InvalidDetection(format!(
                "'{n} of' selector expands to more than {MAX_SELECTOR_COMBINATIONS} combinations"
            )));
        }
        combos.push(Criteria::And(
            indices.iter().map(|&i| items[i].clone()).collect(),
        ));

        // Advance to the next combination in lexicographic order.
        let Some(pos) = (0..n).rev().find(|&i| indices[i] != i + items.len() - n) else {
            break;
        };
        indices[pos] += 1;
        for j in pos + 1..n {
            indices[j] = indices[j - 1] + 1;
        }
    }
    Ok(Criteria::Or(combos))
}
