//! Field conditions and their matching rules.
//!
//! A [`FieldCondition`] is attached to one field name inside a field group.
//! Matching is total: a value of the wrong type, an incomparable operand or
//! an invalid pattern makes the condition fail instead of raising an error.
//!
//! Case handling:
//! - `OneOf`, `contains`, `startswith` and `endswith` compare case-insensitively;
//! - `Equals`, `Regex` and the `re` operator are case-sensitive.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde_json::{Number, Value};

use crate::criteria::Criteria;
use crate::event::Event;

/// A pre-built check for the value of a single field.
#[derive(Debug, Clone)]
pub enum FieldCondition {
    /// Exact equality. Numbers compare by value, so `1` equals `1.0`.
    Equals(Value),

    /// Case-insensitive membership. A sequence-valued field must contain
    /// every listed value; a scalar field must equal any of them.
    OneOf(Vec<Value>),

    /// Unanchored, case-sensitive regex search compiled at build time.
    Regex(Regex),

    /// Operator checks; all of them must hold.
    Ops(Vec<OpCheck>),

    /// A condition that could not be built (bad pattern, unknown modifier,
    /// unsupported value shape). Never matches.
    Unsupported(String),
}

/// A recognized comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Contains,
    StartsWith,
    EndsWith,
    Re,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    /// Look up an operator by name. A single leading `|` is tolerated.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.strip_prefix('|').unwrap_or(name) {
            "contains" => Some(Operator::Contains),
            "startswith" => Some(Operator::StartsWith),
            "endswith" => Some(Operator::EndsWith),
            "re" => Some(Operator::Re),
            "gt" => Some(Operator::Gt),
            "gte" => Some(Operator::Gte),
            "lt" => Some(Operator::Lt),
            "lte" => Some(Operator::Lte),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Contains => "contains",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::Re => "re",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of an operator map.
#[derive(Debug, Clone)]
pub enum OpCheck {
    /// A recognized operator applied to the field value.
    ///
    /// A sequence operand matches when any element matches, or every
    /// element when `all` is set.
    Compare {
        op: Operator,
        operand: Value,
        all: bool,
    },

    /// An unrecognized operator key. The operand is evaluated as a criteria
    /// node against the whole record, not against the field value.
    // NOTE: compatibility fallback. New operators belong in `Operator`.
    Nested { key: String, criteria: Criteria },
}

impl FieldCondition {
    /// Check whether the field value satisfies this condition.
    ///
    /// `event` is the record the value came from; only nested operator
    /// fallbacks look at it.
    pub fn matches(&self, value: &Value, event: &Event) -> bool {
        match self {
            FieldCondition::Equals(expected) => json_eq(value, expected),

            FieldCondition::OneOf(allowed) => match value {
                Value::Array(items) => allowed
                    .iter()
                    .all(|a| items.iter().any(|item| loose_eq(item, a))),
                single => allowed.iter().any(|a| loose_eq(single, a)),
            },

            FieldCondition::Regex(re) => value.as_str().is_some_and(|s| re.is_match(s)),

            FieldCondition::Ops(checks) => checks.iter().all(|check| check.matches(value, event)),

            FieldCondition::Unsupported(_) => false,
        }
    }
}

impl OpCheck {
    pub fn matches(&self, value: &Value, event: &Event) -> bool {
        match self {
            OpCheck::Compare { op, operand, all } => match operand {
                Value::Array(operands) if *all => {
                    !operands.is_empty() && operands.iter().all(|o| compare(*op, value, o))
                }
                Value::Array(operands) => operands.iter().any(|o| compare(*op, value, o)),
                single => compare(*op, value, single),
            },
            OpCheck::Nested { criteria, .. } => criteria.matches(event),
        }
    }
}

/// Apply a single operator to a field value and a scalar operand.
fn compare(op: Operator, value: &Value, operand: &Value) -> bool {
    match op {
        Operator::Contains => str_pair(value, operand, |v, o| fold(v).contains(&fold(o))),
        Operator::StartsWith => str_pair(value, operand, |v, o| fold(v).starts_with(&fold(o))),
        Operator::EndsWith => str_pair(value, operand, |v, o| fold(v).ends_with(&fold(o))),
        Operator::Re => str_pair(value, operand, |v, pattern| match Regex::new(pattern) {
            Ok(re) => re.is_match(v),
            Err(e) => {
                log::debug!("re operand {pattern:?} does not compile: {e}");
                false
            }
        }),
        Operator::Gt => ordering(value, operand).is_some_and(Ordering::is_gt),
        Operator::Gte => ordering(value, operand).is_some_and(Ordering::is_ge),
        Operator::Lt => ordering(value, operand).is_some_and(Ordering::is_lt),
        Operator::Lte => ordering(value, operand).is_some_and(Ordering::is_le),
    }
}

fn str_pair(value: &Value, operand: &Value, pred: impl Fn(&str, &str) -> bool) -> bool {
    match (value, operand) {
        (Value::String(v), Value::String(o)) => pred(v, o),
        _ => false,
    }
}

/// Order two values of the same kind. Mixed kinds are incomparable.
fn ordering(value: &Value, operand: &Value) -> Option<Ordering> {
    match (value, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Equality where strings compare case-insensitively and everything else exactly.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => eq_ignore_case(x, y),
        _ => json_eq(a, b),
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_eq(x, y),
        _ => a == b,
    }
}

/// Integers compare exactly; once either side is a float both are compared as `f64`.
fn number_eq(a: &Number, b: &Number) -> bool {
    if a.is_f64() || b.is_f64() {
        a.as_f64() == b.as_f64()
    } else {
        a == b
    }
}

fn fold(s: &str) -> String {
    s.to_lowercase()
}

/// Case-insensitive string equality, as used by `OneOf` membership.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a == b || fold(a) == fold(b)
}
