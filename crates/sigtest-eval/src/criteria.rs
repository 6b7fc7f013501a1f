//! The criteria tree and its evaluation.
//!
//! A [`Criteria`] is an immutable boolean expression over field groups. It is
//! built once per rule (see [`crate::compiler`]) and then evaluated against
//! any number of records.

use std::fmt;

use crate::event::{Event, Record};
use crate::matcher::{FieldCondition, OpCheck};

/// A detection predicate.
#[derive(Debug, Clone)]
pub enum Criteria {
    /// All children must hold.
    And(Vec<Criteria>),
    /// At least one child must hold.
    Or(Vec<Criteria>),
    /// The child must not hold.
    Not(Box<Criteria>),
    /// Every field in the group must be present and satisfy its condition.
    Fields(FieldGroup),
    /// A node that could not be interpreted. Never matches.
    Malformed(String),
}

impl Default for Criteria {
    /// The empty field group, which matches every record.
    fn default() -> Self {
        Criteria::Fields(FieldGroup::default())
    }
}

/// Conditions on individual fields, combined with implicit AND.
///
/// The same field may appear more than once (e.g. `CommandLine|contains` next
/// to `CommandLine|endswith`); each entry is checked independently.
#[derive(Debug, Clone, Default)]
pub struct FieldGroup {
    entries: Vec<(String, FieldCondition)>,
}

impl FieldGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, condition: FieldCondition) {
        self.entries.push((field.into(), condition));
    }

    /// Builder-style variant of [`FieldGroup::insert`].
    pub fn with(mut self, field: impl Into<String>, condition: FieldCondition) -> Self {
        self.insert(field, condition);
        self
    }

    /// The first condition recorded for `field`.
    pub fn get(&self, field: &str) -> Option<&FieldCondition> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldCondition)> {
        self.entries.iter().map(|(name, c)| (name.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every field must be present and match. An empty group matches vacuously.
    pub fn matches(&self, event: &Event) -> bool {
        self.entries.iter().all(|(field, condition)| {
            event
                .get_field(field)
                .is_some_and(|value| condition.matches(value, event))
        })
    }
}

impl Criteria {
    /// Evaluate this predicate against an event.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Criteria::And(children) => children.iter().all(|c| c.matches(event)),
            Criteria::Or(children) => children.iter().any(|c| c.matches(event)),
            Criteria::Not(child) => !child.matches(event),
            Criteria::Fields(group) => group.matches(event),
            Criteria::Malformed(_) => false,
        }
    }

    /// Whether this is the empty field group.
    pub fn is_empty(&self) -> bool {
        matches!(self, Criteria::Fields(group) if group.is_empty())
    }

    /// Collect the field names referenced by every field group in the tree,
    /// in first-seen order.
    pub fn critical_fields(&self) -> CriticalFields {
        let mut fields = CriticalFields::default();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, out: &mut CriticalFields) {
        match self {
            Criteria::And(children) | Criteria::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Criteria::Not(child) => child.collect_fields(out),
            Criteria::Fields(group) => {
                for (name, condition) in group.iter() {
                    out.insert(name);
                    if let FieldCondition::Ops(checks) = condition {
                        for check in checks {
                            if let OpCheck::Nested { criteria, .. } = check {
                                criteria.collect_fields(out);
                            }
                        }
                    }
                }
            }
            Criteria::Malformed(_) => {}
        }
    }

    /// The first condition attached to `field`, searching the tree depth-first.
    pub fn condition_for(&self, field: &str) -> Option<&FieldCondition> {
        match self {
            Criteria::And(children) | Criteria::Or(children) => {
                children.iter().find_map(|c| c.condition_for(field))
            }
            Criteria::Not(child) => child.condition_for(field),
            Criteria::Fields(group) => group.get(field),
            Criteria::Malformed(_) => None,
        }
    }
}

/// Evaluate `criteria` against a record.
///
/// This is the read-only entry point for external validators.
pub fn evaluate(criteria: &Criteria, record: &Record) -> bool {
    criteria.matches(&Event::new(record))
}

/// The fields a criteria tree depends on.
///
/// Critical fields are left untouched when generating matching variants and
/// are the ones corrupted when generating non-matching variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriticalFields {
    names: Vec<String>,
}

impl CriticalFields {
    /// Add a field name; duplicates are ignored.
    pub fn insert(&mut self, name: &str) {
        if !self.contains(name) {
            self.names.push(name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Whether mutating the top-level key `key` could touch a critical field,
    /// either because it is one or because a dotted critical path starts there.
    pub fn protects(&self, key: &str) -> bool {
        self.names.iter().any(|n| {
            n == key
                || n
                    .strip_prefix(key)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for CriticalFields {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut fields = CriticalFields::default();
        for name in iter {
            fields.insert(name.as_ref());
        }
        fields
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criteria::And(args) => {
                let parts: Vec<String> = args.iter().map(|a| format!("{a}")).collect();
                write!(f, "({})", parts.join(" and "))
            }
            Criteria::Or(args) => {
                let parts: Vec<String> = args.iter().map(|a| format!("{a}")).collect();
                write!(f, "({})", parts.join(" or "))
            }
            Criteria::Not(arg) => write!(f, "not {arg}"),
            Criteria::Fields(group) => write!(f, "{group}"),
            Criteria::Malformed(reason) => write!(f, "<malformed: {reason}>"),
        }
    }
}

impl fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(name, c)| format!("{name} {c}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl fmt::Display for FieldCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCondition::Equals(v) => write!(f, "== {v}"),
            FieldCondition::OneOf(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "in [{}]", parts.join(", "))
            }
            FieldCondition::Regex(re) => write!(f, "=~ /{}/", re.as_str()),
            FieldCondition::Ops(checks) => {
                let parts: Vec<String> = checks
                    .iter()
                    .map(|check| match check {
                        OpCheck::Compare { op, operand, all } => {
                            let quant = if *all { "|all" } else { "" };
                            format!("{op}{quant} {operand}")
                        }
                        OpCheck::Nested { key, criteria } => format!("{key}: {criteria}"),
                    })
                    .collect();
                write!(f, "[{}]", parts.join(" and "))
            }
            FieldCondition::Unsupported(reason) => write!(f, "<unsupported: {reason}>"),
        }
    }
}
