//! The `condition` line of a Sigma detection.
//!
//! The grammar lives in `condition.pest`; operator precedence (`not` over
//! `and` over `or`) is resolved with a Pratt parser. Examples of accepted
//! input: `sel and not filter`, `all of sel_* and not 1 of filter_*`,
//! `2 of them`.

use std::fmt;

use glob_match::glob_match;
use pest::Parser;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::error::{Result, RuleError};

#[derive(Parser)]
#[grammar = "src/condition.pest"]
struct ConditionParser;

/// A parsed condition expression over named selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionExpr {
    And(Vec<ConditionExpr>),
    Or(Vec<ConditionExpr>),
    Not(Box<ConditionExpr>),
    Identifier(String),
    Selector {
        quantifier: Quantifier,
        pattern: SelectorPattern,
    },
}

/// How many of the selected detections must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// `1 of ...` or `any of ...`
    Any,
    /// `all of ...`
    All,
    /// `N of ...`: at least N selections hold.
    Count(u64),
}

/// Which detections a selector ranges over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorPattern {
    /// `... of them`: every selection not starting with `_`.
    Them,
    /// `... of selection_*`
    Pattern(String),
}

impl SelectorPattern {
    /// Check whether a selection name is covered by this pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            SelectorPattern::Them => !name.starts_with('_'),
            SelectorPattern::Pattern(pattern) => glob_match(pattern, name),
        }
    }
}

/// Parse a Sigma condition expression string.
///
/// ```
/// use sigtest_eval::condition::parse_condition;
///
/// let expr = parse_condition("selection and not filter").unwrap();
/// assert_eq!(expr.to_string(), "(selection and not filter)");
/// ```
pub fn parse_condition(input: &str) -> Result<ConditionExpr> {
    let pairs = ConditionParser::parse(Rule::condition, input)
        .map_err(|e| RuleError::Condition(e.to_string()))?;

    // lowest binding power first
    let precedence = PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op));

    let top = pairs
        .flat_map(Pair::into_inner)
        .find(|inner| matches!(inner.as_rule(), Rule::expr))
        .ok_or_else(|| RuleError::Condition(format!("empty condition: {input:?}")))?;

    parse_expr(top, &precedence)
}

fn parse_expr(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>) -> Result<ConditionExpr> {
    pratt
        .map_primary(|atom| match atom.as_rule() {
            Rule::ident => Ok(ConditionExpr::Identifier(atom.as_str().to_string())),
            Rule::selector => parse_selector(atom),
            Rule::expr => parse_expr(atom, pratt),
            other => Err(RuleError::Condition(format!("unexpected token {other:?}"))),
        })
        .map_prefix(|prefix, operand| match prefix.as_rule() {
            Rule::not_op => Ok(ConditionExpr::Not(Box::new(operand?))),
            other => Err(RuleError::Condition(format!("unexpected prefix {other:?}"))),
        })
        .map_infix(|left, infix, right| match infix.as_rule() {
            Rule::and_op => Ok(merge_binary(true, left?, right?)),
            Rule::or_op => Ok(merge_binary(false, left?, right?)),
            other => Err(RuleError::Condition(format!("unexpected operator {other:?}"))),
        })
        .parse(pair.into_inner())
}

/// Join two operands, splicing in the children of a same-kind operand so
/// `a and b and c` yields one three-way `And`.
fn merge_binary(is_and: bool, left: ConditionExpr, right: ConditionExpr) -> ConditionExpr {
    let operands = [left, right].into_iter().flat_map(|side| match side {
        ConditionExpr::And(children) if is_and => children,
        ConditionExpr::Or(children) if !is_and => children,
        other => vec![other],
    });
    if is_and {
        ConditionExpr::And(operands.collect())
    } else {
        ConditionExpr::Or(operands.collect())
    }
}

fn parse_selector(pair: Pair<'_, Rule>) -> Result<ConditionExpr> {
    let mut quantifier = None;
    let mut pattern = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::quantifier => quantifier = Some(parse_quantifier(part)?),
            Rule::selector_target => pattern = Some(parse_selector_target(part)?),
            _ => {} // of_kw
        }
    }

    match (quantifier, pattern) {
        (Some(quantifier), Some(pattern)) => Ok(ConditionExpr::Selector {
            quantifier,
            pattern,
        }),
        _ => Err(RuleError::Condition("incomplete selector".into())),
    }
}

fn parse_quantifier(pair: Pair<'_, Rule>) -> Result<Quantifier> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| RuleError::Condition("quantifier without value".into()))?;
    match inner.as_rule() {
        Rule::all_kw => Ok(Quantifier::All),
        Rule::any_kw => Ok(Quantifier::Any),
        Rule::uint => {
            let text = inner.as_str();
            let n: u64 = text
                .parse()
                .map_err(|e| RuleError::Condition(format!("bad count {text:?}: {e}")))?;
            Ok(if n == 1 {
                Quantifier::Any
            } else {
                Quantifier::Count(n)
            })
        }
        other => Err(RuleError::Condition(format!("unexpected quantifier {other:?}"))),
    }
}

fn parse_selector_target(pair: Pair<'_, Rule>) -> Result<SelectorPattern> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| RuleError::Condition("selector without target".into()))?;
    match inner.as_rule() {
        Rule::them_kw => Ok(SelectorPattern::Them),
        Rule::ident_pattern => Ok(SelectorPattern::Pattern(inner.as_str().to_string())),
        other => Err(RuleError::Condition(format!("unexpected selector target {other:?}"))),
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, sep: &str, items: &[ConditionExpr]) -> fmt::Result {
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " {sep} ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionExpr::And(items) => write_joined(f, "and", items),
            ConditionExpr::Or(items) => write_joined(f, "or", items),
            ConditionExpr::Not(inner) => write!(f, "not {inner}"),
            ConditionExpr::Identifier(name) => f.write_str(name),
            ConditionExpr::Selector {
                quantifier,
                pattern,
            } => write!(f, "{quantifier} of {pattern}"),
        }
    }
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantifier::Any => f.write_str("1"),
            Quantifier::All => f.write_str("all"),
            Quantifier::Count(n) => write!(f, "{n}"),
        }
    }
}

impl fmt::Display for SelectorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorPattern::Them => f.write_str("them"),
            SelectorPattern::Pattern(glob) => f.write_str(glob),
        }
    }
}
