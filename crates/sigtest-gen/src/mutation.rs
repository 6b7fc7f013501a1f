//! Record mutations used to derive variants from a seed.
//!
//! Both strategies take the RNG as an argument so a single seeded generator
//! drives every random choice of an expansion.

use rand::Rng;
use rand::distr::{Alphanumeric, Distribution};
use rand::seq::IndexedRandom;
use serde_json::Value;
use sigtest_eval::{
    Criteria, CriticalFields, Event, FieldCondition, Record, eq_ignore_case, field_mut,
};

const CASE_CHANGE_PROBABILITY: f64 = 0.20;
const NOISE_PROBABILITY: f64 = 0.10;
const PREFIX_PROBABILITY: f64 = 0.15;
const NOISE_LEN: usize = 5;
const BREAK_SUFFIX: &str = "_notallowed";

/// Perturb every string field that no critical field lives under.
///
/// Each transformation is rolled independently and applies on top of the
/// previous ones:
/// - 20%: force lower or upper case;
/// - 10%: append `_` and five random alphanumerics;
/// - 15%: prefix `ERROR_` when the value mentions "error", else `FAILED_`
///   when it mentions "failed".
pub fn mutate_non_critical<R: Rng + ?Sized>(
    record: &mut Record,
    critical: &CriticalFields,
    rng: &mut R,
) {
    for (key, value) in record.iter_mut() {
        if critical.protects(key) {
            continue;
        }
        let Value::String(s) = value else {
            continue;
        };

        if rng.random::<f64>() < CASE_CHANGE_PROBABILITY {
            *s = if rng.random_bool(0.5) {
                s.to_lowercase()
            } else {
                s.to_uppercase()
            };
        }
        if rng.random::<f64>() < NOISE_PROBABILITY {
            s.push('_');
            s.extend((0..NOISE_LEN).map(|_| char::from(Alphanumeric.sample(&mut *rng))));
        }
        if rng.random::<f64>() < PREFIX_PROBABILITY {
            let folded = s.to_lowercase();
            if folded.contains("error") {
                s.insert_str(0, "ERROR_");
            } else if folded.contains("failed") {
                s.insert_str(0, "FAILED_");
            }
        }
    }
}

/// Overwrite one randomly chosen critical field with a value its condition
/// does not allow.
///
/// Only fields present in the record are candidates. Returns the name of the
/// field that was changed, or `None` when no critical field is present.
pub fn break_critical_field<R: Rng + ?Sized>(
    record: &mut Record,
    criteria: &Criteria,
    critical: &CriticalFields,
    rng: &mut R,
) -> Option<String> {
    let present: Vec<&str> = {
        let event = Event::new(record);
        critical.iter().filter(|f| event.has_field(f)).collect()
    };
    let field = (*present.choose(rng)?).to_string();

    let replacement = match criteria.condition_for(&field) {
        Some(FieldCondition::OneOf(allowed)) => outside_of(allowed, rng),
        Some(FieldCondition::Equals(Value::String(s))) => format!("{s}{BREAK_SUFFIX}"),
        Some(FieldCondition::Equals(scalar)) if !scalar.is_array() && !scalar.is_object() => {
            format!("{scalar}{BREAK_SUFFIX}")
        }
        _ => "notallowed".to_string(),
    };
    log::trace!("breaking critical field {field:?} with {replacement:?}");

    let slot = field_mut(record, &field)?;
    *slot = Value::String(replacement);
    Some(field)
}

/// A string that case-insensitively differs from every allowed value.
fn outside_of<R: Rng + ?Sized>(allowed: &[Value], rng: &mut R) -> String {
    let allowed: Vec<String> = allowed.iter().map(display_value).collect();
    let Some(first) = allowed.first() else {
        return "notallowed".to_string();
    };

    let mut candidate = format!("{first}{BREAK_SUFFIX}");
    while allowed.iter().any(|a| eq_ignore_case(a, &candidate)) {
        candidate.push(char::from(b'0' + rng.random_range(0..10u8)));
    }
    candidate
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
