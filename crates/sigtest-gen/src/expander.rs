//! Seeded expansion of seed records into verified variants.
//!
//! Every variant is re-evaluated against the criteria tree before it is
//! accepted, so its label is the evaluator's verdict, not a guess.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::Serialize;
use sigtest_eval::{Criteria, CriticalFields, Record, evaluate};

use crate::mutation::{break_critical_field, mutate_non_critical};
use crate::seed::{Seed, labelled};

/// Default number of mutation attempts per requested variant.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Default ceiling on the number of variants a single expansion produces.
pub const DEFAULT_MAX_VARIANTS: usize = 1_000_000;

/// A generated record and the outcome the rule produces for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    pub record: Record,
    pub should_trigger: bool,
}

/// How an expansion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionStatus {
    /// Exactly the requested number of variants was produced.
    Complete,
    /// There were no seeds to expand.
    NoSeeds,
    /// Fewer variants than requested: the top-up budget ran out, or the
    /// request exceeded the expander's variant ceiling.
    UnderGenerated { produced: usize, requested: usize },
}

/// The result of [`VariantExpander::expand`].
#[derive(Debug, Clone)]
pub struct Expansion {
    pub variants: Vec<Variant>,
    pub requested: usize,
    pub status: ExpansionStatus,
}

impl Expansion {
    pub fn positives(&self) -> usize {
        self.variants.iter().filter(|v| v.should_trigger).count()
    }

    pub fn negatives(&self) -> usize {
        self.variants.len() - self.positives()
    }
}

/// Expands seeds into variants using one owned RNG.
///
/// Two expanders built with the same seed produce identical output for the
/// same inputs.
#[derive(Debug, Clone)]
pub struct VariantExpander {
    rng: StdRng,
    max_attempts: usize,
    max_variants: usize,
}

impl Default for VariantExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl VariantExpander {
    /// Expander seeded from the operating system.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Reproducible expander.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    /// Reproducible when `seed` is set, otherwise seeded from the OS.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::with_seed)
    }

    fn from_rng(rng: StdRng) -> Self {
        VariantExpander {
            rng,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_variants: DEFAULT_MAX_VARIANTS,
        }
    }

    /// Set the number of attempts per variant slot (at least one).
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the most variants one expansion may produce. Larger requests are
    /// clamped and reported as [`ExpansionStatus::UnderGenerated`].
    pub fn max_variants(mut self, limit: usize) -> Self {
        self.max_variants = limit;
        self
    }

    /// Produce up to `requested` variants whose label ratio follows the seed
    /// ratio.
    ///
    /// The request is first clamped to the expander's variant ceiling.
    /// Variants are generated per seed, shuffled, then truncated or topped up
    /// from randomly chosen seeds. Top-up gives up after
    /// `target * max_attempts` tries. Either shortfall is reported as
    /// [`ExpansionStatus::UnderGenerated`].
    pub fn expand(
        &mut self,
        criteria: &Criteria,
        critical: &CriticalFields,
        positive: &[Record],
        negative: &[Record],
        requested: usize,
    ) -> Expansion {
        let total_seeds = positive.len() + negative.len();
        if total_seeds == 0 {
            return Expansion {
                variants: Vec::new(),
                requested,
                status: ExpansionStatus::NoSeeds,
            };
        }

        let target = requested.min(self.max_variants);
        if target < requested {
            log::warn!(
                "requested {requested} variants, limiting to {}",
                self.max_variants
            );
        }

        let (target_positive, target_negative) =
            split_target(target, positive.len(), total_seeds);
        log::debug!(
            "expanding {}+{} seeds into {target_positive}+{target_negative} variants",
            positive.len(),
            negative.len()
        );

        let mut variants = Vec::new();
        for (seeds, wanted, label) in [
            (positive, target_positive, true),
            (negative, target_negative, false),
        ] {
            if seeds.is_empty() {
                continue;
            }
            let quota = wanted / seeds.len();
            for seed in seeds {
                variants.extend(self.generate_from_seed(criteria, critical, seed, quota, label));
            }
        }

        variants.shuffle(&mut self.rng);

        if variants.len() > target {
            variants.truncate(target);
        } else if variants.len() < target {
            self.top_up(criteria, critical, positive, negative, target, &mut variants);
        }

        let status = if variants.len() < requested {
            log::debug!("under-generated: {} of {requested} variants", variants.len());
            ExpansionStatus::UnderGenerated {
                produced: variants.len(),
                requested,
            }
        } else {
            ExpansionStatus::Complete
        };

        Expansion {
            variants,
            requested,
            status,
        }
    }

    fn top_up(
        &mut self,
        criteria: &Criteria,
        critical: &CriticalFields,
        positive: &[Record],
        negative: &[Record],
        target: usize,
        variants: &mut Vec<Variant>,
    ) {
        let pool: Vec<Seed<'_>> = labelled(positive, true)
            .chain(labelled(negative, false))
            .collect();
        let budget = target.saturating_mul(self.max_attempts);

        let mut tries = 0;
        while variants.len() < target && tries < budget {
            tries += 1;
            let Some(seed) = pool.choose(&mut self.rng).copied() else {
                return;
            };
            variants.extend(self.generate_from_seed(
                criteria,
                critical,
                seed.record,
                1,
                seed.should_trigger,
            ));
        }
        log::trace!("top-up used {tries} of {budget} tries");
    }

    /// Derive up to `count` variants from one seed.
    ///
    /// Each slot gets `max_attempts` tries: copy the seed, mutate it (a
    /// negative variant first has one critical field broken), and accept it
    /// when the criteria outcome equals `should_trigger`. Slots that exhaust
    /// their tries produce nothing.
    pub fn generate_from_seed(
        &mut self,
        criteria: &Criteria,
        critical: &CriticalFields,
        seed: &Record,
        count: usize,
        should_trigger: bool,
    ) -> Vec<Variant> {
        let mut out = Vec::with_capacity(count.min(self.max_variants));
        for _ in 0..count {
            for attempt in 0..self.max_attempts {
                let mut record = seed.clone();
                if !should_trigger {
                    break_critical_field(&mut record, criteria, critical, &mut self.rng);
                }
                mutate_non_critical(&mut record, critical, &mut self.rng);

                if evaluate(criteria, &record) == should_trigger {
                    out.push(Variant {
                        record,
                        should_trigger,
                    });
                    break;
                }
                log::trace!("attempt {} rejected (wanted {should_trigger})", attempt + 1);
            }
        }
        out
    }
}

/// Split `target` between positives and negatives in proportion to the seed
/// counts, rounding the positive share down.
fn split_target(target: usize, positives: usize, total: usize) -> (usize, usize) {
    let share = target as u128 * positives as u128 / total as u128;
    // share <= target, so it fits
    let positive = usize::try_from(share).unwrap_or(target);
    (positive, target - positive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use sigtest_eval::compile_criteria;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_no_seeds() {
        let mut expander = VariantExpander::with_seed(0);
        let out = expander.expand(&Criteria::default(), &CriticalFields::default(), &[], &[], 10);
        assert!(out.variants.is_empty());
        assert_eq!(out.status, ExpansionStatus::NoSeeds);
    }

    #[test]
    fn test_zero_target() {
        let mut expander = VariantExpander::with_seed(0);
        let seeds = [record(json!({"a": "x"}))];
        let out = expander.expand(&Criteria::default(), &CriticalFields::default(), &seeds, &[], 0);
        assert!(out.variants.is_empty());
        assert_eq!(out.status, ExpansionStatus::Complete);
    }

    #[test]
    fn test_generate_from_seed_positive() {
        let compiled = compile_criteria(&json!({"eventName": "CreateTrail"})).unwrap();
        let critical = compiled.critical_fields();
        let seed = record(json!({"eventName": "CreateTrail", "awsRegion": "us-east-1"}));

        let mut expander = VariantExpander::with_seed(42);
        let variants = expander.generate_from_seed(&compiled.criteria, &critical, &seed, 8, true);
        assert_eq!(variants.len(), 8);
        for v in &variants {
            assert!(v.should_trigger);
            assert_eq!(v.record["eventName"], "CreateTrail");
        }
    }

    #[test]
    fn test_unbreakable_negative_slots_are_dropped() {
        // No critical field is present, so a negative seed that matches can
        // never be turned into a non-match.
        let compiled = compile_criteria(&json!({})).unwrap();
        let seed = record(json!({"a": "b"}));
        let mut expander = VariantExpander::with_seed(1).max_attempts(3);
        let critical = CriticalFields::default();
        let variants = expander.generate_from_seed(&compiled.criteria, &critical, &seed, 4, false);
        assert!(variants.is_empty());
    }

    #[test]
    fn test_under_generation_status() {
        let compiled = compile_criteria(&json!({})).unwrap();
        let seeds = [record(json!({"a": "b"}))];
        let mut expander = VariantExpander::with_seed(9);
        let out = expander.expand(&compiled.criteria, &compiled.critical_fields(), &[], &seeds, 6);
        assert!(out.variants.is_empty());
        assert_eq!(
            out.status,
            ExpansionStatus::UnderGenerated {
                produced: 0,
                requested: 6
            }
        );
    }

    #[test]
    fn test_split_target_does_not_overflow() {
        assert_eq!(split_target(10, 1, 2), (5, 5));
        assert_eq!(split_target(10, 1, 3), (3, 7));
        let (positive, negative) = split_target(usize::MAX, 3, 4);
        assert_eq!(positive as u128, usize::MAX as u128 * 3 / 4);
        assert_eq!(positive + negative, usize::MAX);
    }

    #[test]
    fn test_huge_request_is_clamped() {
        let compiled = compile_criteria(&json!({"eventName": "CreateTrail"})).unwrap();
        let critical = compiled.critical_fields();
        let positive = [record(json!({"eventName": "CreateTrail", "region": "us-east-1"}))];
        let negative = [record(json!({"eventName": "CreateTrail", "region": "eu-west-1"}))];

        let mut expander = VariantExpander::with_seed(1).max_variants(8);
        let requested = usize::MAX / 2;
        let out = expander.expand(&compiled.criteria, &critical, &positive, &negative, requested);

        assert_eq!(out.variants.len(), 8);
        assert_eq!(out.positives(), 4);
        assert_eq!(out.requested, requested);
        assert_eq!(
            out.status,
            ExpansionStatus::UnderGenerated {
                produced: 8,
                requested
            }
        );
    }

    #[test]
    fn test_quota_remainder_is_topped_up() {
        let compiled =
            compile_criteria(&json!({"eventName": ["CreateTrail", "DeleteTrail"]})).unwrap();
        let critical = compiled.critical_fields();
        let positive = [
            record(json!({"eventName": "CreateTrail"})),
            record(json!({"eventName": "DeleteTrail"})),
            record(json!({"eventName": "createtrail"})),
        ];
        let mut expander = VariantExpander::with_seed(5);
        let out = expander.expand(&compiled.criteria, &critical, &positive, &[], 10);
        assert_eq!(out.variants.len(), 10);
        assert_eq!(out.positives(), 10);
        assert_eq!(out.status, ExpansionStatus::Complete);
    }
}
