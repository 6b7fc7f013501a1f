//! # sigtest-gen
//!
//! Turns a handful of hand-written seed records into a labeled test corpus
//! for one detection rule.
//!
//! Positive variants keep every critical field intact and perturb the rest;
//! negative variants additionally corrupt one critical field. Every variant is
//! re-checked with [`sigtest_eval::evaluate`] before it is emitted.
//!
//! ```rust
//! use serde_json::json;
//! use sigtest_eval::compile_criteria;
//! use sigtest_gen::{ExpansionStatus, SeedSet, VariantExpander};
//!
//! let compiled = compile_criteria(&json!({
//!     "eventName": ["CreateTrail", "DeleteTrail"],
//!     "eventSource": "cloudtrail.amazonaws.com",
//! }))
//! .unwrap();
//!
//! let seeds = SeedSet::from_json_str(r#"{
//!     "positive": [{"eventName": "CreateTrail", "eventSource": "cloudtrail.amazonaws.com"}],
//!     "negative": [{"eventName": "CreateTrail", "eventSource": "cloudtrail.amazonaws.com"}]
//! }"#).unwrap();
//!
//! let mut expander = VariantExpander::with_seed(42);
//! let out = expander.expand(
//!     &compiled.criteria,
//!     &compiled.critical_fields(),
//!     &seeds.positive,
//!     &seeds.negative,
//!     10,
//! );
//! assert_eq!(out.status, ExpansionStatus::Complete);
//! assert_eq!(out.variants.len(), 10);
//! ```

pub mod error;
pub mod expander;
pub mod mutation;
pub mod seed;

pub use error::{Result, SeedError};
pub use expander::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_VARIANTS, Expansion, ExpansionStatus, Variant,
    VariantExpander,
};
pub use mutation::{break_critical_field, mutate_non_critical};
pub use seed::{Seed, SeedSet};
