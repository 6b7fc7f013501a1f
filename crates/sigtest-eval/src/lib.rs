//! # sigtest-eval
//!
//! Criteria evaluation for detection-rule test generation.
//!
//! A detection is compiled once into a [`Criteria`] tree and then evaluated
//! against arbitrary JSON records. The same tree tells the generator which
//! fields a rule depends on ([`CriticalFields`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use sigtest_eval::{compile_criteria, evaluate};
//! use serde_json::json;
//!
//! let compiled = compile_criteria(&json!({
//!     "eventName": ["CreateTrail", "DeleteTrail"],
//!     "eventSource": "cloudtrail.amazonaws.com",
//! }))
//! .unwrap();
//! assert!(compiled.warnings.is_empty());
//!
//! let record = json!({"eventName": "deletetrail", "eventSource": "cloudtrail.amazonaws.com"});
//! assert!(evaluate(&compiled.criteria, record.as_object().unwrap()));
//! ```
//!
//! ## From a Sigma rule
//!
//! ```rust
//! use sigtest_eval::{evaluate, parse_rule_yaml};
//! use serde_json::json;
//!
//! let rule = parse_rule_yaml(r#"
//! title: Detect Whoami
//! id: whoami
//! detection:
//!     selection:
//!         CommandLine|contains: 'whoami'
//!     condition: selection
//! "#).unwrap();
//!
//! let compiled = rule.detection_criteria().unwrap();
//! let record = json!({"CommandLine": "cmd /c WHOAMI"});
//! assert!(evaluate(&compiled.criteria, record.as_object().unwrap()));
//! ```

pub mod compiler;
pub mod condition;
pub mod criteria;
pub mod error;
pub mod event;
pub mod matcher;
pub mod rule;

pub use compiler::{CompiledCriteria, compile_criteria};
pub use criteria::{Criteria, CriticalFields, FieldGroup, evaluate};
pub use error::{Result, RuleError};
pub use event::{Event, Record, field_mut};
pub use matcher::{FieldCondition, OpCheck, Operator, eq_ignore_case};
pub use rule::{LogSource, RuleDocument, parse_rule_file, parse_rule_yaml};
