//! Error types for criteria construction and rule loading.

use thiserror::Error;

/// Errors that can occur while loading a rule document or building its
/// criteria tree.
///
/// Matching itself never fails: malformed conditions and type mismatches
/// evaluate to `false` instead of producing an error.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON conversion error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Invalid detection: {0}")]
    InvalidDetection(String),

    #[error("Condition parse error: {0}")]
    Condition(String),

    /// A condition referenced a selection name that the detection does not define.
    #[error("unknown detection identifier: {0}")]
    UnknownDetection(String),

    /// The criteria document root is not a mapping.
    #[error("criteria must be a mapping, got {0}")]
    NotAMapping(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RuleError>;
