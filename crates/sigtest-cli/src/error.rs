use std::path::PathBuf;

use sigtest_eval::RuleError;
use sigtest_gen::SeedError;
use thiserror::Error;

/// Errors surfaced by the `sigtest` commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{path}: {source}")]
    Rule {
        path: PathBuf,
        #[source]
        source: RuleError,
    },

    #[error("{path}: {source}")]
    Seeds {
        path: PathBuf,
        #[source]
        source: SeedError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Config error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Platform '{name}' not supported. Available: {available}")]
    UnknownPlatform { name: String, available: String },

    #[error("no seed file found for rule (expected {0})")]
    MissingSeeds(PathBuf),

    #[error("no test variants generated")]
    NoVariants,

    #[error("{mismatched} of {total} variants no longer match their label")]
    ValidationMismatch { mismatched: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, CliError>;
