//! Layered configuration: defaults, then a YAML file, then `SIGTEST_*`
//! environment variables. Command-line flags are applied last by the caller.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sigtest_gen::DEFAULT_MAX_ATTEMPTS;

use crate::error::{CliError, Result};

/// File names searched in the working directory, in order.
const LOCAL_CONFIG_FILES: [&str; 3] = ["sigtest.yaml", "sigtest.yml", ".sigtest.yaml"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Seeds kept per label.
    pub seed_samples: usize,
    /// Variants generated per rule.
    pub samples: usize,
    pub random_seed: Option<u64>,
    pub max_attempts: usize,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub input_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub parallel_workers: usize,
    pub fail_fast: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            seed_samples: 5,
            samples: 200,
            random_seed: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            batch: BatchConfig::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            input_patterns: vec!["**/*.yml".to_string(), "**/*.yaml".to_string()],
            exclude_patterns: Vec::new(),
            parallel_workers: 4,
            fail_fast: false,
        }
    }
}

impl SynthConfig {
    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(SynthConfig::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Apply `SIGTEST_*` overrides. Unparsable values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_with(&lookup, "SIGTEST_SEED_SAMPLES", &mut self.seed_samples);
        override_with(&lookup, "SIGTEST_SAMPLES", &mut self.samples);
        override_with(&lookup, "SIGTEST_MAX_ATTEMPTS", &mut self.max_attempts);
        override_with(&lookup, "SIGTEST_PARALLEL_WORKERS", &mut self.batch.parallel_workers);

        if let Some(raw) = lookup("SIGTEST_RANDOM_SEED") {
            match raw.trim().parse() {
                Ok(seed) => self.random_seed = Some(seed),
                Err(e) => log::warn!("ignoring SIGTEST_RANDOM_SEED={raw:?}: {e}"),
            }
        }
        if let Some(raw) = lookup("SIGTEST_FAIL_FAST") {
            self.batch.fail_fast = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            );
        }
    }
}

fn override_with(lookup: &impl Fn(&str) -> Option<String>, var: &str, slot: &mut usize) {
    let Some(raw) = lookup(var) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(e) => log::warn!("ignoring {var}={raw:?}: {e}"),
    }
}

/// First existing config file among the standard locations.
pub fn find_config_file(cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let local = LOCAL_CONFIG_FILES.iter().map(|name| cwd.join(name));
    let user = home
        .into_iter()
        .flat_map(|h| [h.join(".sigtest.yaml"), h.join(".config/sigtest/config.yaml")]);
    local.chain(user).find(|p| p.is_file())
}

/// Load the effective configuration.
///
/// An explicit path must exist; otherwise the standard locations are tried
/// and the defaults are used when none exists.
pub fn load_config(explicit: Option<&Path>) -> Result<SynthConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let cwd = std::env::current_dir()?;
            let home = std::env::var_os("HOME").map(PathBuf::from);
            find_config_file(&cwd, home.as_deref())
        }
    };

    let mut config = match path {
        Some(path) => {
            log::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path).map_err(|e| CliError::Config {
                path: path.clone(),
                message: e.to_string(),
            })?;
            SynthConfig::from_yaml_str(&content).map_err(|e| CliError::Config {
                path,
                message: e.to_string(),
            })?
        }
        None => SynthConfig::default(),
    };

    config.apply_env(|var| std::env::var(var).ok());
    Ok(config)
}
