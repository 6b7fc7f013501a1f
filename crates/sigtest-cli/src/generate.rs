//! The per-rule pipeline shared by `generate` and `batch`: load the rule and
//! its seeds, expand, re-validate, then write one suite per platform.

use std::path::{Path, PathBuf};

use sigtest_eval::{evaluate, parse_rule_file};
use sigtest_gen::{ExpansionStatus, SeedSet, VariantExpander};

use crate::config::SynthConfig;
use crate::error::{CliError, Result};
use crate::platform::Platform;

/// Where each platform's suite is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// Directly into the output directory.
    Flat,
    /// Into `<output>/<platform>/<rule_id>/`.
    PerPlatform,
}

impl OutputLayout {
    fn suite_dir(self, output: &Path, platform: &str, rule_id: &str) -> PathBuf {
        match self {
            OutputLayout::Flat => output.to_path_buf(),
            OutputLayout::PerPlatform => output.join(platform).join(rule_id),
        }
    }
}

/// What one rule produced.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub title: String,
    pub test_count: usize,
    pub positive: usize,
    pub negative: usize,
    pub warnings: Vec<String>,
    pub outputs: Vec<PathBuf>,
}

pub fn generate_rule(
    rule_path: &Path,
    seeds_path: &Path,
    platforms: &[Box<dyn Platform>],
    output: &Path,
    layout: OutputLayout,
    config: &SynthConfig,
) -> Result<RuleOutcome> {
    let rule = parse_rule_file(rule_path).map_err(|source| CliError::Rule {
        path: rule_path.to_path_buf(),
        source,
    })?;
    let compiled = rule.detection_criteria().map_err(|source| CliError::Rule {
        path: rule_path.to_path_buf(),
        source,
    })?;

    let mut warnings = Vec::new();
    for w in &compiled.warnings {
        log::warn!("{}: {w}", rule.id);
        warnings.push(w.clone());
    }

    if !seeds_path.is_file() {
        return Err(CliError::MissingSeeds(seeds_path.to_path_buf()));
    }
    let mut seeds = SeedSet::load(seeds_path).map_err(|source| CliError::Seeds {
        path: seeds_path.to_path_buf(),
        source,
    })?;
    seeds.truncate(config.seed_samples);
    log::debug!(
        "{}: {} positive, {} negative seeds",
        rule.id,
        seeds.positive.len(),
        seeds.negative.len()
    );

    let mut expander =
        VariantExpander::from_optional_seed(config.random_seed).max_attempts(config.max_attempts);
    let expansion = expander.expand(
        &compiled.criteria,
        &compiled.critical_fields(),
        &seeds.positive,
        &seeds.negative,
        config.samples,
    );

    if let ExpansionStatus::UnderGenerated {
        produced,
        requested,
    } = expansion.status
    {
        let message = format!("only {produced} of {requested} variants could be generated");
        log::warn!("{}: {message}", rule.id);
        warnings.push(message);
    }
    if expansion.variants.is_empty() {
        return Err(CliError::NoVariants);
    }

    let mismatched = expansion
        .variants
        .iter()
        .filter(|v| evaluate(&compiled.criteria, &v.record) != v.should_trigger)
        .count();
    if mismatched > 0 {
        return Err(CliError::ValidationMismatch {
            mismatched,
            total: expansion.variants.len(),
        });
    }

    let mut outputs = Vec::with_capacity(platforms.len());
    for platform in platforms {
        for w in platform.compatibility_warnings(&rule) {
            warnings.push(format!("[{}] {w}", platform.name()));
        }
        let cases: Vec<_> = expansion
            .variants
            .iter()
            .enumerate()
            .map(|(i, v)| platform.format_test_case(&v.record, v.should_trigger, i, &rule.id))
            .collect();
        let dir = layout.suite_dir(output, platform.name(), &rule.id);
        outputs.push(platform.write_test_suite(&cases, &dir, &rule.id)?);
    }

    Ok(RuleOutcome {
        test_count: expansion.variants.len(),
        positive: expansion.positives(),
        negative: expansion.negatives(),
        rule_id: rule.id,
        title: rule.title,
        warnings,
        outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::get_platform;

    const RULE: &str = r#"
title: CloudTrail Stopped
id: cloudtrail-stopped
logsource:
    product: aws
    service: cloudtrail
detection:
    selection:
        eventName:
            - StopLogging
            - DeleteTrail
        eventSource: cloudtrail.amazonaws.com
    condition: selection
"#;

    const SEEDS: &str = r#"{
        "positive": [{"eventName": "StopLogging", "eventSource": "cloudtrail.amazonaws.com", "awsRegion": "us-east-1"}],
        "negative": [{"eventName": "StartLogging", "eventSource": "cloudtrail.amazonaws.com", "awsRegion": "us-east-1"}]
    }"#;

    fn fixture(dir: &Path, seeds: &str) -> (PathBuf, PathBuf) {
        let rule = dir.join("rule.yml");
        let seeds_path = dir.join("rule.seeds.json");
        std::fs::write(&rule, RULE).unwrap();
        std::fs::write(&seeds_path, seeds).unwrap();
        (rule, seeds_path)
    }

    fn config(samples: usize) -> SynthConfig {
        SynthConfig {
            samples,
            random_seed: Some(42),
            ..SynthConfig::default()
        }
    }

    #[test]
    fn test_generate_per_platform_layout() {
        let dir = tempfile::tempdir().unwrap();
        let (rule, seeds) = fixture(dir.path(), SEEDS);
        let out = dir.path().join("out");
        let platforms = vec![get_platform("panther").unwrap(), get_platform("splunk").unwrap()];

        let outcome =
            generate_rule(&rule, &seeds, &platforms, &out, OutputLayout::PerPlatform, &config(20))
                .unwrap();
        assert_eq!(outcome.rule_id, "cloudtrail-stopped");
        assert_eq!(outcome.test_count, 20);
        assert_eq!(outcome.positive, 10);
        assert_eq!(outcome.negative, 10);
        assert_eq!(
            outcome.outputs,
            vec![
                out.join("panther/cloudtrail-stopped/test_manifest.json"),
                out.join("splunk/cloudtrail-stopped/cloudtrail-stopped.spl"),
            ]
        );
    }

    #[test]
    fn test_generate_flat_layout() {
        let dir = tempfile::tempdir().unwrap();
        let (rule, seeds) = fixture(dir.path(), SEEDS);
        let out = dir.path().join("flat");
        let platforms = vec![get_platform("panther").unwrap()];

        generate_rule(&rule, &seeds, &platforms, &out, OutputLayout::Flat, &config(4)).unwrap();
        assert!(out.join("test_003.json").is_file());
        assert!(!out.join("test_004.json").exists());
    }

    #[test]
    fn test_empty_seeds_fail() {
        let dir = tempfile::tempdir().unwrap();
        let (rule, seeds) = fixture(dir.path(), "{}");
        let platforms = vec![get_platform("panther").unwrap()];
        let layout = OutputLayout::Flat;
        let err = generate_rule(&rule, &seeds, &platforms, dir.path(), layout, &config(10))
            .unwrap_err();
        assert!(matches!(err, CliError::NoVariants));
    }

    #[test]
    fn test_missing_seeds_file() {
        let dir = tempfile::tempdir().unwrap();
        let (rule, _) = fixture(dir.path(), SEEDS);
        let err = generate_rule(
            &rule,
            &dir.path().join("absent.json"),
            &[],
            dir.path(),
            OutputLayout::Flat,
            &config(10),
        )
        .unwrap_err();
        assert!(matches!(err, CliError::MissingSeeds(_)));
    }
}
