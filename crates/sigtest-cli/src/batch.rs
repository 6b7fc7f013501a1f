//! Batch mode: discover rules under a directory and generate suites for all
//! of them on a bounded worker pool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::config::SynthConfig;
use crate::error::Result;
use crate::generate::{OutputLayout, RuleOutcome, generate_rule};
use crate::platform::Platform;

/// Result of processing a single rule.
#[derive(Debug)]
pub struct BatchResult {
    pub rule_path: PathBuf,
    pub outcome: std::result::Result<RuleOutcome, String>,
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug)]
pub struct BatchSummary {
    pub total_rules: usize,
    pub results: Vec<BatchResult>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }

    /// Rules never started because fail-fast tripped.
    pub fn skipped(&self) -> usize {
        self.total_rules - self.results.len()
    }

    pub fn total_tests(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .map(|o| o.test_count)
            .sum()
    }

    pub fn total_warnings(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .map(|o| o.warnings.len())
            .sum()
    }
}

/// Seed fixture expected next to a rule: `<stem>.seeds.json`.
pub fn seeds_path_for(rule: &Path) -> PathBuf {
    let stem = rule
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    rule.with_file_name(format!("{stem}.seeds.json"))
}

/// Files under `dir` whose `/`-separated relative path matches any include
/// pattern and no exclude pattern, sorted.
pub fn find_rule_files(dir: &Path, include: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else if let Ok(rel) = path.strip_prefix(root) {
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((rel, path));
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(dir, dir, &mut files)?;

    let mut matched: Vec<PathBuf> = files
        .into_iter()
        .filter(|(rel, _)| include.iter().any(|p| glob_match::glob_match(p, rel)))
        .filter(|(rel, _)| !exclude.iter().any(|p| glob_match::glob_match(p, rel)))
        .map(|(_, path)| path)
        .collect();
    matched.sort();
    Ok(matched)
}

/// Process every rule on a pool of `config.batch.parallel_workers` threads.
///
/// With `fail_fast`, the first failure stops rules that have not started yet;
/// rules already running finish normally.
pub fn run_batch(
    rule_files: &[PathBuf],
    platforms: &[Box<dyn Platform>],
    output: &Path,
    config: &SynthConfig,
) -> Result<BatchSummary> {
    let start = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.batch.parallel_workers.max(1))
        .build()?;
    let stop = AtomicBool::new(false);

    let results: Vec<BatchResult> = pool.install(|| {
        rule_files
            .par_iter()
            .filter_map(|rule_path| {
                if stop.load(Ordering::Relaxed) {
                    log::debug!("skipping {}", rule_path.display());
                    return None;
                }
                let result = process_rule(rule_path, platforms, output, config);
                if !result.succeeded() && config.batch.fail_fast {
                    log::warn!("failing fast after {}", rule_path.display());
                    stop.store(true, Ordering::Relaxed);
                }
                Some(result)
            })
            .collect()
    });

    Ok(BatchSummary {
        total_rules: rule_files.len(),
        results,
        elapsed: start.elapsed(),
    })
}

fn process_rule(
    rule_path: &Path,
    platforms: &[Box<dyn Platform>],
    output: &Path,
    config: &SynthConfig,
) -> BatchResult {
    let start = Instant::now();
    let seeds = seeds_path_for(rule_path);
    let outcome = generate_rule(
        rule_path,
        &seeds,
        platforms,
        output,
        OutputLayout::PerPlatform,
        config,
    )
    .map_err(|e| e.to_string());

    match &outcome {
        Ok(o) => log::info!("{}: {} tests", o.rule_id, o.test_count),
        Err(e) => log::error!("{}: {e}", rule_path.display()),
    }

    BatchResult {
        rule_path: rule_path.to_path_buf(),
        outcome,
        elapsed: start.elapsed(),
    }
}
