mod batch;
mod config;
mod error;
mod generate;
mod platform;
mod review;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde_json::Value;
use sigtest_eval::{CompiledCriteria, RuleDocument, evaluate, parse_rule_file};

use crate::config::{SynthConfig, load_config};
use crate::generate::{OutputLayout, generate_rule};
use crate::platform::{Platform, get_platform, list_platforms};

#[derive(Parser)]
#[command(name = "sigtest")]
#[command(about = "Generate labeled test logs for Sigma detection rules")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to sigtest.yaml and friends)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a test suite for one rule from its seed file
    Generate {
        /// Path to a Sigma rule
        #[arg(short, long)]
        rule: PathBuf,

        /// Seed file with `positive` and `negative` records
        #[arg(short, long)]
        seeds: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Target platform
        #[arg(short, long, default_value = "panther")]
        platform: String,

        /// Number of variants to generate
        #[arg(long)]
        samples: Option<usize>,

        /// Seeds kept per label
        #[arg(long)]
        seed_samples: Option<usize>,

        /// Seed for reproducible output
        #[arg(long)]
        random_seed: Option<u64>,
    },

    /// Generate test suites for every rule under a directory
    ///
    /// Each rule `<name>.yml` needs a `<name>.seeds.json` next to it. Output
    /// goes to `<output>/<platform>/<rule id>/`.
    Batch {
        /// Directory to search for rules
        #[arg(long)]
        rules_dir: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Target platform(s) (can be specified multiple times)
        #[arg(short, long = "platform")]
        platforms: Vec<String>,

        /// Include pattern(s), relative to the rules directory
        #[arg(long = "pattern")]
        patterns: Vec<String>,

        /// Exclude pattern(s), relative to the rules directory
        #[arg(long = "exclude")]
        excludes: Vec<String>,

        /// Number of worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Stop starting new rules after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Number of variants to generate per rule
        #[arg(long)]
        samples: Option<usize>,

        /// Seed for reproducible output
        #[arg(long)]
        random_seed: Option<u64>,
    },

    /// Evaluate events against a rule and print `true` or `false` per event
    ///
    /// Events can be provided as a single JSON string (--event) or as
    /// NDJSON (newline-delimited JSON) from stdin.
    Check {
        /// Path to a Sigma rule
        #[arg(short, long)]
        rule: PathBuf,

        /// A single event as a JSON string (if omitted, reads NDJSON from stdin)
        #[arg(short, long)]
        event: Option<String>,
    },

    /// Print the compiled criteria tree and critical fields of a rule
    Criteria {
        /// Path to a Sigma rule
        #[arg(short, long)]
        rule: PathBuf,
    },

    /// Summarize a generated Panther suite by label
    Review {
        /// Directory containing `test_*.json` files
        #[arg(short, long)]
        input: PathBuf,

        /// Print up to N sample cases per label
        #[arg(long, default_value_t = 0)]
        show: usize,
    },

    /// List the supported output platforms
    Platforms,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            rule,
            seeds,
            output,
            platform,
            samples,
            seed_samples,
            random_seed,
        } => {
            let mut config = load_config_or_exit(cli.config.as_deref());
            override_opt(&mut config.samples, samples);
            override_opt(&mut config.seed_samples, seed_samples);
            if random_seed.is_some() {
                config.random_seed = random_seed;
            }
            cmd_generate(&rule, &seeds, &output, &platform, &config);
        }
        Commands::Batch {
            rules_dir,
            output,
            platforms,
            patterns,
            excludes,
            workers,
            fail_fast,
            samples,
            random_seed,
        } => {
            let mut config = load_config_or_exit(cli.config.as_deref());
            if !patterns.is_empty() {
                config.batch.input_patterns = patterns;
            }
            if !excludes.is_empty() {
                config.batch.exclude_patterns = excludes;
            }
            override_opt(&mut config.batch.parallel_workers, workers);
            override_opt(&mut config.samples, samples);
            config.batch.fail_fast |= fail_fast;
            if random_seed.is_some() {
                config.random_seed = random_seed;
            }
            cmd_batch(&rules_dir, &output, &platforms, &config);
        }
        Commands::Check { rule, event } => cmd_check(&rule, event),
        Commands::Criteria { rule } => cmd_criteria(&rule),
        Commands::Review { input, show } => cmd_review(&input, show),
        Commands::Platforms => {
            for name in list_platforms() {
                println!("{name}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_generate(rule: &Path, seeds: &Path, output: &Path, platform: &str, config: &SynthConfig) {
    let platforms = load_platforms(&[platform.to_string()]);

    match generate_rule(rule, seeds, &platforms, output, OutputLayout::Flat, config) {
        Ok(outcome) => {
            for w in &outcome.warnings {
                eprintln!("warning: {w}");
            }
            println!(
                "Generated {} tests for {} [{}] ({} positive, {} negative)",
                outcome.test_count,
                outcome.title,
                outcome.rule_id,
                outcome.positive,
                outcome.negative
            );
            for path in &outcome.outputs {
                println!("  {}", path.display());
            }
        }
        Err(e) => {
            eprintln!("Error generating tests for {}: {e}", rule.display());
            process::exit(1);
        }
    }
}

fn cmd_batch(rules_dir: &Path, output: &Path, platform_names: &[String], config: &SynthConfig) {
    let names = if platform_names.is_empty() {
        vec!["panther".to_string()]
    } else {
        platform_names.to_vec()
    };
    let platforms = load_platforms(&names);

    let files = match batch::find_rule_files(
        rules_dir,
        &config.batch.input_patterns,
        &config.batch.exclude_patterns,
    ) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error scanning {}: {e}", rules_dir.display());
            process::exit(1);
        }
    };
    if files.is_empty() {
        eprintln!("No rule files found in {}", rules_dir.display());
        process::exit(1);
    }

    println!(
        "Processing {} rules for platforms: {}",
        files.len(),
        names.join(", ")
    );

    let summary = match batch::run_batch(&files, &platforms, output, config) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    for result in &summary.results {
        log::debug!("{} took {:.2?}", result.rule_path.display(), result.elapsed);
    }

    println!("\nBatch Processing Summary");
    println!("  Total rules:           {}", summary.total_rules);
    println!("  Successful:            {}", summary.successful());
    println!("  Failed:                {}", summary.failed());
    if summary.skipped() > 0 {
        println!("  Skipped:               {}", summary.skipped());
    }
    println!("  Total tests generated: {}", summary.total_tests());
    println!("  Total warnings:        {}", summary.total_warnings());
    println!("  Processing time:       {:.2}s", summary.elapsed.as_secs_f64());

    if summary.failed() > 0 {
        println!("\nFailed rules:");
        for result in &summary.results {
            if let Err(e) = &result.outcome {
                println!("  - {}: {e}", result.rule_path.display());
            }
        }
    }

    if summary.failed() > 0 || summary.skipped() > 0 {
        process::exit(1);
    }
}

fn cmd_check(rule_path: &Path, event_json: Option<String>) {
    let (_, compiled) = load_rule(rule_path);

    if let Some(json_str) = event_json {
        let value: Value = match serde_json::from_str(&json_str) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Invalid JSON event: {e}");
                process::exit(1);
            }
        };
        match value.as_object() {
            Some(record) => println!("{}", evaluate(&compiled.criteria, record)),
            None => {
                eprintln!("Event must be a JSON object");
                process::exit(1);
            }
        }
        return;
    }

    let stdin = io::stdin();
    let mut line_num = 0u64;
    let mut match_count = 0u64;

    for line in stdin.lock().lines() {
        line_num += 1;
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading line {line_num}: {e}");
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Invalid JSON on line {line_num}: {e}");
                continue;
            }
        };
        let Some(record) = value.as_object() else {
            eprintln!("Line {line_num} is not a JSON object");
            continue;
        };

        let matched = evaluate(&compiled.criteria, record);
        if matched {
            match_count += 1;
        }
        println!("{matched}");
    }

    eprintln!("Processed {line_num} events, {match_count} matches.");
}

fn cmd_criteria(rule_path: &Path) {
    let (rule, compiled) = load_rule(rule_path);

    println!("{} ({})", rule.title, rule.id);
    println!("criteria: {}", compiled.criteria);

    let critical = compiled.critical_fields();
    let names: Vec<&str> = critical.iter().collect();
    println!("critical fields: {}", names.join(", "));

    for w in &compiled.warnings {
        println!("warning: {w}");
    }
}

fn cmd_review(dir: &Path, show: usize) {
    if !dir.is_dir() {
        eprintln!("Input directory does not exist: {}", dir.display());
        process::exit(1);
    }
    let files = match review::find_case_files(dir) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error scanning {}: {e}", dir.display());
            process::exit(1);
        }
    };
    if files.is_empty() {
        eprintln!("warning: no test_*.json files found in {}", dir.display());
        return;
    }

    let summary = review::review_files(&files);

    println!("Test Case Review");
    println!("  Total:              {}", summary.total());
    println!("  Should Trigger:     {}", summary.trigger.len());
    println!("  Should NOT Trigger: {}", summary.non_trigger.len());
    if !summary.errors.is_empty() {
        println!("  Errors:             {}", summary.errors.len());
    }

    if show > 0 {
        print_samples("Should Trigger", &summary.trigger, show);
        print_samples("Should NOT Trigger", &summary.non_trigger, show);
    }

    if !summary.errors.is_empty() {
        println!("\nFiles with errors:");
        for (path, e) in &summary.errors {
            println!("  {}: {e}", file_label(path));
        }
    }
}

fn print_samples(label: &str, cases: &[(PathBuf, Value)], show: usize) {
    println!("\n{label} (showing up to {show}):");
    for (path, case) in cases.iter().take(show) {
        println!("{}", file_label(path));
        match serde_json::to_string_pretty(case) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Error formatting {}: {e}", path.display()),
        }
    }
}

fn file_label(path: &Path) -> std::borrow::Cow<'_, str> {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config_or_exit(path: Option<&Path>) -> SynthConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn load_platforms(names: &[String]) -> Vec<Box<dyn Platform>> {
    let mut platforms = Vec::with_capacity(names.len());
    for name in names {
        match get_platform(name) {
            Ok(p) => platforms.push(p),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
    platforms
}

fn load_rule(path: &Path) -> (RuleDocument, CompiledCriteria) {
    let rule = match parse_rule_file(path) {
        Ok(rule) => rule,
        Err(e) => {
            eprintln!("Error parsing {}: {e}", path.display());
            process::exit(1);
        }
    };
    match rule.detection_criteria() {
        Ok(compiled) => {
            for w in &compiled.warnings {
                log::warn!("{}: {w}", rule.id);
            }
            (rule, compiled)
        }
        Err(e) => {
            eprintln!("Error compiling {}: {e}", path.display());
            process::exit(1);
        }
    }
}

fn override_opt<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}
