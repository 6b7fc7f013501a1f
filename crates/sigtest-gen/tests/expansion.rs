use serde_json::{Value, json};
use sigtest_eval::{CompiledCriteria, Record, compile_criteria, evaluate, parse_rule_yaml};
use sigtest_gen::{ExpansionStatus, SeedSet, Variant, VariantExpander};

fn record(v: Value) -> Record {
    match v {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn cloudtrail() -> CompiledCriteria {
    compile_criteria(&json!({
        "eventName": ["CreateTrail", "DeleteTrail"],
        "eventSource": "cloudtrail.amazonaws.com"
    }))
    .unwrap()
}

fn cloudtrail_seeds() -> SeedSet {
    SeedSet::from_json_str(
        r#"{
            "positive": [{
                "eventName": "CreateTrail",
                "eventSource": "cloudtrail.amazonaws.com",
                "awsRegion": "us-east-1",
                "errorMessage": "none",
                "userAgent": "aws-cli/2.15.0"
            }],
            "negative": [{
                "eventName": "DescribeTrails",
                "eventSource": "cloudtrail.amazonaws.com",
                "awsRegion": "eu-west-1",
                "errorMessage": "request failed",
                "userAgent": "console.amazonaws.com"
            }]
        }"#,
    )
    .unwrap()
}

fn run(compiled: &CompiledCriteria, seeds: &SeedSet, n: usize, seed: u64) -> Vec<Variant> {
    VariantExpander::with_seed(seed)
        .expand(
            &compiled.criteria,
            &compiled.critical_fields(),
            &seeds.positive,
            &seeds.negative,
            n,
        )
        .variants
}

#[test]
fn test_one_and_one_seed_gives_exact_count_with_both_labels() {
    let compiled = cloudtrail();
    let out = VariantExpander::with_seed(42).expand(
        &compiled.criteria,
        &compiled.critical_fields(),
        &cloudtrail_seeds().positive,
        &cloudtrail_seeds().negative,
        10,
    );
    assert_eq!(out.status, ExpansionStatus::Complete);
    assert_eq!(out.variants.len(), 10);
    assert_eq!(out.positives(), 5);
    assert_eq!(out.negatives(), 5);
}

#[test]
fn test_every_variant_matches_its_label() {
    let compiled = cloudtrail();
    for seed in 0..20 {
        for v in run(&compiled, &cloudtrail_seeds(), 50, seed) {
            assert_eq!(evaluate(&compiled.criteria, &v.record), v.should_trigger);
        }
    }
}

#[test]
fn test_same_seed_same_output() {
    let compiled = cloudtrail();
    let a = run(&compiled, &cloudtrail_seeds(), 100, 1234);
    let b = run(&compiled, &cloudtrail_seeds(), 100, 1234);
    assert_eq!(a, b);
}

#[test]
fn test_ratio_follows_seeds() {
    let compiled = cloudtrail();
    let mut seeds = cloudtrail_seeds();
    let positive = seeds.positive[0].clone();
    seeds.positive.push(positive.clone());
    seeds.positive.push(positive);

    let out = run(&compiled, &seeds, 400, 7);
    assert_eq!(out.len(), 400);
    let positives = out.iter().filter(|v| v.should_trigger).count();
    assert_eq!(positives, 300);
}

#[test]
fn test_output_never_exceeds_target() {
    let compiled = cloudtrail();
    for n in [0, 1, 3, 7, 33] {
        assert!(run(&compiled, &cloudtrail_seeds(), n, 3).len() <= n);
    }
}

#[test]
fn test_critical_fields_preserved_in_positives() {
    let compiled = cloudtrail();
    for v in run(&compiled, &cloudtrail_seeds(), 200, 99) {
        if v.should_trigger {
            assert_eq!(v.record["eventName"], "CreateTrail");
            assert_eq!(v.record["eventSource"], "cloudtrail.amazonaws.com");
        }
    }
}

#[test]
fn test_non_critical_fields_are_perturbed() {
    let compiled = cloudtrail();
    let out = run(&compiled, &cloudtrail_seeds(), 200, 5);
    let distinct_agents: std::collections::BTreeSet<&str> = out
        .iter()
        .filter_map(|v| v.record["userAgent"].as_str())
        .collect();
    assert!(distinct_agents.len() > 2);
}

#[test]
fn test_positive_only_seeds() {
    let compiled = cloudtrail();
    let seeds = SeedSet {
        positive: vec![record(json!({
            "eventName": "DeleteTrail",
            "eventSource": "cloudtrail.amazonaws.com"
        }))],
        negative: Vec::new(),
    };
    let out = run(&compiled, &seeds, 25, 0);
    assert_eq!(out.len(), 25);
    assert!(out.iter().all(|v| v.should_trigger));
}

#[test]
fn test_rule_with_filter_expands() {
    let rule = parse_rule_yaml(
        r#"
title: Root Console Login
id: root-console-login
detection:
    selection:
        eventName: ConsoleLogin
        userIdentity.type: Root
    filter:
        sourceIPAddress|startswith: "10."
    condition: selection and not filter
"#,
    )
    .unwrap();
    let compiled = rule.detection_criteria().unwrap();
    let seeds = SeedSet::from_json_str(
        r#"{
            "positive": [{"eventName": "ConsoleLogin", "userIdentity": {"type": "Root"}, "sourceIPAddress": "203.0.113.9"}],
            "negative": [{"eventName": "ConsoleLogin", "userIdentity": {"type": "IAMUser"}, "sourceIPAddress": "10.0.0.4"}]
        }"#,
    )
    .unwrap();

    let out = run(&compiled, &seeds, 40, 21);
    assert!(!out.is_empty());
    for v in &out {
        assert_eq!(evaluate(&compiled.criteria, &v.record), v.should_trigger);
    }
    assert!(out.iter().any(|v| v.should_trigger));
    assert!(out.iter().any(|v| !v.should_trigger));
}
