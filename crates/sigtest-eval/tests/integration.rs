mod helpers;

use helpers::{compile, compile_rule, eval};
use serde_json::json;

// =============================================================================
// CloudTrail-shaped criteria documents
// =============================================================================

#[test]
fn test_console_login_without_mfa() {
    let c = compile(json!({
        "eventName": "ConsoleLogin",
        "additionalEventData.MFAUsed": "No",
        "responseElements.ConsoleLogin": "Success"
    }));
    assert!(c.warnings.is_empty());

    let hit = json!({
        "eventName": "ConsoleLogin",
        "additionalEventData": {"MFAUsed": "No"},
        "responseElements": {"ConsoleLogin": "Success"},
        "sourceIPAddress": "203.0.113.7"
    });
    assert!(eval(&c, hit));

    let with_mfa = json!({
        "eventName": "ConsoleLogin",
        "additionalEventData": {"MFAUsed": "Yes"},
        "responseElements": {"ConsoleLogin": "Success"}
    });
    assert!(!eval(&c, with_mfa));

    let missing = json!({"eventName": "ConsoleLogin"});
    assert!(!eval(&c, missing));
}

#[test]
fn test_flat_key_wins_over_nested_path() {
    let c = compile(json!({"userIdentity.type": "Root"}));
    assert!(eval(&c, json!({"userIdentity.type": "Root", "userIdentity": {"type": "IAMUser"}})));
    assert!(!eval(&c, json!({"userIdentity.type": "IAMUser", "userIdentity": {"type": "Root"}})));
}

#[test]
fn test_path_through_array() {
    let c = compile(json!({"resources.ARN": {"startswith": "arn:aws:s3"}}));
    assert!(eval(
        &c,
        json!({"resources": [{"type": "AWS::S3::Bucket"}, {"ARN": "arn:aws:s3:::logs"}]})
    ));
}

#[test]
fn test_trail_tampering_with_exclusion() {
    let c = compile(json!({
        "and": [
            {"eventSource": "cloudtrail.amazonaws.com"},
            {"or": [
                {"eventName": ["StopLogging", "DeleteTrail"]},
                {"eventName": {"contains": "update"}}
            ]},
            {"not": {"userIdentity.arn": {"endswith": ":role/automation"}}}
        ]
    }));
    assert!(c.warnings.is_empty());

    let base = |name: &str, arn: &str| {
        json!({
            "eventSource": "cloudtrail.amazonaws.com",
            "eventName": name,
            "userIdentity": {"arn": arn}
        })
    };
    assert!(eval(&c, base("stoplogging", "arn:aws:iam::1:user/alice")));
    assert!(eval(&c, base("UpdateTrail", "arn:aws:iam::1:user/alice")));
    assert!(!eval(&c, base("StopLogging", "arn:aws:iam::1:role/automation")));
    assert!(!eval(&c, base("CreateTrail", "arn:aws:iam::1:user/alice")));
}

#[test]
fn test_numeric_thresholds() {
    let c = compile(json!({"requestParameters.maxResults": {"gte": 100, "lt": 1000}}));
    assert!(eval(&c, json!({"requestParameters": {"maxResults": 100}})));
    assert!(eval(&c, json!({"requestParameters": {"maxResults": 999.5}})));
    assert!(!eval(&c, json!({"requestParameters": {"maxResults": 1000}})));
    assert!(!eval(&c, json!({"requestParameters": {"maxResults": "500"}})));
}

#[test]
fn test_regex_suffix_uses_base_field() {
    let c = compile(json!({"eventName|re": "^(Put|Delete)Bucket(Policy|Acl)$"}));
    assert_eq!(c.critical_fields().iter().collect::<Vec<_>>(), vec!["eventName"]);
    assert!(eval(&c, json!({"eventName": "PutBucketPolicy"})));
    assert!(!eval(&c, json!({"eventName": "putbucketpolicy"})));
    assert!(!eval(&c, json!({"eventName|re": "PutBucketPolicy"})));
}

#[test]
fn test_bad_regex_never_matches() {
    let c = compile(json!({"eventName|re": "([unclosed", "eventSource": "s3.amazonaws.com"}));
    assert_eq!(c.warnings.len(), 1);
    assert!(!eval(&c, json!({"eventName": "([unclosed", "eventSource": "s3.amazonaws.com"})));
}

#[test]
fn test_empty_criteria_match_everything() {
    let c = compile(json!({}));
    assert!(c.criteria.is_empty());
    assert!(eval(&c, json!({})));
    assert!(eval(&c, json!({"anything": 1})));
}

#[test]
fn test_nested_operator_fallback_checks_whole_record() {
    let c = compile(json!({
        "eventName": {"where": {"sourceIPAddress": "203.0.113.7"}}
    }));
    assert!(c.warnings.is_empty());
    assert!(eval(&c, json!({"eventName": "GetObject", "sourceIPAddress": "203.0.113.7"})));
    assert!(!eval(&c, json!({"eventName": "GetObject", "sourceIPAddress": "198.51.100.1"})));
    assert!(!eval(&c, json!({"sourceIPAddress": "203.0.113.7"})));
}

// =============================================================================
// Sigma rules end to end
// =============================================================================

const IAM_RULE: &str = r#"
title: IAM Privilege Escalation
id: 0f2f7c8e-iam-escalation
status: experimental
logsource:
    product: aws
    service: cloudtrail
detection:
    selection_source:
        eventSource: iam.amazonaws.com
    selection_attach:
        eventName|startswith:
            - Attach
            - Put
    selection_admin:
        requestParameters.policyArn|endswith: AdministratorAccess
    filter_service:
        userIdentity.type: AWSService
    condition: all of selection_* and not 1 of filter_*
level: high
"#;

#[test]
fn test_rule_all_of_selections() {
    let c = compile_rule(IAM_RULE);
    assert!(c.warnings.is_empty());

    let hit = json!({
        "eventSource": "iam.amazonaws.com",
        "eventName": "AttachUserPolicy",
        "requestParameters": {"policyArn": "arn:aws:iam::aws:policy/AdministratorAccess"},
        "userIdentity": {"type": "IAMUser"}
    });
    assert!(eval(&c, hit));

    let by_service = json!({
        "eventSource": "iam.amazonaws.com",
        "eventName": "AttachUserPolicy",
        "requestParameters": {"policyArn": "arn:aws:iam::aws:policy/AdministratorAccess"},
        "userIdentity": {"type": "AWSService"}
    });
    assert!(!eval(&c, by_service));

    let readonly = json!({
        "eventSource": "iam.amazonaws.com",
        "eventName": "AttachUserPolicy",
        "requestParameters": {"policyArn": "arn:aws:iam::aws:policy/ReadOnlyAccess"},
        "userIdentity": {"type": "IAMUser"}
    });
    assert!(!eval(&c, readonly));
}

#[test]
fn test_rule_condition_list_is_or() {
    let c = compile_rule(
        r#"
title: Two conditions
id: two-conditions
detection:
    login:
        eventName: ConsoleLogin
    root:
        userIdentity.type: Root
    condition:
        - login
        - root
"#,
    );
    assert!(eval(&c, json!({"eventName": "ConsoleLogin"})));
    assert!(eval(&c, json!({"userIdentity": {"type": "Root"}})));
    assert!(!eval(&c, json!({"eventName": "GetObject"})));
}

#[test]
fn test_rule_all_modifier() {
    let c = compile_rule(
        r#"
title: All Contains
id: all-contains
detection:
    selection:
        CommandLine|contains|all:
            - net
            - user
            - /add
    condition: selection
"#,
    );
    assert!(eval(&c, json!({"CommandLine": "NET USER bob pw /add"})));
    assert!(!eval(&c, json!({"CommandLine": "net user bob"})));
}

#[test]
fn test_rule_unknown_modifier_warns() {
    let c = compile_rule(
        r#"
title: Base64
id: b64
detection:
    selection:
        CommandLine|base64offset|contains: whoami
    condition: selection
"#,
    );
    assert_eq!(c.warnings.len(), 1);
    assert!(!eval(&c, json!({"CommandLine": "whoami"})));
}
