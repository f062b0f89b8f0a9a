//! Integration tests over the shipped `config/rules/rate-based.yaml`.

use webacl_rules::baseline::managed_rules;
use webacl_rules::preview::{evaluate, Decision, ObservedCounts, SampleRequest};
use webacl_rules::{assemble, AssembleError, RateLimit, Rule, RuleAction, RuleLoader, RuleSet, Scope, WebAclDescription};

/// Integration tests run from the crate directory, so go up two levels.
fn rules_path() -> std::path::PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../config/rules/rate-based.yaml")
}

fn shipped_rules() -> Vec<Rule> {
    RuleLoader::new(rules_path())
        .load_rules()
        .unwrap_or_else(|e| panic!("failed to load {}: {e}", rules_path().display()))
}

fn full_set() -> RuleSet {
    assemble(&managed_rules().unwrap(), &shipped_rules()).unwrap()
}

#[test]
fn shipped_rate_rules_load() {
    let rules = shipped_rules();
    let summary: Vec<(&str, u32, u64)> = rules
        .iter()
        .map(|r| (r.name(), r.priority(), r.rate_limit().unwrap().limit))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("MyEv-RateBasedRulesPublicRoutes", 100, 100),
            ("MyEv-RateBasedRulesSAPIRoutes", 200, 2000),
            ("MyEv-RateBasedRulesPublicAPIRoutes", 300, 200),
            ("MyEv-RateBasedRulesQualtricsApi", 400, 3000),
        ]
    );
    assert!(rules.iter().all(|r| r.action() == RuleAction::Block));
}

#[test]
fn full_set_is_priority_ordered_after_baseline() {
    let set = full_set();
    let priorities: Vec<u32> = set.iter().map(|r| r.priority()).collect();
    assert_eq!(priorities, vec![1, 2, 3, 4, 5, 100, 200, 300, 400]);
}

#[test]
fn description_is_deterministic() {
    let a = WebAclDescription::new("awswafwebacl-dev", Scope::Regional, &full_set())
        .to_json()
        .unwrap();
    let b = WebAclDescription::new("awswafwebacl-dev", Scope::Regional, &full_set())
        .to_json()
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn duplicate_priority_is_rejected() {
    let rule = |name: &str, priority: u32, path: &str| {
        Rule::rate_based(
            name,
            priority,
            RuleAction::Block,
            RateLimit::per_source_ip(100, Some(webacl_rules::Predicate::path_starts_with(path).unwrap())),
        )
        .unwrap()
    };
    let err = assemble(&[], &[rule("A", 100, "/a"), rule("B", 200, "/b"), rule("C", 100, "/c")])
        .unwrap_err();
    assert_eq!(
        err,
        AssembleError::DuplicatePriority {
            priority: 100,
            first: "A".into(),
            second: "C".into(),
        }
    );
}

#[test]
fn home_is_not_counted_by_login_rule() {
    let set = full_set();
    let observed = ObservedCounts::uniform(&set, 1_000_000);
    let verdict = evaluate(&set, &SampleRequest::get("/home"), &observed).unwrap();
    assert!(verdict.rate_scoped.is_empty());
    assert_eq!(verdict.decision, Decision::Allow);
}

#[test]
fn login_over_limit_is_blocked() {
    let set = full_set();
    let observed = ObservedCounts::new().with("MyEv-RateBasedRulesPublicRoutes", 101);
    let verdict = evaluate(&set, &SampleRequest::get("/login"), &observed).unwrap();
    assert_eq!(verdict.decision, Decision::Block);
    assert_eq!(verdict.terminating_rule.as_deref(), Some("MyEv-RateBasedRulesPublicRoutes"));
}

#[test]
fn qualtrics_is_carved_out_of_public_api() {
    let set = full_set();
    let verdict = evaluate(
        &set,
        &SampleRequest::get("/api/qualtrics/survey"),
        &ObservedCounts::new(),
    )
    .unwrap();
    assert_eq!(verdict.rate_scoped, vec!["MyEv-RateBasedRulesQualtricsApi"]);

    let verdict = evaluate(&set, &SampleRequest::get("/api/dogs"), &ObservedCounts::new()).unwrap();
    assert_eq!(verdict.rate_scoped, vec!["MyEv-RateBasedRulesPublicAPIRoutes"]);
}

#[test]
fn qualtrics_tolerates_public_api_limit() {
    let set = full_set();
    let observed = ObservedCounts::uniform(&set, 500);
    let verdict = evaluate(&set, &SampleRequest::get("/api/qualtrics/x"), &observed).unwrap();
    assert_eq!(verdict.decision, Decision::Allow);
    let verdict = evaluate(&set, &SampleRequest::get("/api/x"), &observed).unwrap();
    assert_eq!(verdict.decision, Decision::Block);
}

#[test]
fn managed_groups_precede_custom_rules_in_description() {
    let desc = WebAclDescription::new("awswafwebacl-dev", Scope::Regional, &full_set());
    let value = serde_json::to_value(&desc).unwrap();
    let rules = value["Rules"].as_array().unwrap();
    assert_eq!(rules.len(), 9);
    assert!(rules[0]["Statement"]["ManagedRuleGroupStatement"].is_object());
    assert_eq!(rules[0]["OverrideAction"], serde_json::json!({ "None": {} }));
    assert_eq!(
        rules[8]["Statement"]["RateBasedStatement"]["ScopeDownStatement"]["ByteMatchStatement"]
            ["SearchString"],
        "/api/qualtrics"
    );
    assert_eq!(value["DefaultAction"], serde_json::json!({ "Allow": {} }));
}

#[test]
fn shipped_rules_keep_deployed_names_and_metrics() {
    let desc = WebAclDescription::new("awswafwebacl-dev", Scope::Regional, &full_set());
    let value = serde_json::to_value(&desc).unwrap();
    let custom: Vec<(String, String)> = value["Rules"].as_array().unwrap()[5..]
        .iter()
        .map(|r| {
            (
                r["Name"].as_str().unwrap().to_string(),
                r["VisibilityConfig"]["MetricName"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    let expected: Vec<(String, String)> = [
        "RateBasedRulesPublicRoutes",
        "RateBasedRulesSAPIRoutes",
        "RateBasedRulesPublicAPIRoutes",
        "RateBasedRulesQualtricsApi",
    ]
    .iter()
    .map(|metric| (format!("MyEv-{metric}"), metric.to_string()))
    .collect();
    assert_eq!(custom, expected);
}
