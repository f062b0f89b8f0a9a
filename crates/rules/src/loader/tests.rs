//! Tests for the rule loader module.

use std::fs;

use tempfile::TempDir;

use super::*;
use crate::error::RuleError;
use crate::rule::{AggregateKey, RuleAction, RuleStatement};

const LOGIN_RULE_YAML: &str = r#"
rules:
  - name: LoginRateLimit
    priority: 100
    action: block
    statement:
      rate_based:
        limit: 100
        aggregate_key: source_ip
        scope_down:
          byte_match:
            field: uri_path
            search_string: /login
            positional_constraint: starts_with
"#;

const HEADER_RULE_YAML: &str = r#"
rules:
  - name: BlockBadBot
    priority: 50
    action: block
    statement:
      match:
        regex_match:
          field:
            single_header:
              name: user-agent
          patterns: ["sqlmap", "nikto"]
          text_transformations:
            - priority: 0
              type: lowercase
    visibility:
      metric_name: BadBots
      sampled_requests_enabled: false
"#;

fn temp_dir() -> TempDir {
    TempDir::new().expect("create tempdir")
}

#[test]
fn parse_rate_based_rule() {
    let rules = parse_rules(LOGIN_RULE_YAML).unwrap();
    assert_eq!(rules.len(), 1);
    let rule = &rules[0];
    assert_eq!(rule.name(), "LoginRateLimit");
    assert_eq!(rule.action(), RuleAction::Block);
    let rate = rule.rate_limit().unwrap();
    assert_eq!(rate.limit, 100);
    assert_eq!(rate.aggregate_key, AggregateKey::SourceIp);
    assert!(rate.scope_down.is_some());
}

#[test]
fn parse_header_regex_rule_with_visibility() {
    let rules = parse_rules(HEADER_RULE_YAML).unwrap();
    let rule = &rules[0];
    assert!(matches!(rule.statement(), RuleStatement::Match(_)));
    assert_eq!(rule.visibility().metric_name, "BadBots");
    assert!(!rule.visibility().sampled_requests_enabled);
    assert!(rule.visibility().metrics_enabled);
}

#[test]
fn invalid_rule_reports_index_and_name() {
    let yaml = r#"
rules:
  - name: Ok
    priority: 1
    action: count
    statement:
      match:
        byte_match: { field: uri_path, search_string: /a, positional_constraint: exactly }
  - name: Broken
    priority: 2
    action: block
    statement:
      rate_based: { limit: 0, aggregate_key: source_ip }
"#;
    match parse_rules(yaml).unwrap_err() {
        RuleFileError::Invalid { index, name, source } => {
            assert_eq!(index, 1);
            assert_eq!(name, "Broken");
            assert!(matches!(source, RuleError::InvalidRule { .. }));
        }
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[test]
fn unknown_fields_are_rejected() {
    let yaml = r#"
rules:
  - name: Typo
    priority: 1
    acton: block
    statement:
      rate_based: { limit: 10, aggregate_key: source_ip }
"#;
    assert!(matches!(parse_rules(yaml).unwrap_err(), RuleFileError::Parse(_)));
}

#[test]
fn load_rules_from_directory_in_sorted_order() {
    let dir = temp_dir();
    fs::write(dir.path().join("b-login.yml"), LOGIN_RULE_YAML).unwrap();
    fs::write(dir.path().join("a-bots.yaml"), HEADER_RULE_YAML).unwrap();
    fs::write(dir.path().join(".hidden.yml"), "not: [valid").unwrap();
    fs::write(dir.path().join("readme.txt"), "not a rule").unwrap();

    let loader = RuleLoader::new(dir.path());
    let rules = loader.load_rules().unwrap();
    let names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["BlockBadBot", "LoginRateLimit"]);
}

#[test]
fn load_rules_from_single_file() {
    let dir = temp_dir();
    let path = dir.path().join("login.yml");
    fs::write(&path, LOGIN_RULE_YAML).unwrap();

    let rules = RuleLoader::new(&path).load_rules().unwrap();
    assert_eq!(rules.len(), 1);
}

#[test]
fn load_rules_recurses_into_subdirectories() {
    let dir = temp_dir();
    let nested = dir.path().join("edge");
    fs::create_dir(&nested).unwrap();
    fs::write(nested.join("login.yml"), LOGIN_RULE_YAML).unwrap();

    let rules = RuleLoader::new(dir.path()).load_rules().unwrap();
    assert_eq!(rules[0].name(), "LoginRateLimit");
}

#[test]
fn load_rules_fails_fast_on_bad_file() {
    let dir = temp_dir();
    fs::write(dir.path().join("a.yml"), LOGIN_RULE_YAML).unwrap();
    fs::write(dir.path().join("b.yml"), "rules: [").unwrap();

    let err = RuleLoader::new(dir.path()).load_rules().unwrap_err();
    match err {
        LoadError::File { path, .. } => assert!(path.ends_with("b.yml")),
        other => panic!("expected File error, got {other:?}"),
    }
}

#[test]
fn load_all_reports_every_file() {
    let dir = temp_dir();
    fs::write(dir.path().join("good.yml"), LOGIN_RULE_YAML).unwrap();
    fs::write(dir.path().join("bad.yml"), "rules: [").unwrap();
    fs::write(dir.path().join(".hidden.yml"), LOGIN_RULE_YAML).unwrap();
    fs::write(dir.path().join("notes.md"), "# notes").unwrap();

    let results = RuleLoader::new(dir.path()).load_all().unwrap();
    assert_eq!(results.len(), 4);

    let loaded = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
        .count();
    let failed = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Failed { .. }))
        .count();
    let skipped = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
        .count();
    assert_eq!((loaded, failed, skipped), (1, 1, 2));
}

#[test]
fn missing_path_is_io_error() {
    let dir = temp_dir();
    let err = RuleLoader::new(dir.path().join("nope")).load_rules().unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn empty_file_yields_no_rules() {
    let rules = parse_rules("rules: []").unwrap();
    assert!(rules.is_empty());
}
