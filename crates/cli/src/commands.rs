//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::info;

use webacl_core::{Config, ViolationEvent};
use webacl_remediation::{AssociationController, BindingResult, Wafv2ControlApi};
use webacl_rules::baseline::managed_rules;
use webacl_rules::loader::LoadStatus;
use webacl_rules::preview::{evaluate, ObservedCounts, SampleRequest, Verdict};
use webacl_rules::{assemble, DefaultAction, RuleLoader, RuleSet, Scope, WebAclDescription};

/// Baseline managed groups plus every custom rule under `path`.
pub fn load_rule_set(path: &Path, default_action: DefaultAction) -> Result<RuleSet> {
    let managed = managed_rules().context("baseline managed groups are invalid")?;
    let custom = RuleLoader::new(path)
        .load_rules()
        .with_context(|| format!("failed to load rules from {}", path.display()))?;
    let set = assemble(&managed, &custom)?.with_default_action(default_action);
    info!(rules = set.len(), path = %path.display(), "Rule set assembled");
    Ok(set)
}

pub fn render(set: &RuleSet, name: &str, scope: Scope, compact: bool) -> Result<String> {
    let description = WebAclDescription::new(name, scope, set);
    let json = if compact {
        description.to_json()?
    } else {
        description.to_json_pretty()?
    };
    Ok(json)
}

/// Report per-file load status; fails when any file or the assembled set is invalid.
pub fn check(path: &Path) -> Result<Vec<String>> {
    let results = RuleLoader::new(path).load_all()?;
    let mut lines = Vec::with_capacity(results.len() + 1);
    let mut failed = 0usize;
    let mut custom = Vec::new();

    for result in results {
        let display = result.path.display();
        match result.status {
            LoadStatus::Loaded { rules } => {
                lines.push(format!("ok      {display} ({} rules)", rules.len()));
                custom.extend(rules);
            }
            LoadStatus::Skipped { reason } => lines.push(format!("skipped {display}: {reason}")),
            LoadStatus::Failed { error } => {
                failed += 1;
                lines.push(format!("FAILED  {display}: {error}"));
            }
        }
    }

    if failed > 0 {
        bail!("{}\n{failed} rule file(s) failed to load", lines.join("\n"));
    }

    let managed = managed_rules()?;
    let set = assemble(&managed, &custom)
        .map_err(|e| anyhow::anyhow!("{}\nrule set is invalid: {e}", lines.join("\n")))?;
    lines.push(format!("{} rules assembled ({} custom)", set.len(), custom.len()));
    Ok(lines)
}

/// Split a `Name: value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header '{raw}' must look like 'Name: value'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("header '{raw}' has an empty name");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub struct PreviewInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a [String],
    pub body: Option<&'a str>,
    pub count: u64,
}

pub fn preview(set: &RuleSet, input: PreviewInput<'_>) -> Result<Verdict> {
    let mut request = SampleRequest::new(input.method.to_uppercase(), input.path);
    if let Some(query) = input.query {
        request = request.with_query(query);
    }
    for raw in input.headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
    }
    if let Some(body) = input.body {
        request = request.with_body(body);
    }
    let observed = ObservedCounts::uniform(set, input.count);
    Ok(evaluate(set, &request, &observed)?)
}

/// One-shot association; no retries and no escalation.
pub async fn associate(config: &Config, resource: &str) -> Result<BindingResult> {
    let web_acl_arn = config.remediation.require_web_acl_arn()?;
    let api = Arc::new(Wafv2ControlApi::new(&config.aws));
    let controller = AssociationController::new(api, web_acl_arn)
        .with_timeout(config.remediation.control_timeout());
    Ok(controller.handle(&ViolationEvent::new(resource, Utc::now())).await)
}
