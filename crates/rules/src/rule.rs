//! Typed filtering rules.
//!
//! A [`Rule`] pairs a statement (a predicate, a managed signature group,
//! or a rate-based counting window) with an action, a priority and
//! telemetry settings. Rules are validated once in [`Rule::new`] and are
//! immutable afterwards.

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::predicate::{ManagedGroupRef, Predicate};

const MAX_NAME_LEN: usize = 128;

/// Evaluation windows (seconds) the engine accepts for rate-based rules.
pub const EVALUATION_WINDOWS: &[u32] = &[60, 120, 300, 600];

// ── Action ──────────────────────────────────────────────────────────

/// What the engine does with a request the rule matches.
///
/// For managed group rules `Block` means "enforce the group's own actions"
/// and `Count` forces every signature in the group to count only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Block,
    Count,
}

impl RuleAction {
    /// Allow and Block stop evaluation; Count does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RuleAction::Count)
    }
}

// ── Rate limiting ───────────────────────────────────────────────────

/// Behavior when the forwarded-IP header is missing or malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackBehavior {
    Match,
    NoMatch,
}

impl FallbackBehavior {
    pub fn as_wire(&self) -> &'static str {
        match self {
            FallbackBehavior::Match => "MATCH",
            FallbackBehavior::NoMatch => "NO_MATCH",
        }
    }
}

/// Key requests are aggregated by when counting toward the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKey {
    SourceIp,
    ForwardedIp {
        #[serde(default = "default_forwarded_header")]
        header_name: String,
        #[serde(default = "default_fallback")]
        fallback: FallbackBehavior,
    },
    CustomHeader { name: String },
}

fn default_forwarded_header() -> String {
    "X-Forwarded-For".to_string()
}

fn default_fallback() -> FallbackBehavior {
    FallbackBehavior::NoMatch
}

impl AggregateKey {
    pub fn as_wire(&self) -> &'static str {
        match self {
            AggregateKey::SourceIp => "IP",
            AggregateKey::ForwardedIp { .. } => "FORWARDED_IP",
            AggregateKey::CustomHeader { .. } => "CUSTOM_KEYS",
        }
    }
}

/// A counting window: requests selected by `scope_down` (all requests when
/// absent) are counted per aggregate key, and the rule's action applies to
/// a key once its count exceeds `limit`. The scope-down selects what
/// counts; it never gates the action on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimit {
    pub limit: u64,
    pub aggregate_key: AggregateKey,
    #[serde(default)]
    pub evaluation_window_sec: Option<u32>,
    #[serde(default)]
    pub scope_down: Option<Predicate>,
}

impl RateLimit {
    pub fn per_source_ip(limit: u64, scope_down: Option<Predicate>) -> Self {
        Self {
            limit,
            aggregate_key: AggregateKey::SourceIp,
            evaluation_window_sec: None,
            scope_down,
        }
    }
}

// ── Statement ───────────────────────────────────────────────────────

/// The matching part of a rule: a plain predicate tree (which may be a
/// managed group reference) or a rate-based counting window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatement {
    Match(Predicate),
    RateBased(RateLimit),
}

// ── Telemetry ───────────────────────────────────────────────────────

/// Per-rule metrics and request sampling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Visibility {
    pub metric_name: String,
    #[serde(default = "default_true")]
    pub sampled_requests_enabled: bool,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Visibility {
    /// Metrics and sampling both enabled.
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            sampled_requests_enabled: true,
            metrics_enabled: true,
        }
    }
}

// ── Rule ────────────────────────────────────────────────────────────

/// One named, prioritized filtering decision unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    name: String,
    priority: u32,
    action: RuleAction,
    statement: RuleStatement,
    visibility: Visibility,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        priority: u32,
        action: RuleAction,
        statement: RuleStatement,
        visibility: Visibility,
    ) -> Result<Self, RuleError> {
        let rule = Self {
            name: name.into(),
            priority,
            action,
            statement,
            visibility,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Managed signature group rule with metric name equal to the rule name.
    pub fn managed_group(
        name: impl Into<String>,
        priority: u32,
        group: ManagedGroupRef,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        let visibility = Visibility::new(name.clone());
        Self::new(
            name,
            priority,
            RuleAction::Block,
            RuleStatement::Match(Predicate::ManagedGroup(group)),
            visibility,
        )
    }

    /// Rate-based rule with metric name equal to the rule name.
    pub fn rate_based(
        name: impl Into<String>,
        priority: u32,
        action: RuleAction,
        rate_limit: RateLimit,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        let visibility = Visibility::new(name.clone());
        Self::new(name, priority, action, RuleStatement::RateBased(rate_limit), visibility)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn action(&self) -> RuleAction {
        self.action
    }

    pub fn statement(&self) -> &RuleStatement {
        &self.statement
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn rate_limit(&self) -> Option<&RateLimit> {
        match &self.statement {
            RuleStatement::RateBased(rate) => Some(rate),
            RuleStatement::Match(_) => None,
        }
    }

    pub fn managed_group_ref(&self) -> Option<&ManagedGroupRef> {
        match &self.statement {
            RuleStatement::Match(Predicate::ManagedGroup(group)) => Some(group),
            _ => None,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> RuleError {
        RuleError::InvalidRule {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<(), RuleError> {
        if !is_valid_identifier(&self.name) {
            return Err(self.invalid(format!(
                "name must be 1-{MAX_NAME_LEN} characters of [A-Za-z0-9_-]"
            )));
        }
        if !is_valid_identifier(&self.visibility.metric_name) {
            return Err(self.invalid(format!(
                "metric name '{}' must be 1-{MAX_NAME_LEN} characters of [A-Za-z0-9_-]",
                self.visibility.metric_name
            )));
        }

        match &self.statement {
            RuleStatement::Match(predicate) => {
                predicate.validate()?;
                if predicate.is_managed_group() && self.action == RuleAction::Allow {
                    return Err(self.invalid("managed group rules cannot use the allow action"));
                }
            }
            RuleStatement::RateBased(rate) => {
                if rate.limit == 0 {
                    return Err(self.invalid("rate limit threshold must be greater than zero"));
                }
                if let Some(window) = rate.evaluation_window_sec {
                    if !EVALUATION_WINDOWS.contains(&window) {
                        return Err(self.invalid(format!(
                            "evaluation window {window}s is not one of {EVALUATION_WINDOWS:?}"
                        )));
                    }
                }
                match &rate.aggregate_key {
                    AggregateKey::SourceIp => {}
                    AggregateKey::ForwardedIp { header_name, .. } => {
                        if header_name.trim().is_empty() {
                            return Err(self.invalid("forwarded IP header name must not be empty"));
                        }
                    }
                    AggregateKey::CustomHeader { name } => {
                        if name.trim().is_empty() {
                            return Err(self.invalid("custom aggregation header must not be empty"));
                        }
                    }
                }
                if let Some(scope_down) = &rate.scope_down {
                    scope_down.validate_nested("statement.rate_based.scope_down")?;
                }
            }
        }
        Ok(())
    }
}

fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_NAME_LEN
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ── Authoring format ────────────────────────────────────────────────

/// A rule as written in a YAML rule file, before validation.
///
/// `visibility` defaults to metrics and sampling enabled under the rule's
/// own name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    pub name: String,
    pub priority: u32,
    pub action: RuleAction,
    pub statement: RuleStatement,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

impl TryFrom<RuleDefinition> for Rule {
    type Error = RuleError;

    fn try_from(def: RuleDefinition) -> Result<Self, Self::Error> {
        let visibility = def
            .visibility
            .unwrap_or_else(|| Visibility::new(def.name.clone()));
        Rule::new(def.name, def.priority, def.action, def.statement, visibility)
    }
}
