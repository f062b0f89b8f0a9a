//! Rule description output in the inspection engine's schema.
//!
//! The engine consumes `AWS::WAFv2::WebACL` property documents: PascalCase
//! keys, empty objects as enum markers (`{"Block": {}}`) and upper-case
//! enum strings. Everything here is a deterministic projection of the rule
//! model; field declaration order is the output key order.
//!
//! The one normalization: the engine requires two or more operands in an
//! `AndStatement`, so an `and` with a single operand is emitted as that
//! operand. Such a description reads back as the bare operand, which
//! matches exactly the same requests.

use serde::Serialize;

use crate::assembler::{DefaultAction, RuleSet};
use crate::predicate::{
    ByteMatch, FieldToMatch, ManagedGroupRef, Predicate, RegexMatch, TextTransformation,
    TransformType,
};
use crate::rule::{AggregateKey, RateLimit, Rule, RuleAction, RuleStatement, Visibility};

/// Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Named {
    pub name: String,
}

// ── Web ACL ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    Regional,
    Cloudfront,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VisibilityConfig {
    pub sampled_requests_enabled: bool,
    pub cloud_watch_metrics_enabled: bool,
    pub metric_name: String,
}

impl From<&Visibility> for VisibilityConfig {
    fn from(v: &Visibility) -> Self {
        Self {
            sampled_requests_enabled: v.sampled_requests_enabled,
            cloud_watch_metrics_enabled: v.metrics_enabled,
            metric_name: v.metric_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DefaultActionDescription {
    Allow(Empty),
    Block(Empty),
}

impl From<DefaultAction> for DefaultActionDescription {
    fn from(action: DefaultAction) -> Self {
        match action {
            DefaultAction::Allow => DefaultActionDescription::Allow(Empty {}),
            DefaultAction::Block => DefaultActionDescription::Block(Empty {}),
        }
    }
}

/// The full web ACL document submitted by the provisioning layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebAclDescription {
    pub name: String,
    pub scope: Scope,
    pub default_action: DefaultActionDescription,
    pub visibility_config: VisibilityConfig,
    pub rules: Vec<RuleDescription>,
}

impl WebAclDescription {
    /// Describe `rule_set` as web ACL `name`; the ACL-level metric uses the
    /// same name with metrics and sampling enabled.
    pub fn new(name: impl Into<String>, scope: Scope, rule_set: &RuleSet) -> Self {
        let name = name.into();
        Self {
            visibility_config: VisibilityConfig::from(&Visibility::new(name.clone())),
            name,
            scope,
            default_action: rule_set.default_action().into(),
            rules: rule_set.iter().map(RuleDescription::from).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ── Rules ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionDescription {
    Allow(Empty),
    Block(Empty),
    Count(Empty),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverrideActionDescription {
    None(Empty),
    Count(Empty),
}

/// One rule. Managed group rules carry `OverrideAction`, all others `Action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleDescription {
    pub name: String,
    pub priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_action: Option<OverrideActionDescription>,
    pub statement: StatementDescription,
    pub visibility_config: VisibilityConfig,
}

impl From<&Rule> for RuleDescription {
    fn from(rule: &Rule) -> Self {
        let (action, override_action) = if rule.managed_group_ref().is_some() {
            let o = match rule.action() {
                RuleAction::Count => OverrideActionDescription::Count(Empty {}),
                // Allow is rejected at construction for managed groups.
                RuleAction::Block | RuleAction::Allow => OverrideActionDescription::None(Empty {}),
            };
            (None, Some(o))
        } else {
            let a = match rule.action() {
                RuleAction::Allow => ActionDescription::Allow(Empty {}),
                RuleAction::Block => ActionDescription::Block(Empty {}),
                RuleAction::Count => ActionDescription::Count(Empty {}),
            };
            (Some(a), None)
        };

        let statement = match rule.statement() {
            RuleStatement::Match(predicate) => StatementDescription::from(predicate),
            RuleStatement::RateBased(rate) => {
                StatementDescription::RateBasedStatement(Box::new(RateBasedStatement::from(rate)))
            }
        };

        Self {
            name: rule.name().to_string(),
            priority: rule.priority(),
            action,
            override_action,
            statement,
            visibility_config: rule.visibility().into(),
        }
    }
}

// ── Statements ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StatementDescription {
    ByteMatchStatement(ByteMatchStatement),
    RegexMatchStatement(RegexMatchStatement),
    AndStatement(AndStatement),
    NotStatement(NotStatement),
    ManagedRuleGroupStatement(ManagedRuleGroupStatement),
    RateBasedStatement(Box<RateBasedStatement>),
}

impl From<&Predicate> for StatementDescription {
    fn from(predicate: &Predicate) -> Self {
        match predicate {
            Predicate::ByteMatch(m) => StatementDescription::ByteMatchStatement(m.into()),
            Predicate::RegexMatch(m) => StatementDescription::RegexMatchStatement(m.into()),
            // The engine wants two or more operands; a lone operand is
            // equivalent to itself.
            Predicate::And(children) if children.len() == 1 => {
                StatementDescription::from(&children[0])
            }
            Predicate::And(children) => StatementDescription::AndStatement(AndStatement {
                statements: children.iter().map(StatementDescription::from).collect(),
            }),
            Predicate::Not(child) => StatementDescription::NotStatement(NotStatement {
                statement: Box::new(StatementDescription::from(child.as_ref())),
            }),
            Predicate::ManagedGroup(group) => {
                StatementDescription::ManagedRuleGroupStatement(group.into())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldToMatchDescription {
    UriPath(Empty),
    QueryString(Empty),
    Method(Empty),
    Body(Empty),
    SingleHeader(Named),
    SingleQueryArgument(Named),
}

impl From<&FieldToMatch> for FieldToMatchDescription {
    fn from(field: &FieldToMatch) -> Self {
        match field {
            FieldToMatch::UriPath => FieldToMatchDescription::UriPath(Empty {}),
            FieldToMatch::QueryString => FieldToMatchDescription::QueryString(Empty {}),
            FieldToMatch::Method => FieldToMatchDescription::Method(Empty {}),
            FieldToMatch::Body => FieldToMatchDescription::Body(Empty {}),
            FieldToMatch::SingleHeader { name } => {
                FieldToMatchDescription::SingleHeader(Named { name: name.clone() })
            }
            FieldToMatch::SingleQueryArgument { name } => {
                FieldToMatchDescription::SingleQueryArgument(Named { name: name.clone() })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextTransformationDescription {
    pub priority: u32,
    #[serde(rename = "Type")]
    pub kind: &'static str,
}

impl From<&TextTransformation> for TextTransformationDescription {
    fn from(t: &TextTransformation) -> Self {
        Self {
            priority: t.priority,
            kind: t.kind.as_wire(),
        }
    }
}

fn transformations(ts: &[TextTransformation]) -> Vec<TextTransformationDescription> {
    ts.iter().map(TextTransformationDescription::from).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ByteMatchStatement {
    pub search_string: String,
    pub field_to_match: FieldToMatchDescription,
    pub text_transformations: Vec<TextTransformationDescription>,
    pub positional_constraint: &'static str,
}

impl From<&ByteMatch> for ByteMatchStatement {
    fn from(m: &ByteMatch) -> Self {
        Self {
            search_string: m.search_string.clone(),
            field_to_match: (&m.field).into(),
            text_transformations: transformations(&m.text_transformations),
            positional_constraint: m.positional_constraint.as_wire(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegexMatchStatement {
    pub regex_string: String,
    pub field_to_match: FieldToMatchDescription,
    pub text_transformations: Vec<TextTransformationDescription>,
}

impl From<&RegexMatch> for RegexMatchStatement {
    fn from(m: &RegexMatch) -> Self {
        Self {
            regex_string: m.regex_string(),
            field_to_match: (&m.field).into(),
            text_transformations: transformations(&m.text_transformations),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AndStatement {
    pub statements: Vec<StatementDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotStatement {
    pub statement: Box<StatementDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManagedRuleGroupStatement {
    pub vendor_name: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_rules: Vec<Named>,
}

impl From<&ManagedGroupRef> for ManagedRuleGroupStatement {
    fn from(group: &ManagedGroupRef) -> Self {
        Self {
            vendor_name: group.vendor.clone(),
            name: group.name.clone(),
            excluded_rules: group
                .excluded_rules
                .iter()
                .map(|name| Named { name: name.clone() })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForwardedIpConfig {
    pub header_name: String,
    pub fallback_behavior: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeaderKey {
    pub name: String,
    pub text_transformations: Vec<TextTransformationDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CustomKey {
    Header(HeaderKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RateBasedStatement {
    pub limit: u64,
    pub aggregate_key_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_window_sec: Option<u32>,
    #[serde(rename = "ForwardedIPConfig", skip_serializing_if = "Option::is_none")]
    pub forwarded_ip_config: Option<ForwardedIpConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_keys: Option<Vec<CustomKey>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_down_statement: Option<Box<StatementDescription>>,
}

impl From<&RateLimit> for RateBasedStatement {
    fn from(rate: &RateLimit) -> Self {
        let (forwarded_ip_config, custom_keys) = match &rate.aggregate_key {
            AggregateKey::SourceIp => (None, None),
            AggregateKey::ForwardedIp {
                header_name,
                fallback,
            } => (
                Some(ForwardedIpConfig {
                    header_name: header_name.clone(),
                    fallback_behavior: fallback.as_wire(),
                }),
                None,
            ),
            AggregateKey::CustomHeader { name } => (
                None,
                Some(vec![CustomKey::Header(HeaderKey {
                    name: name.clone(),
                    text_transformations: vec![TextTransformationDescription {
                        priority: 0,
                        kind: TransformType::None.as_wire(),
                    }],
                })]),
            ),
        };

        Self {
            limit: rate.limit,
            aggregate_key_type: rate.aggregate_key.as_wire(),
            evaluation_window_sec: rate.evaluation_window_sec,
            forwarded_ip_config,
            custom_keys,
            scope_down_statement: rate
                .scope_down
                .as_ref()
                .map(|p| Box::new(StatementDescription::from(p))),
        }
    }
}
