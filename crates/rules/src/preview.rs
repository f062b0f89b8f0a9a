//! Offline dry-run of a [`RuleSet`] against a sample request.
//!
//! Used by `webacl preview` and by scope-down tests. The inspection engine
//! stays authoritative: managed groups are opaque here and rate windows
//! are driven by caller-supplied observed counts instead of real traffic.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::assembler::{DefaultAction, RuleSet};
use crate::predicate::{
    ByteMatch, FieldToMatch, PositionalConstraint, Predicate, RegexMatch, TextTransformation,
    TransformType,
};
use crate::rule::{AggregateKey, FallbackBehavior, RateLimit, Rule, RuleAction, RuleStatement};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("rule '{rule}': pattern '{pattern}' does not compile: {source}")]
    InvalidRegex {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// ── Sample request ──────────────────────────────────────────────────

/// A request as seen by the inspection engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    /// Header names are matched case-insensitively.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl SampleRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_argument(&self, name: &str) -> Option<&str> {
        self.query
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// The inspected value of `field`, or `None` when it is absent.
    fn field(&self, field: &FieldToMatch) -> Option<&str> {
        match field {
            FieldToMatch::UriPath => Some(&self.path),
            FieldToMatch::QueryString => Some(&self.query),
            FieldToMatch::Method => Some(&self.method),
            FieldToMatch::Body => Some(&self.body),
            FieldToMatch::SingleHeader { name } => self.header(name),
            FieldToMatch::SingleQueryArgument { name } => self.query_argument(name),
        }
    }
}

/// Requests already counted in each rate rule's current window, keyed by
/// rule name. Rules with no entry have seen nothing.
#[derive(Debug, Clone, Default)]
pub struct ObservedCounts(HashMap<String, u64>);

impl ObservedCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, rule: impl Into<String>, count: u64) {
        self.0.insert(rule.into(), count);
    }

    pub fn with(mut self, rule: impl Into<String>, count: u64) -> Self {
        self.set(rule, count);
        self
    }

    pub fn get(&self, rule: &str) -> u64 {
        self.0.get(rule).copied().unwrap_or(0)
    }

    /// The same count for every rate rule in `set`.
    pub fn uniform(set: &RuleSet, count: u64) -> Self {
        let mut counts = Self::new();
        for rule in set.iter().filter(|r| r.rate_limit().is_some()) {
            counts.set(rule.name(), count);
        }
        counts
    }
}

// ── Verdict ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Block,
}

impl From<DefaultAction> for Decision {
    fn from(action: DefaultAction) -> Self {
        match action {
            DefaultAction::Allow => Decision::Allow,
            DefaultAction::Block => Decision::Block,
        }
    }
}

/// Outcome of previewing one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub decision: Decision,
    /// Rule that terminated evaluation; `None` means the default action applied.
    pub terminating_rule: Option<String>,
    /// Count-action rules whose action fired.
    pub counted: Vec<String>,
    /// Rate rules the request counts toward, whether or not they acted.
    pub rate_scoped: Vec<String>,
    /// Managed group rules that were evaluated as opaque.
    pub opaque: Vec<String>,
}

// ── Evaluation ──────────────────────────────────────────────────────

/// Walk `set` in priority order and report what would happen to `request`.
pub fn evaluate(
    set: &RuleSet,
    request: &SampleRequest,
    observed: &ObservedCounts,
) -> Result<Verdict, PreviewError> {
    let mut verdict = Verdict {
        decision: set.default_action().into(),
        terminating_rule: None,
        counted: Vec::new(),
        rate_scoped: Vec::new(),
        opaque: Vec::new(),
    };

    for rule in set {
        let fired = match rule.statement() {
            RuleStatement::Match(Predicate::ManagedGroup(_)) => {
                verdict.opaque.push(rule.name().to_string());
                false
            }
            RuleStatement::Match(predicate) => matches(predicate, request, rule)?,
            RuleStatement::RateBased(rate) => {
                if counts_toward(rate, request, rule)? {
                    verdict.rate_scoped.push(rule.name().to_string());
                    observed.get(rule.name()) > rate.limit
                } else {
                    false
                }
            }
        };

        debug!(rule = rule.name(), priority = rule.priority(), fired, "previewed rule");
        if !fired {
            continue;
        }

        match rule.action() {
            RuleAction::Count => verdict.counted.push(rule.name().to_string()),
            RuleAction::Allow | RuleAction::Block => {
                verdict.decision = if rule.action() == RuleAction::Allow {
                    Decision::Allow
                } else {
                    Decision::Block
                };
                verdict.terminating_rule = Some(rule.name().to_string());
                break;
            }
        }
    }

    Ok(verdict)
}

/// Whether `request` is counted in `rate`'s window: the scope-down (if any)
/// matches and the aggregation key can be extracted.
fn counts_toward(rate: &RateLimit, request: &SampleRequest, rule: &Rule) -> Result<bool, PreviewError> {
    let keyed = match &rate.aggregate_key {
        AggregateKey::SourceIp => true,
        AggregateKey::ForwardedIp {
            header_name,
            fallback,
        } => match request.header(header_name) {
            Some(value) if !value.trim().is_empty() => true,
            _ => *fallback == FallbackBehavior::Match,
        },
        AggregateKey::CustomHeader { name } => request.header(name).is_some(),
    };
    if !keyed {
        return Ok(false);
    }
    match &rate.scope_down {
        Some(scope) => matches(scope, request, rule),
        None => Ok(true),
    }
}

fn matches(predicate: &Predicate, request: &SampleRequest, rule: &Rule) -> Result<bool, PreviewError> {
    match predicate {
        Predicate::ByteMatch(m) => Ok(byte_match(m, request)),
        Predicate::RegexMatch(m) => regex_match(m, request, rule),
        Predicate::And(children) => {
            for child in children {
                if !matches(child, request, rule)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Not(child) => Ok(!matches(child, request, rule)?),
        // Opaque at any depth; validation keeps these top-level only.
        Predicate::ManagedGroup(_) => Ok(false),
    }
}

fn byte_match(m: &ByteMatch, request: &SampleRequest) -> bool {
    let Some(raw) = request.field(&m.field) else {
        return false;
    };
    let value = transform(raw, &m.text_transformations);
    let needle = m.search_string.as_str();
    match m.positional_constraint {
        PositionalConstraint::Exactly => value == needle,
        PositionalConstraint::StartsWith => value.starts_with(needle),
        PositionalConstraint::EndsWith => value.ends_with(needle),
        PositionalConstraint::Contains => value.contains(needle),
        PositionalConstraint::ContainsWord => contains_word(&value, needle),
    }
}

fn regex_match(m: &RegexMatch, request: &SampleRequest, rule: &Rule) -> Result<bool, PreviewError> {
    let pattern = m.regex_string();
    let re = Regex::new(&pattern).map_err(|source| PreviewError::InvalidRegex {
        rule: rule.name().to_string(),
        pattern: pattern.clone(),
        source,
    })?;
    Ok(request
        .field(&m.field)
        .map(|raw| re.is_match(&transform(raw, &m.text_transformations)))
        .unwrap_or(false))
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    haystack.match_indices(word).any(|(start, _)| {
        let end = start + word.len();
        let before_ok = haystack[..start].chars().next_back().map_or(true, |c| !is_word(c));
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_word(c));
        before_ok && after_ok
    })
}

// ── Text transformations ────────────────────────────────────────────

fn transform(value: &str, transformations: &[TextTransformation]) -> String {
    let mut ordered: Vec<&TextTransformation> = transformations.iter().collect();
    ordered.sort_by_key(|t| t.priority);
    ordered
        .into_iter()
        .fold(value.to_string(), |acc, t| apply(&acc, t.kind))
}

fn apply(value: &str, kind: TransformType) -> String {
    match kind {
        TransformType::None => value.to_string(),
        TransformType::Lowercase => value.to_lowercase(),
        TransformType::UrlDecode => url_decode(value),
        TransformType::CompressWhiteSpace => compress_white_space(value),
        TransformType::HtmlEntityDecode => html_entity_decode(value),
    }
}

/// Percent-decoding with `+` read as a space, as in form-encoded query strings.
fn url_decode(value: &str) -> String {
    let spaced = value.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

/// Collapse each whitespace run into one space. Edges are kept.
fn compress_white_space(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for c in value.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn html_entity_decode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';').and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi))) {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = entity.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
