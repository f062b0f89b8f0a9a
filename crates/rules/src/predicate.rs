//! Request-matching predicates.
//!
//! A [`Predicate`] is a closed tree of leaf matchers (byte match, regex
//! match), boolean combinators (and, not) and references to vendor-managed
//! signature groups. Evaluation belongs to the inspection engine; this
//! module owns construction, validation and the authoring format
//! (snake_case YAML via serde).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidPredicateError;

// ── Request fields ──────────────────────────────────────────────────

/// The part of an inbound request a leaf predicate inspects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldToMatch {
    UriPath,
    QueryString,
    Method,
    Body,
    SingleHeader { name: String },
    SingleQueryArgument { name: String },
}

impl FieldToMatch {
    /// Header or query-argument name for named fields.
    pub fn name(&self) -> Option<&str> {
        match self {
            FieldToMatch::SingleHeader { name } | FieldToMatch::SingleQueryArgument { name } => {
                Some(name)
            }
            _ => None,
        }
    }

    fn validate(&self, node: &str) -> Result<(), InvalidPredicateError> {
        match self.name() {
            Some(name) if name.trim().is_empty() => Err(InvalidPredicateError::new(
                node,
                "field name must not be empty",
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for FieldToMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldToMatch::UriPath => write!(f, "uri_path"),
            FieldToMatch::QueryString => write!(f, "query_string"),
            FieldToMatch::Method => write!(f, "method"),
            FieldToMatch::Body => write!(f, "body"),
            FieldToMatch::SingleHeader { name } => write!(f, "header:{name}"),
            FieldToMatch::SingleQueryArgument { name } => write!(f, "query_arg:{name}"),
        }
    }
}

// ── Byte-match position ─────────────────────────────────────────────

/// Where the search string has to sit inside the inspected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionalConstraint {
    Exactly,
    StartsWith,
    EndsWith,
    Contains,
    ContainsWord,
}

impl PositionalConstraint {
    /// Engine enum value.
    pub fn as_wire(&self) -> &'static str {
        match self {
            PositionalConstraint::Exactly => "EXACTLY",
            PositionalConstraint::StartsWith => "STARTS_WITH",
            PositionalConstraint::EndsWith => "ENDS_WITH",
            PositionalConstraint::Contains => "CONTAINS",
            PositionalConstraint::ContainsWord => "CONTAINS_WORD",
        }
    }
}

// ── Text transformations ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformType {
    None,
    Lowercase,
    UrlDecode,
    CompressWhiteSpace,
    HtmlEntityDecode,
}

impl TransformType {
    /// Engine enum value.
    pub fn as_wire(&self) -> &'static str {
        match self {
            TransformType::None => "NONE",
            TransformType::Lowercase => "LOWERCASE",
            TransformType::UrlDecode => "URL_DECODE",
            TransformType::CompressWhiteSpace => "COMPRESS_WHITE_SPACE",
            TransformType::HtmlEntityDecode => "HTML_ENTITY_DECODE",
        }
    }
}

/// A normalization step applied to the field before matching.
/// Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextTransformation {
    pub priority: u32,
    #[serde(rename = "type")]
    pub kind: TransformType,
}

impl TextTransformation {
    pub fn new(priority: u32, kind: TransformType) -> Self {
        Self { priority, kind }
    }
}

/// The engine requires at least one transformation; `NONE` at priority 0.
pub fn default_text_transformations() -> Vec<TextTransformation> {
    vec![TextTransformation::new(0, TransformType::None)]
}

fn validate_transformations(
    transformations: &[TextTransformation],
    node: &str,
) -> Result<(), InvalidPredicateError> {
    if transformations.is_empty() {
        return Err(InvalidPredicateError::new(
            node,
            "at least one text transformation is required",
        ));
    }
    for (i, t) in transformations.iter().enumerate() {
        if transformations[..i].iter().any(|prev| prev.priority == t.priority) {
            return Err(InvalidPredicateError::new(
                format!("{node}.text_transformations[{i}]"),
                format!("duplicate transformation priority {}", t.priority),
            ));
        }
    }
    Ok(())
}

// ── Leaf predicates ─────────────────────────────────────────────────

/// Literal string match at a fixed position of a request field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ByteMatch {
    pub field: FieldToMatch,
    pub search_string: String,
    pub positional_constraint: PositionalConstraint,
    #[serde(default = "default_text_transformations")]
    pub text_transformations: Vec<TextTransformation>,
}

/// Regular-expression match over a request field. The pattern set matches
/// when any one of its patterns matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegexMatch {
    pub field: FieldToMatch,
    pub patterns: Vec<String>,
    #[serde(default = "default_text_transformations")]
    pub text_transformations: Vec<TextTransformation>,
}

impl RegexMatch {
    /// The pattern set as a single alternation, the form the engine accepts.
    pub fn regex_string(&self) -> String {
        self.patterns.join("|")
    }
}

/// Reference to a vendor-curated signature group.
///
/// Excluded signatures are counted instead of blocked by the engine.
/// An empty exclusion list and an omitted one are equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagedGroupRef {
    pub vendor: String,
    pub name: String,
    #[serde(default)]
    pub excluded_rules: Vec<String>,
}

// ── Predicate tree ──────────────────────────────────────────────────

/// A request-matching predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    ByteMatch(ByteMatch),
    RegexMatch(RegexMatch),
    And(Vec<Predicate>),
    Not(Box<Predicate>),
    ManagedGroup(ManagedGroupRef),
}

impl Predicate {
    /// Byte match with explicit transformations.
    pub fn byte_match(
        field: FieldToMatch,
        search_string: impl Into<String>,
        positional_constraint: PositionalConstraint,
        text_transformations: Vec<TextTransformation>,
    ) -> Result<Self, InvalidPredicateError> {
        let predicate = Predicate::ByteMatch(ByteMatch {
            field,
            search_string: search_string.into(),
            positional_constraint,
            text_transformations,
        });
        predicate.validate_node("", false)?;
        Ok(predicate)
    }

    /// `uri_path STARTS_WITH prefix`, no transformation.
    pub fn path_starts_with(prefix: impl Into<String>) -> Result<Self, InvalidPredicateError> {
        Self::byte_match(
            FieldToMatch::UriPath,
            prefix,
            PositionalConstraint::StartsWith,
            default_text_transformations(),
        )
    }

    pub fn regex_match(
        field: FieldToMatch,
        patterns: Vec<String>,
        text_transformations: Vec<TextTransformation>,
    ) -> Result<Self, InvalidPredicateError> {
        let predicate = Predicate::RegexMatch(RegexMatch {
            field,
            patterns,
            text_transformations,
        });
        predicate.validate_node("", false)?;
        Ok(predicate)
    }

    pub fn and(children: Vec<Predicate>) -> Result<Self, InvalidPredicateError> {
        let predicate = Predicate::And(children);
        predicate.validate_node("", false)?;
        Ok(predicate)
    }

    pub fn not(child: Predicate) -> Result<Self, InvalidPredicateError> {
        let predicate = Predicate::Not(Box::new(child));
        predicate.validate_node("", false)?;
        Ok(predicate)
    }

    pub fn managed_group(
        vendor: impl Into<String>,
        name: impl Into<String>,
        excluded_rules: Vec<String>,
    ) -> Result<Self, InvalidPredicateError> {
        let predicate = Predicate::ManagedGroup(ManagedGroupRef {
            vendor: vendor.into(),
            name: name.into(),
            excluded_rules,
        });
        predicate.validate_node("", true)?;
        Ok(predicate)
    }

    /// "matches `include` but not `exclude`": the carve-out pattern used to
    /// hand a sub-path to its own rule.
    pub fn carve_out(include: Predicate, exclude: Predicate) -> Result<Self, InvalidPredicateError> {
        Self::and(vec![include, Self::not(exclude)?])
    }

    /// Short node label used in error paths.
    pub fn kind(&self) -> &'static str {
        match self {
            Predicate::ByteMatch(_) => "byte_match",
            Predicate::RegexMatch(_) => "regex_match",
            Predicate::And(_) => "and",
            Predicate::Not(_) => "not",
            Predicate::ManagedGroup(_) => "managed_group",
        }
    }

    pub fn is_managed_group(&self) -> bool {
        matches!(self, Predicate::ManagedGroup(_))
    }

    /// Validate as a rule's top-level statement (managed groups allowed).
    pub fn validate(&self) -> Result<(), InvalidPredicateError> {
        self.validate_node("statement", true)
    }

    /// Validate as a nested statement rooted at `node` (managed groups rejected).
    pub fn validate_nested(&self, node: &str) -> Result<(), InvalidPredicateError> {
        self.validate_node(node, false)
    }

    fn validate_node(&self, node: &str, top_level: bool) -> Result<(), InvalidPredicateError> {
        match self {
            Predicate::ByteMatch(m) => {
                let node = leaf_path(node, "byte_match");
                m.field.validate(&node)?;
                if m.search_string.is_empty() {
                    return Err(InvalidPredicateError::new(node, "search string must not be empty"));
                }
                validate_transformations(&m.text_transformations, &node)
            }
            Predicate::RegexMatch(m) => {
                let node = leaf_path(node, "regex_match");
                m.field.validate(&node)?;
                if m.patterns.is_empty() {
                    return Err(InvalidPredicateError::new(node, "pattern set must not be empty"));
                }
                if let Some(i) = m.patterns.iter().position(|p| p.is_empty()) {
                    return Err(InvalidPredicateError::new(
                        format!("{node}.patterns[{i}]"),
                        "pattern must not be empty",
                    ));
                }
                validate_transformations(&m.text_transformations, &node)
            }
            Predicate::And(children) => {
                let node = leaf_path(node, "and");
                if children.is_empty() {
                    return Err(InvalidPredicateError::new(node, "and requires at least one child"));
                }
                for (i, child) in children.iter().enumerate() {
                    child.validate_node(&format!("{node}[{i}]"), false)?;
                }
                Ok(())
            }
            Predicate::Not(child) => {
                let node = leaf_path(node, "not");
                child.validate_node(&node, false)
            }
            Predicate::ManagedGroup(group) => {
                let node = leaf_path(node, "managed_group");
                if !top_level {
                    return Err(InvalidPredicateError::new(
                        node,
                        "managed group reference is only valid as a rule's top-level statement",
                    ));
                }
                if group.vendor.trim().is_empty() {
                    return Err(InvalidPredicateError::new(node, "vendor must not be empty"));
                }
                if group.name.trim().is_empty() {
                    return Err(InvalidPredicateError::new(node, "group name must not be empty"));
                }
                if let Some(i) = group.excluded_rules.iter().position(|r| r.trim().is_empty()) {
                    return Err(InvalidPredicateError::new(
                        format!("{node}.excluded_rules[{i}]"),
                        "excluded signature id must not be empty",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn leaf_path(node: &str, kind: &str) -> String {
    if node.is_empty() {
        kind.to_string()
    } else {
        format!("{node}.{kind}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_starts_with_builds_uri_path_byte_match() {
        let p = Predicate::path_starts_with("/login").unwrap();
        match p {
            Predicate::ByteMatch(m) => {
                assert_eq!(m.field, FieldToMatch::UriPath);
                assert_eq!(m.search_string, "/login");
                assert_eq!(m.positional_constraint, PositionalConstraint::StartsWith);
                assert_eq!(m.text_transformations, default_text_transformations());
            }
            other => panic!("expected byte match, got {other:?}"),
        }
    }

    #[test]
    fn empty_search_string_is_rejected() {
        let err = Predicate::path_starts_with("").unwrap_err();
        assert_eq!(err.node, "byte_match");
        assert!(err.reason.contains("search string"));
    }

    #[test]
    fn empty_header_name_is_rejected() {
        let err = Predicate::byte_match(
            FieldToMatch::SingleHeader { name: " ".into() },
            "bot",
            PositionalConstraint::Contains,
            default_text_transformations(),
        )
        .unwrap_err();
        assert!(err.reason.contains("field name"));
    }

    #[test]
    fn empty_regex_pattern_set_is_rejected() {
        let err = Predicate::regex_match(FieldToMatch::UriPath, vec![], default_text_transformations())
            .unwrap_err();
        assert!(err.reason.contains("pattern set"));
    }

    #[test]
    fn blank_regex_pattern_names_its_index() {
        let err = Predicate::regex_match(
            FieldToMatch::UriPath,
            vec!["^/login".into(), String::new()],
            default_text_transformations(),
        )
        .unwrap_err();
        assert_eq!(err.node, "regex_match.patterns[1]");
    }

    #[test]
    fn empty_and_is_rejected() {
        let err = Predicate::and(vec![]).unwrap_err();
        assert_eq!(err.node, "and");
    }

    #[test]
    fn nested_error_names_offending_node() {
        let bad = Predicate::ByteMatch(ByteMatch {
            field: FieldToMatch::UriPath,
            search_string: String::new(),
            positional_constraint: PositionalConstraint::StartsWith,
            text_transformations: default_text_transformations(),
        });
        let ok = Predicate::path_starts_with("/api").unwrap();
        let err = Predicate::and(vec![ok, Predicate::Not(Box::new(bad))]).unwrap_err();
        assert_eq!(err.node, "and[1].not.byte_match");
    }

    #[test]
    fn managed_group_cannot_be_nested() {
        let group = Predicate::ManagedGroup(ManagedGroupRef {
            vendor: "AWS".into(),
            name: "AWSManagedRulesSQLiRuleSet".into(),
            excluded_rules: vec![],
        });
        let err = Predicate::not(group).unwrap_err();
        assert_eq!(err.node, "not.managed_group");
        assert!(err.reason.contains("top-level"));
    }

    #[test]
    fn managed_group_valid_at_top_level() {
        let group = Predicate::managed_group(
            "AWS",
            "AWSManagedRulesCommonRuleSet",
            vec!["SizeRestrictions_BODY".into()],
        )
        .unwrap();
        assert!(group.is_managed_group());
    }

    #[test]
    fn duplicate_transformation_priorities_are_rejected() {
        let err = Predicate::byte_match(
            FieldToMatch::UriPath,
            "/x",
            PositionalConstraint::Exactly,
            vec![
                TextTransformation::new(0, TransformType::Lowercase),
                TextTransformation::new(0, TransformType::UrlDecode),
            ],
        )
        .unwrap_err();
        assert_eq!(err.node, "byte_match.text_transformations[1]");
    }

    #[test]
    fn carve_out_is_and_with_negated_exception() {
        let p = Predicate::carve_out(
            Predicate::path_starts_with("/api").unwrap(),
            Predicate::path_starts_with("/api/qualtrics").unwrap(),
        )
        .unwrap();
        match p {
            Predicate::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], Predicate::Not(_)));
            }
            other => panic!("expected and, got {other:?}"),
        }
    }

    #[test]
    fn regex_string_joins_patterns_with_alternation() {
        let m = RegexMatch {
            field: FieldToMatch::UriPath,
            patterns: vec!["^/login".into(), "^/signup".into()],
            text_transformations: default_text_transformations(),
        };
        assert_eq!(m.regex_string(), "^/login|^/signup");
    }

    #[test]
    fn yaml_authoring_format_parses() {
        let yaml = r#"
and:
  - byte_match:
      field: uri_path
      search_string: /api
      positional_constraint: starts_with
  - not:
      byte_match:
        field: uri_path
        search_string: /api/qualtrics
        positional_constraint: starts_with
"#;
        let p: Predicate = serde_yaml::from_str(yaml).unwrap();
        p.validate().unwrap();
        assert_eq!(p.kind(), "and");
    }
}
