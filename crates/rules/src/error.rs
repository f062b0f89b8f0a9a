//! Construction-time errors for predicates, rules and rule sets.
//!
//! All of these are fatal: a rule set that fails to build must never be
//! handed to the provisioning layer.

use thiserror::Error;

/// A predicate node failed construction-time validation.
///
/// `node` is a dotted path from the rule's statement root, e.g.
/// `statement.rate_based.scope_down.and[1].not.byte_match`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid predicate at {node}: {reason}")]
pub struct InvalidPredicateError {
    pub node: String,
    pub reason: String,
}

impl InvalidPredicateError {
    pub(crate) fn new(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while constructing a single [`crate::rule::Rule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error(transparent)]
    InvalidPredicate(#[from] InvalidPredicateError),

    #[error("invalid rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },
}

/// Errors raised while assembling rules into a [`crate::assembler::RuleSet`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("duplicate priority {priority} (rules '{first}' and '{second}')")]
    DuplicatePriority {
        priority: u32,
        first: String,
        second: String,
    },

    #[error("duplicate rule name '{name}'")]
    DuplicateName { name: String },

    #[error("rule set must contain at least one rule")]
    Empty,
}
