//! Web ACL rule model.
//!
//! This crate provides:
//! - Typed request predicates with construction-time validation
//! - Rules (match, managed group, rate-based) and the priority-ordered
//!   [`RuleSet`] assembler
//! - The declarative web ACL description format handed to provisioning
//! - YAML rule file loading and the baseline managed groups
//! - An offline preview evaluator for dry runs

pub mod assembler;
pub mod baseline;
pub mod description;
pub mod error;
pub mod loader;
pub mod predicate;
pub mod preview;
pub mod rule;

pub use assembler::{assemble, DefaultAction, RuleSet};
pub use description::{Scope, WebAclDescription};
pub use error::{AssembleError, InvalidPredicateError, RuleError};
pub use loader::{parse_rules, LoadError, RuleLoader};
pub use predicate::{FieldToMatch, PositionalConstraint, Predicate};
pub use rule::{AggregateKey, RateLimit, Rule, RuleAction, RuleStatement, Visibility};
