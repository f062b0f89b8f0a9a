//! Merges managed and custom rules into one priority-ordered [`RuleSet`].
//!
//! Assembly is a pure function of its inputs: the same rule lists always
//! produce an equal `RuleSet` and byte-identical description output, which
//! is what lets the provisioning layer diff it against live state.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::AssembleError;
use crate::rule::Rule;

/// Action applied when no rule terminates evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAction {
    Allow,
    Block,
}

/// A non-empty list of rules in strictly ascending priority order, with
/// unique names and priorities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleSet {
    default_action: DefaultAction,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_action(&self) -> DefaultAction {
        self.default_action
    }

    pub fn with_default_action(mut self, default_action: DefaultAction) -> Self {
        self.default_action = default_action;
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Always false for an assembled set; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Concatenate `managed` and `custom`, check uniqueness and sort by priority.
///
/// The default action is `Allow`; override it with
/// [`RuleSet::with_default_action`]. Priority collisions are reported
/// before name collisions, each for the first offending rule in
/// concatenation order.
pub fn assemble(managed: &[Rule], custom: &[Rule]) -> Result<RuleSet, AssembleError> {
    let combined: Vec<&Rule> = managed.iter().chain(custom.iter()).collect();
    if combined.is_empty() {
        return Err(AssembleError::Empty);
    }

    let mut by_priority: HashMap<u32, &str> = HashMap::with_capacity(combined.len());
    for rule in &combined {
        if let Some(first) = by_priority.insert(rule.priority(), rule.name()) {
            return Err(AssembleError::DuplicatePriority {
                priority: rule.priority(),
                first: first.to_string(),
                second: rule.name().to_string(),
            });
        }
    }

    let mut names: HashSet<&str> = HashSet::with_capacity(combined.len());
    for rule in &combined {
        if !names.insert(rule.name()) {
            return Err(AssembleError::DuplicateName {
                name: rule.name().to_string(),
            });
        }
    }

    let mut rules: Vec<Rule> = combined.into_iter().cloned().collect();
    rules.sort_by_key(|r| r.priority());

    tracing::debug!(
        managed = managed.len(),
        custom = custom.len(),
        "assembled rule set"
    );

    Ok(RuleSet {
        default_action: DefaultAction::Allow,
        rules,
    })
}
