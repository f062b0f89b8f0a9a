//! Vendor-managed signature groups every web ACL starts from.

use crate::error::RuleError;
use crate::predicate::{ManagedGroupRef, Predicate};
use crate::rule::{Rule, RuleAction, RuleStatement, Visibility};

pub const AWS_VENDOR: &str = "AWS";

struct ManagedGroupSpec {
    rule_name: &'static str,
    metric_name: &'static str,
    group_name: &'static str,
    priority: u32,
    excluded: &'static [&'static str],
}

const MANAGED_GROUPS: &[ManagedGroupSpec] = &[
    // Known malicious actors and bots.
    ManagedGroupSpec {
        rule_name: "AWS-AWSManagedRulesAmazonIpReputationList",
        metric_name: "AWSManagedRulesAmazonIpReputationList",
        group_name: "AWSManagedRulesAmazonIpReputationList",
        priority: 1,
        excluded: &[],
    },
    // OWASP core rule set. Body size and cookie XSS signatures only count.
    ManagedGroupSpec {
        rule_name: "AWS-AWSManagedRulesCommonRuleSet",
        metric_name: "AWS-AWSManagedRulesCommonRuleSet",
        group_name: "AWSManagedRulesCommonRuleSet",
        priority: 2,
        excluded: &[
            "GenericRFI_BODY",
            "SizeRestrictions_BODY",
            "CrossSiteScripting_COOKIE",
        ],
    },
    ManagedGroupSpec {
        rule_name: "AWSManagedRulesKnownBadInputsRuleSet",
        metric_name: "AWSManagedRulesKnownBadInputsRuleSet",
        group_name: "AWSManagedRulesKnownBadInputsRuleSet",
        priority: 3,
        excluded: &[],
    },
    ManagedGroupSpec {
        rule_name: "AWSManagedRulesSQLiRuleSet",
        metric_name: "AWSManagedRulesSQLiRuleSet",
        group_name: "AWSManagedRulesSQLiRuleSet",
        priority: 4,
        excluded: &[],
    },
    // Linux LFI.
    ManagedGroupSpec {
        rule_name: "AWSManagedRuleLinux",
        metric_name: "AWSManagedRuleLinux",
        group_name: "AWSManagedRulesLinuxRuleSet",
        priority: 5,
        excluded: &[],
    },
];

/// The baseline managed group rules at priorities 1-5, enforcing each
/// group's own actions.
pub fn managed_rules() -> Result<Vec<Rule>, RuleError> {
    MANAGED_GROUPS
        .iter()
        .map(|spec| {
            let group = ManagedGroupRef {
                vendor: AWS_VENDOR.to_string(),
                name: spec.group_name.to_string(),
                excluded_rules: spec.excluded.iter().map(|s| s.to_string()).collect(),
            };
            Rule::new(
                spec.rule_name,
                spec.priority,
                RuleAction::Block,
                RuleStatement::Match(Predicate::ManagedGroup(group)),
                Visibility::new(spec.metric_name),
            )
        })
        .collect()
}
