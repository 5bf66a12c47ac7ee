//! Integrity checks over structured rule sets.

use std::collections::{HashMap, HashSet};

use crate::rules::{ActionType, FlowRule};

use super::Severity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSetReport {
    pub issues: Vec<ValidationIssue>,
    pub total_rules: usize,
}

impl RuleSetReport {
    pub fn is_valid(&self) -> bool {
        self.issues
            .iter()
            .all(|issue| issue.severity != Severity::Error)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }
}

/// Rules get large in authored content; this catches the mistakes that
/// silently corrupt scoring.
const MANY_RULES_THRESHOLD: usize = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl RuleValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_rule(&self, rule: &FlowRule) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        match rule {
            FlowRule::HyperParameterAction(rule) => {
                if rule.parameter.trim().is_empty() {
                    issues.push(ValidationIssue::error(
                        "MISSING_PARAMETER",
                        "Hyperparameter action must name a parameter",
                    ));
                }
                if rule.value.is_none() {
                    issues.push(ValidationIssue::error(
                        "MISSING_VALUE",
                        format!("Action on '{}' has no value", rule.parameter),
                    ));
                }
                if let (Some(min), Some(max)) = (rule.min_value, rule.max_value) {
                    if min > max {
                        issues.push(ValidationIssue::error(
                            "INVALID_CONSTRAINTS",
                            format!("min_value {min} exceeds max_value {max}"),
                        ));
                    }
                }
            }
            FlowRule::UserResponse(rule) => {
                if rule.expected_options.is_empty() {
                    issues.push(ValidationIssue::warning(
                        "NO_EXPECTED_OPTIONS",
                        format!("User response rule for message {} expects nothing", rule.message_id),
                    ));
                }
            }
            FlowRule::MessageCount(rule) => {
                if rule.comparison_type == crate::rules::ComparisonType::Between
                    && (rule.min_count.is_none() || rule.max_count.is_none())
                {
                    issues.push(ValidationIssue::warning(
                        "INCOMPLETE_RANGE",
                        "BETWEEN comparison without both bounds",
                    ));
                }
            }
            FlowRule::TimeBased(_) | FlowRule::ConditionalBranching(_) | FlowRule::AlwaysShow(_) => {}
        }

        if rule.description().len() > 500 {
            issues.push(ValidationIssue::warning(
                "LONG_DESCRIPTION",
                format!("Rule '{}' has a very long description", rule.rule_id()),
            ));
        }

        issues
    }

    /// Set-level consistency: duplicate ids, conflicting SET actions on one
    /// parameter, oversized sets.
    pub fn validate_rule_set(&self, rules: &[FlowRule]) -> RuleSetReport {
        let mut issues = Vec::new();

        let mut seen_ids = HashSet::new();
        for rule in rules {
            if !seen_ids.insert(rule.rule_id()) {
                issues.push(ValidationIssue::error(
                    "DUPLICATE_RULE_ID",
                    format!("Duplicate rule id: {}", rule.rule_id()),
                ));
            }
            issues.extend(self.validate_rule(rule));
        }

        let mut set_actions: HashMap<&str, usize> = HashMap::new();
        for rule in rules {
            if let FlowRule::HyperParameterAction(action) = rule {
                if action.action == ActionType::Set {
                    *set_actions.entry(action.parameter.as_str()).or_insert(0) += 1;
                }
            }
        }
        for (parameter, count) in set_actions {
            if count > 1 {
                issues.push(ValidationIssue::error(
                    "CONFLICTING_SET_ACTIONS",
                    format!("Multiple SET actions for parameter: {parameter}"),
                ));
            }
        }

        if rules.len() > MANY_RULES_THRESHOLD {
            issues.push(ValidationIssue::warning(
                "MANY_RULES",
                format!("Large number of rules ({}) may impact evaluation time", rules.len()),
            ));
        }

        RuleSetReport {
            issues,
            total_rules: rules.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::HyperParameterActionRule;

    use super::*;

    #[test]
    fn conflicting_set_actions_are_flagged() {
        let rules = vec![
            FlowRule::HyperParameterAction(HyperParameterActionRule {
                rule_id: Some("a".into()),
                ..HyperParameterActionRule::set("empathy", 1.0)
            }),
            FlowRule::HyperParameterAction(HyperParameterActionRule {
                rule_id: Some("b".into()),
                ..HyperParameterActionRule::set("empathy", 2.0)
            }),
        ];

        let report = RuleValidator::new().validate_rule_set(&rules);
        assert!(report.has_code("CONFLICTING_SET_ACTIONS"));
        assert!(!report.is_valid());
    }

    #[test]
    fn set_actions_on_distinct_parameters_are_fine() {
        let rules = vec![
            FlowRule::HyperParameterAction(HyperParameterActionRule::set("empathy", 1.0)),
            FlowRule::HyperParameterAction(HyperParameterActionRule::set("engagement", 2.0)),
        ];

        let report = RuleValidator::new().validate_rule_set(&rules);
        assert!(!report.has_code("CONFLICTING_SET_ACTIONS"));
        assert!(report.is_valid());
    }

    #[test]
    fn duplicate_ids_and_bad_constraints() {
        let rules = vec![
            FlowRule::HyperParameterAction(HyperParameterActionRule {
                rule_id: Some("dup".into()),
                min_value: Some(5.0),
                max_value: Some(1.0),
                ..HyperParameterActionRule::increment("p", 1.0)
            }),
            FlowRule::HyperParameterAction(HyperParameterActionRule {
                rule_id: Some("dup".into()),
                ..HyperParameterActionRule::increment("q", 1.0)
            }),
        ];

        let report = RuleValidator::new().validate_rule_set(&rules);
        assert!(report.has_code("DUPLICATE_RULE_ID"));
        assert!(report.has_code("INVALID_CONSTRAINTS"));
    }

    #[test]
    fn missing_value_is_an_error() {
        let rule = FlowRule::HyperParameterAction(HyperParameterActionRule {
            value: None,
            ..HyperParameterActionRule::increment("p", 0.0)
        });
        let issues = RuleValidator::new().validate_rule(&rule);
        assert!(issues.iter().any(|i| i.code == "MISSING_VALUE"));
    }
}
