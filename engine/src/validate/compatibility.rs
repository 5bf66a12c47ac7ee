//! Structural compatibility checks between a simulation and its detected
//! type. Issues are advisory: they are collected and logged, never thrown.
//! Callers that want a hard gate can reject on error-severity issues.

use mentora_core::{FlowNode, Simulation, SimulationKind};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use crate::detect::SimulationType;
use crate::rules::parse_rules;
use crate::validate::rules::RuleValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityValidator {
    rule_validator: RuleValidator,
}

impl CompatibilityValidator {
    pub fn new() -> Self {
        Self {
            rule_validator: RuleValidator::new(),
        }
    }

    /// Validate and log. The returned issues are the same list callers get
    /// from [`Self::issues`].
    pub fn validate(&self, simulation: &Simulation, detected: SimulationType) -> Vec<Issue> {
        let issues = self.issues(simulation, detected);
        if !issues.is_empty() {
            warn!(
                simulation = %simulation.name,
                %detected,
                issues = issues.len(),
                "compatibility issues: {}",
                issues
                    .iter()
                    .map(|i| i.message.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        issues
    }

    pub fn is_compatible(&self, simulation: &Simulation, detected: SimulationType) -> bool {
        self.issues(simulation, detected)
            .iter()
            .all(|issue| issue.severity != Severity::Error)
    }

    pub fn issues(&self, simulation: &Simulation, detected: SimulationType) -> Vec<Issue> {
        let mut issues = Vec::new();

        if simulation.name.trim().is_empty() {
            issues.push(Issue::error("Simulation name is missing"));
        }

        match detected {
            SimulationType::Legacy => self.check_legacy(simulation, &mut issues),
            SimulationType::Hybrid => {
                self.check_legacy(simulation, &mut issues);
                self.check_modern(simulation, &mut issues);
            }
            SimulationType::Modern => self.check_modern(simulation, &mut issues),
            SimulationType::AiGenerated => {
                // Absence of nodes is the expected shape here; only the
                // authoring flag is required.
                if simulation.kind != SimulationKind::AiGenerated {
                    issues.push(Issue::error(
                        "Simulation type must be AI_GENERATED for the AI engine",
                    ));
                }
            }
            SimulationType::Unknown => {
                issues.push(Issue::error("Cannot validate unknown simulation type"));
            }
        }

        issues
    }

    fn check_legacy(&self, simulation: &Simulation, issues: &mut Vec<Issue>) {
        let Some(nodes) = &simulation.nodes else {
            // Unloadable graph: nothing to inspect, and erroring here would
            // break the backward-compatibility default.
            return;
        };

        if nodes.is_empty() {
            issues.push(Issue::error("Simulation has no flow nodes"));
            return;
        }

        let mut orders = HashSet::new();
        if !nodes.iter().all(|n| orders.insert(n.order_number)) {
            issues.push(Issue::error("Simulation has duplicate order numbers"));
        }

        let has_actionable = nodes.iter().any(FlowNode::is_actionable);
        if !has_actionable {
            issues.push(Issue::error(
                "Simulation has no actionable nodes (questions/tasks)",
            ));
        }

        for node in nodes {
            check_predicate_syntax(node, issues);
        }
    }

    fn check_modern(&self, simulation: &Simulation, issues: &mut Vec<Issue>) {
        if simulation.enhanced_nodes.is_empty() {
            issues.push(Issue::error("Simulation has no rule-bearing nodes"));
            return;
        }

        for node in &simulation.enhanced_nodes {
            if !node.rules.is_null() && !node.rules.is_array() {
                issues.push(Issue::warning(format!(
                    "Node {}: rule list is not an array",
                    node.message_id
                )));
                continue;
            }
            let rules = parse_rules(&node.rules);
            if !node.rules.is_null()
                && rules.is_empty()
                && node.rules.as_array().is_some_and(|a| !a.is_empty())
            {
                issues.push(Issue::warning(format!(
                    "Node {}: rule list could not be parsed",
                    node.message_id
                )));
            }

            let report = self.rule_validator.validate_rule_set(&rules);
            issues.extend(report.issues.into_iter().map(|issue| Issue {
                severity: issue.severity,
                message: format!("Node {}: {}", node.message_id, issue.message),
            }));
        }
    }
}

fn check_predicate_syntax(node: &FlowNode, issues: &mut Vec<Issue>) {
    let predicate = node.show_predicate.trim();
    if predicate.is_empty() {
        return;
    }

    if predicate.contains("whereId") && !predicate.contains('"') {
        issues.push(Issue::error(format!(
            "Node {}: whereId predicate missing quotes",
            node.order_number
        )));
    }

    let count = |c: char| predicate.chars().filter(|&ch| ch == c).count();
    if count('(') != count(')') {
        issues.push(Issue::error(format!(
            "Node {}: unbalanced parentheses in predicate",
            node.order_number
        )));
    }
    if count('[') != count(']') {
        issues.push(Issue::error(format!(
            "Node {}: unbalanced brackets in predicate",
            node.order_number
        )));
    }

    if predicate.contains("messag.") {
        issues.push(Issue::warning(format!(
            "Node {}: possible typo 'messag' should be 'message'",
            node.order_number
        )));
    }
}
