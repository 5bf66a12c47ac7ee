//! Structured flow rules for modern nodes.
//!
//! A node carries a JSON-encoded rule list; the list is parsed fail-safe
//! (unparseable JSON yields an empty list, i.e. "always show") and combined
//! with AND semantics by [`RuleEngine::evaluate_all`]. Every variant
//! evaluates independently against the [`SimulationContext`]; action-bearing
//! variants mutate the context as part of evaluation.

mod branching;
mod hyperparameter;
mod message_count;
mod time_based;
mod user_response;

pub use branching::{
    BranchAction, BranchActionKind, BranchCondition, BranchConditionKind, ComparisonOperator,
    ConditionalBranchingRule, LogicOperator,
};
pub use hyperparameter::{ActionType, HyperParameterActionRule};
pub use message_count::{ComparisonType, CountType, MessageCountRule};
pub use time_based::{TimeComparison, TimeBasedRule, TimeType};
pub use user_response::{MatchType, UserResponseRule};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::SimulationContext;
use crate::monitoring::RulePerformanceMonitor;

/// Closed family of rule variants, tagged by `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowRule {
    /// Marker: the node is part of the initial display run.
    AlwaysShow(AlwaysShowRule),
    HyperParameterAction(HyperParameterActionRule),
    MessageCount(MessageCountRule),
    TimeBased(TimeBasedRule),
    UserResponse(UserResponseRule),
    ConditionalBranching(ConditionalBranchingRule),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlwaysShowRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FlowRule {
    /// Evaluate the rule. Never fails: internal errors are logged and read
    /// as "rule did not pass".
    pub fn evaluate(&self, context: &mut SimulationContext) -> bool {
        match self {
            FlowRule::AlwaysShow(_) => true,
            FlowRule::HyperParameterAction(rule) => rule.evaluate(context),
            FlowRule::MessageCount(rule) => rule.evaluate(context),
            FlowRule::TimeBased(rule) => rule.evaluate(context),
            FlowRule::UserResponse(rule) => rule.evaluate(context),
            FlowRule::ConditionalBranching(rule) => rule.evaluate(context),
        }
    }

    pub fn rule_id(&self) -> String {
        match self {
            FlowRule::AlwaysShow(rule) => rule
                .rule_id
                .clone()
                .unwrap_or_else(|| "always_show".to_string()),
            FlowRule::HyperParameterAction(rule) => rule.rule_id(),
            FlowRule::MessageCount(rule) => rule.rule_id(),
            FlowRule::TimeBased(rule) => rule.rule_id(),
            FlowRule::UserResponse(rule) => rule.rule_id(),
            FlowRule::ConditionalBranching(rule) => rule.rule_id(),
        }
    }

    pub fn description(&self) -> String {
        match self {
            FlowRule::AlwaysShow(rule) => rule
                .description
                .clone()
                .unwrap_or_else(|| "Always show this node".to_string()),
            FlowRule::HyperParameterAction(rule) => rule.description(),
            FlowRule::MessageCount(rule) => rule.description(),
            FlowRule::TimeBased(rule) => rule.description(),
            FlowRule::UserResponse(rule) => rule.description(),
            FlowRule::ConditionalBranching(rule) => rule.description(),
        }
    }

    /// Ordering weight among competing matches. Never affects correctness.
    pub fn priority(&self) -> i32 {
        match self {
            FlowRule::AlwaysShow(_) => 1,
            FlowRule::HyperParameterAction(_) => 10,
            FlowRule::MessageCount(_) => 3,
            FlowRule::TimeBased(_) => 4,
            FlowRule::UserResponse(_) => 5,
            FlowRule::ConditionalBranching(rule) => 8 + rule.priority_boost,
        }
    }

    pub fn is_always_show(&self) -> bool {
        matches!(self, FlowRule::AlwaysShow(_))
    }
}

/// Parse a node's rule list. Anything unparseable degrades to an empty
/// list so the node stays visible rather than disappearing.
pub fn parse_rules(raw: &serde_json::Value) -> Vec<FlowRule> {
    if raw.is_null() {
        return Vec::new();
    }
    match serde_json::from_value::<Vec<FlowRule>>(raw.clone()) {
        Ok(rules) => rules,
        Err(err) => {
            warn!(%err, "unparseable rule list, treating as empty");
            Vec::new()
        }
    }
}

/// Combines rule results over a list.
#[derive(Default)]
pub struct RuleEngine {
    monitor: RulePerformanceMonitor,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn monitor(&self) -> &RulePerformanceMonitor {
        &self.monitor
    }

    /// AND across the list; an empty list is true (always show).
    pub fn evaluate_all(&self, rules: &[FlowRule], context: &mut SimulationContext) -> bool {
        if rules.is_empty() {
            return true;
        }
        for rule in rules {
            let passed = self.evaluate_timed(rule, context);
            if !passed {
                debug!(rule_id = %rule.rule_id(), "rule failed, short-circuiting");
                return false;
            }
        }
        true
    }

    /// OR across the list; an empty list is false.
    pub fn evaluate_any(&self, rules: &[FlowRule], context: &mut SimulationContext) -> bool {
        rules.iter().any(|rule| self.evaluate_timed(rule, context))
    }

    /// First passing rule, highest priority first.
    pub fn find_first_passing<'r>(
        &self,
        rules: &'r [FlowRule],
        context: &mut SimulationContext,
    ) -> Option<&'r FlowRule> {
        let mut ordered: Vec<&FlowRule> = rules.iter().collect();
        ordered.sort_by_key(|rule| std::cmp::Reverse(rule.priority()));
        ordered
            .into_iter()
            .find(|rule| self.evaluate_timed(rule, context))
    }

    fn evaluate_timed(&self, rule: &FlowRule, context: &mut SimulationContext) -> bool {
        let started = std::time::Instant::now();
        let passed = rule.evaluate(context);
        self.monitor
            .record(&rule.rule_id(), started.elapsed(), passed);
        passed
    }
}

#[cfg(test)]
mod tests {
    use mentora_core::{Chat, Simulation, SimulationKind, User};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    pub(crate) fn bare_context() -> SimulationContext {
        let chat = Chat {
            id: Uuid::now_v7(),
            user: User {
                id: Uuid::now_v7(),
                name: "Noa".into(),
                organization: None,
            },
            simulation: Simulation {
                id: Uuid::now_v7(),
                name: "Coaching".into(),
                kind: SimulationKind::Predefined,
                nodes: Some(vec![]),
                enhanced_nodes: vec![],
                skill_id: None,
            },
            skill: None,
            hearts: 5.0,
            finished: false,
            messages: vec![],
        };
        SimulationContext::from_chat(&chat)
    }

    #[test]
    fn empty_rule_list_always_shows() {
        let engine = RuleEngine::new();
        let mut context = bare_context();
        assert!(engine.evaluate_all(&[], &mut context));
        assert!(!engine.evaluate_any(&[], &mut context));
    }

    #[test]
    fn parses_tagged_rule_lists() {
        let raw = json!([
            { "kind": "always_show" },
            {
                "kind": "hyper_parameter_action",
                "type": "INCREMENT",
                "parameter": "empathy",
                "value": 2.0
            },
            {
                "kind": "message_count",
                "comparison_type": "BETWEEN",
                "min_count": 3,
                "max_count": 7
            }
        ]);

        let rules = parse_rules(&raw);
        assert_eq!(rules.len(), 3);
        assert!(rules[0].is_always_show());
        assert!(matches!(rules[1], FlowRule::HyperParameterAction(_)));
        assert!(matches!(rules[2], FlowRule::MessageCount(_)));
    }

    #[test]
    fn unparseable_rules_degrade_to_empty() {
        assert!(parse_rules(&json!({"kind": "not_a_list"})).is_empty());
        assert!(parse_rules(&json!([{"kind": "no_such_rule"}])).is_empty());
        assert!(parse_rules(&serde_json::Value::Null).is_empty());
    }

    #[test]
    fn evaluate_all_short_circuits() {
        let engine = RuleEngine::new();
        let mut context = bare_context();
        let rules = vec![
            FlowRule::MessageCount(MessageCountRule {
                rule_id: Some("needs_history".into()),
                count_type: CountType::TotalMessages,
                comparison_type: ComparisonType::GreaterEqual,
                threshold: Some(1),
                min_count: None,
                max_count: None,
                description: None,
            }),
            FlowRule::HyperParameterAction(HyperParameterActionRule {
                rule_id: Some("reward".into()),
                action: ActionType::Increment,
                parameter: "empathy".into(),
                value: Some(1.0),
                description: None,
                condition: None,
                min_value: None,
                max_value: None,
            }),
        ];

        assert!(!engine.evaluate_all(&rules, &mut context));
        // Short-circuit means the action never ran.
        assert_eq!(context.hyper_parameter("empathy"), 0.0);
    }

    #[test]
    fn first_passing_prefers_priority() {
        let engine = RuleEngine::new();
        let mut context = bare_context();
        let rules = vec![
            FlowRule::AlwaysShow(AlwaysShowRule::default()),
            FlowRule::HyperParameterAction(HyperParameterActionRule {
                rule_id: Some("boost".into()),
                action: ActionType::Set,
                parameter: "engagement".into(),
                value: Some(1.0),
                description: None,
                condition: None,
                min_value: None,
                max_value: None,
            }),
        ];

        let first = engine.find_first_passing(&rules, &mut context).unwrap();
        assert_eq!(first.rule_id(), "boost");
    }
}
