use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::SimulationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicOperator {
    #[default]
    And,
    Or,
    Not,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchConditionKind {
    HyperParameter,
    MessageCount,
    UserResponse,
    TimeBased,
    Variable,
    Nested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Contains,
    NotContains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchCondition {
    #[serde(rename = "type")]
    pub kind: BranchConditionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(default)]
    pub operator: ComparisonOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_rule: Option<Box<ConditionalBranchingRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchActionKind {
    SetVariable,
    SetHyperParameter,
    LogMessage,
    MarkCompleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchAction {
    #[serde(rename = "type")]
    pub kind: BranchActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Composite flow control: a boolean combination of nested conditions, with
/// an ordered action list executed when the combination holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBranchingRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub logic_operator: LogicOperator,
    #[serde(default)]
    pub conditions: Vec<BranchCondition>,
    #[serde(default)]
    pub actions: Vec<BranchAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority_boost: i32,
}

impl ConditionalBranchingRule {
    pub fn evaluate(&self, context: &mut SimulationContext) -> bool {
        let result = self.evaluate_conditions(context);
        if result {
            self.execute_actions(context);
        }
        result
    }

    fn evaluate_conditions(&self, context: &mut SimulationContext) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        match self.logic_operator {
            LogicOperator::And => self
                .conditions
                .iter()
                .all(|c| evaluate_condition(c, context)),
            LogicOperator::Or => self
                .conditions
                .iter()
                .any(|c| evaluate_condition(c, context)),
            LogicOperator::Not => !self
                .conditions
                .iter()
                .all(|c| evaluate_condition(c, context)),
            LogicOperator::Xor => {
                self.conditions
                    .iter()
                    .filter(|c| evaluate_condition(c, context))
                    .count()
                    == 1
            }
        }
    }

    fn execute_actions(&self, context: &mut SimulationContext) {
        for action in &self.actions {
            match action.kind {
                BranchActionKind::SetVariable => {
                    if let Some(name) = &action.name {
                        context.variables.insert(
                            name.clone(),
                            action.value.clone().unwrap_or(serde_json::Value::Null),
                        );
                    }
                }
                BranchActionKind::SetHyperParameter => {
                    match (&action.name, action.value.as_ref().and_then(as_f64)) {
                        (Some(name), Some(value)) => context.set_hyper_parameter(name, value),
                        _ => warn!(rule_id = %self.rule_id(), "set_hyperparameter action missing name or numeric value"),
                    }
                }
                BranchActionKind::LogMessage => {
                    info!(
                        rule_id = %self.rule_id(),
                        message = %action.value.as_ref().and_then(|v| v.as_str()).unwrap_or(""),
                        "branch action"
                    );
                }
                BranchActionKind::MarkCompleted => context.mark_completed(),
            }
        }
    }

    pub fn rule_id(&self) -> String {
        self.rule_id.clone().unwrap_or_else(|| {
            format!(
                "conditional_{}",
                format!("{:?}", self.logic_operator).to_lowercase()
            )
        })
    }

    pub fn description(&self) -> String {
        match &self.description {
            Some(description) if !description.trim().is_empty() => description.clone(),
            _ => format!(
                "Conditional branching with {:?} logic ({} conditions)",
                self.logic_operator,
                self.conditions.len()
            ),
        }
    }
}

fn evaluate_condition(condition: &BranchCondition, context: &mut SimulationContext) -> bool {
    match condition.kind {
        BranchConditionKind::HyperParameter => {
            let Some(parameter) = &condition.parameter else {
                return false;
            };
            let Some(expected) = condition.value.as_ref().and_then(as_f64) else {
                return false;
            };
            compare_numbers(context.hyper_parameter(parameter), expected, condition.operator)
        }
        BranchConditionKind::MessageCount => {
            let Some(expected) = condition.value.as_ref().and_then(as_f64) else {
                return false;
            };
            compare_numbers(context.message_count() as f64, expected, condition.operator)
        }
        BranchConditionKind::UserResponse => {
            let Some(node_order) = condition
                .parameter
                .as_deref()
                .and_then(|p| p.trim().parse::<u64>().ok())
            else {
                return false;
            };
            let Some(expected) = condition.value.as_ref().and_then(as_usize_list) else {
                return false;
            };
            let mut selections = context.user_selections(node_order);
            selections.sort_unstable();
            let mut expected_sorted = expected.clone();
            expected_sorted.sort_unstable();
            match condition.operator {
                ComparisonOperator::Equals => selections == expected_sorted,
                ComparisonOperator::Contains => {
                    expected.iter().all(|e| selections.contains(e))
                }
                ComparisonOperator::NotContains => {
                    !expected.iter().all(|e| selections.contains(e))
                }
                _ => false,
            }
        }
        BranchConditionKind::TimeBased => {
            let Some(expected) = condition.value.as_ref().and_then(as_f64) else {
                return false;
            };
            compare_numbers(
                context.duration_seconds() as f64,
                expected,
                condition.operator,
            )
        }
        BranchConditionKind::Variable => {
            let actual = condition
                .parameter
                .as_ref()
                .and_then(|name| context.variables.get(name));
            let expected = condition.value.as_ref();
            match condition.operator {
                ComparisonOperator::Equals => actual == expected,
                ComparisonOperator::NotEquals => actual != expected,
                _ => false,
            }
        }
        BranchConditionKind::Nested => condition
            .nested_rule
            .as_ref()
            .map(|rule| rule.evaluate(context))
            .unwrap_or(false),
    }
}

fn compare_numbers(actual: f64, expected: f64, operator: ComparisonOperator) -> bool {
    match operator {
        ComparisonOperator::Equals => actual == expected,
        ComparisonOperator::NotEquals => actual != expected,
        ComparisonOperator::GreaterThan => actual > expected,
        ComparisonOperator::LessThan => actual < expected,
        ComparisonOperator::GreaterEqual => actual >= expected,
        ComparisonOperator::LessEqual => actual <= expected,
        ComparisonOperator::Contains | ComparisonOperator::NotContains => false,
    }
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_usize_list(value: &serde_json::Value) -> Option<Vec<usize>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|item| item.as_u64().map(|n| n as usize))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::tests::bare_context;
    use super::*;

    fn hyper_condition(parameter: &str, operator: ComparisonOperator, value: f64) -> BranchCondition {
        BranchCondition {
            kind: BranchConditionKind::HyperParameter,
            parameter: Some(parameter.into()),
            operator,
            value: Some(json!(value)),
            nested_rule: None,
            description: None,
        }
    }

    fn rule(
        operator: LogicOperator,
        conditions: Vec<BranchCondition>,
        actions: Vec<BranchAction>,
    ) -> ConditionalBranchingRule {
        ConditionalBranchingRule {
            rule_id: Some("branch".into()),
            logic_operator: operator,
            conditions,
            actions,
            description: None,
            priority_boost: 0,
        }
    }

    #[test]
    fn empty_conditions_hold() {
        let mut context = bare_context();
        assert!(rule(LogicOperator::And, vec![], vec![]).evaluate(&mut context));
    }

    #[test]
    fn and_or_not_xor_combinators() {
        let mut context = bare_context();
        context.seed_hyper_parameter("empathy", 5.0);
        context.seed_hyper_parameter("engagement", 1.0);

        let high_empathy = hyper_condition("empathy", ComparisonOperator::GreaterThan, 3.0);
        let high_engagement = hyper_condition("engagement", ComparisonOperator::GreaterThan, 3.0);

        assert!(
            rule(
                LogicOperator::Or,
                vec![high_empathy.clone(), high_engagement.clone()],
                vec![]
            )
            .evaluate(&mut context)
        );
        assert!(
            !rule(
                LogicOperator::And,
                vec![high_empathy.clone(), high_engagement.clone()],
                vec![]
            )
            .evaluate(&mut context)
        );
        assert!(
            rule(
                LogicOperator::Xor,
                vec![high_empathy.clone(), high_engagement.clone()],
                vec![]
            )
            .evaluate(&mut context)
        );
        assert!(
            rule(LogicOperator::Not, vec![high_engagement], vec![]).evaluate(&mut context)
        );
    }

    #[test]
    fn actions_run_only_on_success() {
        let mut context = bare_context();
        context.seed_hyper_parameter("empathy", 5.0);

        let actions = vec![
            BranchAction {
                kind: BranchActionKind::SetVariable,
                name: Some("path".into()),
                value: Some(json!("supportive")),
                description: None,
            },
            BranchAction {
                kind: BranchActionKind::SetHyperParameter,
                name: Some("collaboration".into()),
                value: Some(json!(2.0)),
                description: None,
            },
            BranchAction {
                kind: BranchActionKind::MarkCompleted,
                name: None,
                value: None,
                description: None,
            },
        ];

        let failing = rule(
            LogicOperator::And,
            vec![hyper_condition("empathy", ComparisonOperator::LessThan, 1.0)],
            actions.clone(),
        );
        assert!(!failing.evaluate(&mut context));
        assert!(!context.completed);
        assert!(context.variables.is_empty());

        let passing = rule(
            LogicOperator::And,
            vec![hyper_condition("empathy", ComparisonOperator::GreaterThan, 3.0)],
            actions,
        );
        assert!(passing.evaluate(&mut context));
        assert_eq!(context.variables.get("path"), Some(&json!("supportive")));
        assert_eq!(context.hyper_parameter("collaboration"), 2.0);
        assert!(context.completed);
    }

    #[test]
    fn variable_conditions_compare_scratch_state() {
        let mut context = bare_context();
        context.variables.insert("path".into(), json!("supportive"));

        let condition = BranchCondition {
            kind: BranchConditionKind::Variable,
            parameter: Some("path".into()),
            operator: ComparisonOperator::Equals,
            value: Some(json!("supportive")),
            nested_rule: None,
            description: None,
        };
        assert!(rule(LogicOperator::And, vec![condition.clone()], vec![]).evaluate(&mut context));

        let missing = BranchCondition {
            parameter: Some("unset".into()),
            ..condition
        };
        assert!(!rule(LogicOperator::And, vec![missing], vec![]).evaluate(&mut context));
    }

    #[test]
    fn nested_rules_recurse() {
        let mut context = bare_context();
        context.seed_hyper_parameter("empathy", 5.0);

        let inner = rule(
            LogicOperator::And,
            vec![hyper_condition("empathy", ComparisonOperator::GreaterThan, 3.0)],
            vec![],
        );
        let outer = rule(
            LogicOperator::And,
            vec![BranchCondition {
                kind: BranchConditionKind::Nested,
                parameter: None,
                operator: ComparisonOperator::Equals,
                value: None,
                nested_rule: Some(Box::new(inner)),
                description: None,
            }],
            vec![],
        );
        assert!(outer.evaluate(&mut context));
    }

    #[test]
    fn round_trips_through_json() {
        let raw = json!({
            "rule_id": "escalate",
            "logic_operator": "AND",
            "conditions": [
                { "type": "HYPER_PARAMETER", "parameter": "empathy", "operator": "GREATER_EQUAL", "value": 3 },
                { "type": "MESSAGE_COUNT", "operator": "GREATER_THAN", "value": 4 }
            ],
            "actions": [
                { "type": "set_variable", "name": "branch", "value": "escalation" },
                { "type": "mark_completed" }
            ]
        });

        let rule: ConditionalBranchingRule = serde_json::from_value(raw).unwrap();
        assert_eq!(rule.conditions.len(), 2);
        assert_eq!(rule.actions.len(), 2);
        assert_eq!(rule.actions[1].kind, BranchActionKind::MarkCompleted);
    }
}
