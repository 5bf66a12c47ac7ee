use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::SimulationContext;

/// How a hyperparameter action combines the current value with the rule's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Set,
    Increment,
    Decrement,
    Multiply,
    Min,
    Max,
}

/// Mutates one hyperparameter as part of evaluation. The rule itself passes
/// once the action has been applied (or skipped by its inline condition);
/// application is idempotent per rule id and triggering message.
///
/// Replaces predicate spellings like
/// `saveChatValue["active_listening", readChatValue["active_listening"]+2]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParameterActionRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(rename = "type")]
    pub action: ActionType,
    pub parameter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional inline gate of the form `"<parameter> > <threshold>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

impl HyperParameterActionRule {
    pub fn evaluate(&self, context: &mut SimulationContext) -> bool {
        if let Some(condition) = &self.condition {
            if !evaluate_condition(condition, context) {
                debug!(rule_id = %self.rule_id(), condition, "condition not met, action skipped");
                return true;
            }
        }

        let trigger = context
            .last_message()
            .map(|m| m.id.to_string())
            .unwrap_or_default();
        if !context.claim_action(format!("{}@{}", self.rule_id(), trigger)) {
            debug!(rule_id = %self.rule_id(), "action already applied for this trigger");
            return true;
        }

        let current = context.hyper_parameter(&self.parameter);
        let operand = self.value.unwrap_or(0.0);
        let updated = match self.action {
            ActionType::Set => operand,
            ActionType::Increment => current + operand,
            ActionType::Decrement => current - operand,
            ActionType::Multiply => current * operand,
            ActionType::Min => current.min(operand),
            ActionType::Max => current.max(operand),
        };
        let updated = self.apply_constraints(updated);

        context.set_hyper_parameter(&self.parameter, updated);
        debug!(
            parameter = %self.parameter,
            from = current,
            to = updated,
            action = ?self.action,
            "hyperparameter action applied"
        );
        true
    }

    fn apply_constraints(&self, value: f64) -> f64 {
        let mut constrained = value;
        if let Some(min) = self.min_value {
            constrained = constrained.max(min);
        }
        if let Some(max) = self.max_value {
            constrained = constrained.min(max);
        }
        constrained
    }

    pub fn rule_id(&self) -> String {
        self.rule_id.clone().unwrap_or_else(|| {
            format!(
                "{}_{}",
                format!("{:?}", self.action).to_lowercase(),
                self.parameter
            )
        })
    }

    pub fn description(&self) -> String {
        match &self.description {
            Some(description) if !description.trim().is_empty() => description.clone(),
            _ => format!(
                "{:?} {} by {}",
                self.action,
                self.parameter,
                self.value.unwrap_or(0.0)
            ),
        }
    }

    pub fn increment(parameter: &str, value: f64) -> Self {
        Self {
            rule_id: Some(format!("increment_{parameter}")),
            action: ActionType::Increment,
            parameter: parameter.to_string(),
            value: Some(value),
            description: None,
            condition: None,
            min_value: None,
            max_value: None,
        }
    }

    pub fn set(parameter: &str, value: f64) -> Self {
        Self {
            rule_id: Some(format!("set_{parameter}")),
            action: ActionType::Set,
            parameter: parameter.to_string(),
            value: Some(value),
            description: None,
            condition: None,
            min_value: None,
            max_value: None,
        }
    }
}

/// Inline condition grammar is intentionally tiny: `name > number`.
/// Anything else passes, matching the permissive legacy behavior.
fn evaluate_condition(condition: &str, context: &SimulationContext) -> bool {
    if let Some((parameter, threshold)) = condition.split_once('>') {
        if let Ok(threshold) = threshold.trim().parse::<f64>() {
            return context.hyper_parameter(parameter.trim()) > threshold;
        }
        warn!(condition, "malformed condition threshold, treating as met");
    }
    true
}
