use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::context::SimulationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    #[default]
    ExactMatch,
    ContainsAny,
    ContainsAll,
    NotContains,
}

/// Compares the user's recorded selections for one answered message against
/// expected option positions (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponseRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Order number of the flow node whose answer is inspected.
    pub message_id: u64,
    #[serde(default)]
    pub expected_options: Vec<usize>,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UserResponseRule {
    pub fn evaluate(&self, context: &mut SimulationContext) -> bool {
        let selections = context.user_selections(self.message_id);
        match self.match_type {
            MatchType::ExactMatch => {
                if selections.is_empty() || self.expected_options.is_empty() {
                    return false;
                }
                to_set(&selections) == to_set(&self.expected_options)
            }
            MatchType::ContainsAny => selections
                .iter()
                .any(|s| self.expected_options.contains(s)),
            MatchType::ContainsAll => {
                let selected = to_set(&selections);
                !self.expected_options.is_empty()
                    && self.expected_options.iter().all(|e| selected.contains(e))
            }
            MatchType::NotContains => selections
                .iter()
                .all(|s| !self.expected_options.contains(s)),
        }
    }

    pub fn rule_id(&self) -> String {
        self.rule_id
            .clone()
            .unwrap_or_else(|| format!("user_response_{}", self.message_id))
    }

    pub fn description(&self) -> String {
        self.description.clone().unwrap_or_else(|| {
            format!(
                "Validate user response for message {} using {:?}",
                self.message_id, self.match_type
            )
        })
    }

    pub fn exact_match(message_id: u64, expected_options: Vec<usize>) -> Self {
        Self {
            rule_id: Some(format!("exact_match_{message_id}")),
            message_id,
            expected_options,
            match_type: MatchType::ExactMatch,
            description: None,
        }
    }
}

fn to_set(values: &[usize]) -> HashSet<usize> {
    values.iter().copied().collect()
}
