use mentora_core::ChatRole;
use serde::{Deserialize, Serialize};

use crate::context::SimulationContext;

/// Which messages the count runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountType {
    #[default]
    TotalMessages,
    UserMessages,
    SystemMessages,
    QuestionMessages,
    AnswerMessages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonType {
    Equals,
    GreaterThan,
    LessThan,
    #[default]
    GreaterEqual,
    LessEqual,
    Between,
    NotEquals,
}

/// Gates on conversation progress, e.g. "show after at least 5 messages".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCountRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub count_type: CountType,
    #[serde(default)]
    pub comparison_type: ComparisonType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MessageCountRule {
    pub fn evaluate(&self, context: &mut SimulationContext) -> bool {
        let actual = self.count(context);
        self.compare(actual)
    }

    fn count(&self, context: &SimulationContext) -> usize {
        let history = &context.message_history;
        match self.count_type {
            CountType::TotalMessages => history.len(),
            CountType::UserMessages => history
                .iter()
                .filter(|m| m.role == ChatRole::User)
                .count(),
            CountType::SystemMessages => history
                .iter()
                .filter(|m| m.role != ChatRole::User)
                .count(),
            CountType::QuestionMessages => history
                .iter()
                .filter(|m| m.message_type().is_question())
                .count(),
            CountType::AnswerMessages => history.iter().filter(|m| m.interacted).count(),
        }
    }

    fn compare(&self, actual: usize) -> bool {
        let threshold = self.threshold.unwrap_or(0);
        match self.comparison_type {
            ComparisonType::Equals => actual == threshold,
            ComparisonType::GreaterThan => actual > threshold,
            ComparisonType::LessThan => actual < threshold,
            ComparisonType::GreaterEqual => actual >= threshold,
            ComparisonType::LessEqual => actual <= threshold,
            ComparisonType::NotEquals => actual != threshold,
            ComparisonType::Between => {
                let min = self.min_count.unwrap_or(0);
                let max = self.max_count.unwrap_or(usize::MAX);
                actual >= min && actual <= max
            }
        }
    }

    pub fn rule_id(&self) -> String {
        self.rule_id.clone().unwrap_or_else(|| {
            format!(
                "message_count_{}",
                format!("{:?}", self.count_type).to_lowercase()
            )
        })
    }

    pub fn description(&self) -> String {
        match &self.description {
            Some(description) if !description.trim().is_empty() => description.clone(),
            _ if self.comparison_type == ComparisonType::Between => format!(
                "Check {:?} between {} and {}",
                self.count_type,
                self.min_count.unwrap_or(0),
                self.max_count.unwrap_or(0)
            ),
            _ => format!(
                "Check {:?} {:?} {}",
                self.count_type,
                self.comparison_type,
                self.threshold.unwrap_or(0)
            ),
        }
    }

    pub fn min_total_messages(min: usize) -> Self {
        Self {
            rule_id: Some(format!("min_total_{min}")),
            count_type: CountType::TotalMessages,
            comparison_type: ComparisonType::GreaterEqual,
            threshold: Some(min),
            min_count: None,
            max_count: None,
            description: None,
        }
    }

    pub fn between(count_type: CountType, min: usize, max: usize) -> Self {
        Self {
            rule_id: Some(format!(
                "between_{}_{min}_{max}",
                format!("{count_type:?}").to_lowercase()
            )),
            count_type,
            comparison_type: ComparisonType::Between,
            threshold: None,
            min_count: Some(min),
            max_count: Some(max),
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mentora_core::{Message, MessagePayload};
    use uuid::Uuid;

    use super::super::tests::bare_context;
    use super::*;

    fn push_messages(context: &mut SimulationContext, count: usize, role: ChatRole) {
        for _ in 0..count {
            context.add_message(Message {
                id: Uuid::now_v7(),
                chat_id: context.chat_id,
                timestamp: Utc::now(),
                previous_message_id: None,
                node_order: None,
                role,
                character: None,
                interacted: role == ChatRole::User,
                user_response_time_ms: None,
                response_time_limit_ms: None,
                payload: MessagePayload::Text { content: "m".into() },
            });
        }
    }

    #[test]
    fn between_holds_inside_the_range_only() {
        let rule = MessageCountRule::between(CountType::TotalMessages, 3, 7);

        let mut context = bare_context();
        push_messages(&mut context, 5, ChatRole::Character);
        assert!(rule.evaluate(&mut context));

        let mut context = bare_context();
        push_messages(&mut context, 2, ChatRole::Character);
        assert!(!rule.evaluate(&mut context));

        let mut context = bare_context();
        push_messages(&mut context, 8, ChatRole::Character);
        assert!(!rule.evaluate(&mut context));
    }

    #[test]
    fn user_only_count_ignores_character_messages() {
        let mut context = bare_context();
        push_messages(&mut context, 3, ChatRole::Character);
        push_messages(&mut context, 2, ChatRole::User);

        let rule = MessageCountRule {
            rule_id: None,
            count_type: CountType::UserMessages,
            comparison_type: ComparisonType::Equals,
            threshold: Some(2),
            min_count: None,
            max_count: None,
            description: None,
        };
        assert!(rule.evaluate(&mut context));
    }

    #[test]
    fn comparison_operators() {
        let mut context = bare_context();
        push_messages(&mut context, 4, ChatRole::Character);

        let rule = |comparison, threshold| MessageCountRule {
            rule_id: None,
            count_type: CountType::TotalMessages,
            comparison_type: comparison,
            threshold: Some(threshold),
            min_count: None,
            max_count: None,
            description: None,
        };

        assert!(rule(ComparisonType::GreaterThan, 3).evaluate(&mut context));
        assert!(!rule(ComparisonType::GreaterThan, 4).evaluate(&mut context));
        assert!(rule(ComparisonType::LessEqual, 4).evaluate(&mut context));
        assert!(rule(ComparisonType::NotEquals, 5).evaluate(&mut context));
        assert!(!rule(ComparisonType::LessThan, 4).evaluate(&mut context));
    }
}
