use chrono::{Datelike, Timelike};
use mentora_core::ChatRole;
use serde::{Deserialize, Serialize};

use crate::context::SimulationContext;

/// Time dimension a rule observes. All values are read off the context's
/// evaluation clock, never the system clock, so results are stable within a
/// call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeType {
    #[default]
    SessionDuration,
    LastMessageTime,
    ResponseTime,
    AverageResponseTime,
    TimeOfDay,
    DayOfWeek,
    InactiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeComparison {
    Equals,
    #[default]
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Between,
    NotEquals,
}

/// Gates on timing: pacing, inactivity, hour-of-day windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBasedRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub time_type: TimeType,
    #[serde(default)]
    pub comparison: TimeComparison,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_seconds: Option<i64>,
    /// Threshold for `TIME_OF_DAY` (0-23).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_hours: Option<i64>,
    /// Threshold for `DAY_OF_WEEK` (1 = Monday .. 7 = Sunday).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_day: Option<i64>,
    #[serde(default)]
    pub warning_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TimeBasedRule {
    pub fn evaluate(&self, context: &mut SimulationContext) -> bool {
        let actual = self.time_value(context);
        let result = self.compare(actual);
        if self.warning_enabled && !result {
            tracing::warn!(
                rule_id = %self.rule_id(),
                time_type = ?self.time_type,
                actual,
                "time constraint not met"
            );
        }
        result
    }

    fn time_value(&self, context: &SimulationContext) -> i64 {
        match self.time_type {
            TimeType::SessionDuration => context.duration_seconds(),
            TimeType::LastMessageTime => context
                .last_message()
                .map(|m| (context.now - m.timestamp).num_seconds().max(0))
                .unwrap_or(0),
            TimeType::ResponseTime => context
                .last_message()
                .and_then(|m| m.user_response_time_ms)
                .map(|ms| ms / 1000)
                .unwrap_or(0),
            TimeType::AverageResponseTime => {
                let times: Vec<i64> = context
                    .message_history
                    .iter()
                    .filter_map(|m| m.user_response_time_ms)
                    .collect();
                if times.is_empty() {
                    0
                } else {
                    times.iter().sum::<i64>() / times.len() as i64 / 1000
                }
            }
            TimeType::TimeOfDay => context.now.hour() as i64,
            TimeType::DayOfWeek => context.now.weekday().number_from_monday() as i64,
            TimeType::InactiveTime => context
                .message_history
                .iter()
                .rev()
                .find(|m| m.role == ChatRole::User)
                .map(|m| (context.now - m.timestamp).num_seconds().max(0))
                .unwrap_or(0),
        }
    }

    fn threshold(&self) -> i64 {
        match self.time_type {
            TimeType::TimeOfDay => self.threshold_hours.unwrap_or(0),
            TimeType::DayOfWeek => self.threshold_day.unwrap_or(1),
            _ => self.threshold_seconds.unwrap_or(0),
        }
    }

    fn compare(&self, actual: i64) -> bool {
        match self.comparison {
            TimeComparison::Equals => actual == self.threshold(),
            TimeComparison::NotEquals => actual != self.threshold(),
            TimeComparison::GreaterThan => actual > self.threshold(),
            TimeComparison::LessThan => actual < self.threshold(),
            TimeComparison::GreaterEqual => actual >= self.threshold(),
            TimeComparison::LessEqual => actual <= self.threshold(),
            TimeComparison::Between => {
                actual >= self.min_seconds.unwrap_or(0)
                    && actual <= self.max_seconds.unwrap_or(i64::MAX)
            }
        }
    }

    pub fn rule_id(&self) -> String {
        self.rule_id.clone().unwrap_or_else(|| {
            format!(
                "time_based_{}",
                format!("{:?}", self.time_type).to_lowercase()
            )
        })
    }

    pub fn description(&self) -> String {
        match &self.description {
            Some(description) if !description.trim().is_empty() => description.clone(),
            _ if self.comparison == TimeComparison::Between => format!(
                "Check {:?} between {} and {} seconds",
                self.time_type,
                self.min_seconds.unwrap_or(0),
                self.max_seconds.unwrap_or(0)
            ),
            _ => format!(
                "Check {:?} {:?} {}",
                self.time_type,
                self.comparison,
                self.threshold()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mentora_core::{Message, MessagePayload};
    use uuid::Uuid;

    use super::super::tests::bare_context;
    use super::*;

    fn rule(time_type: TimeType, comparison: TimeComparison) -> TimeBasedRule {
        TimeBasedRule {
            rule_id: None,
            time_type,
            comparison,
            threshold_seconds: None,
            min_seconds: None,
            max_seconds: None,
            threshold_hours: None,
            threshold_day: None,
            warning_enabled: false,
            description: None,
        }
    }

    fn message_at(context: &SimulationContext, seconds_ago: i64, role: ChatRole) -> Message {
        Message {
            id: Uuid::now_v7(),
            chat_id: context.chat_id,
            timestamp: context.now - Duration::seconds(seconds_ago),
            previous_message_id: None,
            node_order: None,
            role,
            character: None,
            interacted: false,
            user_response_time_ms: None,
            response_time_limit_ms: None,
            payload: MessagePayload::Text { content: "m".into() },
        }
    }

    #[test]
    fn session_duration_uses_first_message() {
        let mut context = bare_context();
        let old = message_at(&context, 90, ChatRole::Character);
        context.started_at = old.timestamp;
        context.add_message(old);

        let mut r = rule(TimeType::SessionDuration, TimeComparison::GreaterEqual);
        r.threshold_seconds = Some(60);
        assert!(r.evaluate(&mut context));

        r.threshold_seconds = Some(120);
        assert!(!r.evaluate(&mut context));
    }

    #[test]
    fn inactive_time_tracks_last_user_message() {
        let mut context = bare_context();
        let user_msg = message_at(&context, 300, ChatRole::User);
        let bot_msg = message_at(&context, 10, ChatRole::Character);
        context.add_message(user_msg);
        context.add_message(bot_msg);

        let mut r = rule(TimeType::InactiveTime, TimeComparison::GreaterThan);
        r.threshold_seconds = Some(200);
        assert!(r.evaluate(&mut context));
    }

    #[test]
    fn between_covers_inclusive_range() {
        let mut context = bare_context();
        let old = message_at(&context, 50, ChatRole::Character);
        context.started_at = old.timestamp;
        context.add_message(old);

        let mut r = rule(TimeType::SessionDuration, TimeComparison::Between);
        r.min_seconds = Some(40);
        r.max_seconds = Some(60);
        assert!(r.evaluate(&mut context));

        r.max_seconds = Some(45);
        assert!(!r.evaluate(&mut context));
    }

    #[test]
    fn time_of_day_reads_the_context_clock() {
        let mut context = bare_context();
        let mut r = rule(TimeType::TimeOfDay, TimeComparison::Equals);
        r.threshold_hours = Some(context.now.hour() as i64);
        assert!(r.evaluate(&mut context));

        r.threshold_hours = Some((context.now.hour() as i64 + 1) % 24);
        assert!(!r.evaluate(&mut context));
    }

    #[test]
    fn average_response_time_is_seconds() {
        let mut context = bare_context();
        let mut m1 = message_at(&context, 20, ChatRole::User);
        m1.user_response_time_ms = Some(4000);
        let mut m2 = message_at(&context, 10, ChatRole::User);
        m2.user_response_time_ms = Some(2000);
        context.add_message(m1);
        context.add_message(m2);

        let mut r = rule(TimeType::AverageResponseTime, TimeComparison::Equals);
        r.threshold_seconds = Some(3);
        assert!(r.evaluate(&mut context));
    }
}
