use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Character,
}

/// Message type tags shared between nodes, messages and the generator wire
/// format. Actionable types pause the flow and wait for user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Text,
    SingleChoiceQuestion,
    SingleChoiceTask,
    MultiChoiceTask,
    EnterTextQuestion,
    HintMessage,
    ResultSimulation,
    Images,
    Videos,
}

impl MessageType {
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            MessageType::SingleChoiceQuestion
                | MessageType::SingleChoiceTask
                | MessageType::MultiChoiceTask
                | MessageType::EnterTextQuestion
        )
    }

    pub fn is_question(self) -> bool {
        self.is_actionable()
    }

    /// Parse a wire name, case-insensitively. Returns `None` for unknown
    /// types so callers can pick their own fallback.
    pub fn from_wire(value: &str) -> Option<Self> {
        let v = value.trim();
        [
            (MessageType::Text, "Text"),
            (MessageType::SingleChoiceQuestion, "SingleChoiceQuestion"),
            (MessageType::SingleChoiceTask, "SingleChoiceTask"),
            (MessageType::MultiChoiceTask, "MultiChoiceTask"),
            (MessageType::EnterTextQuestion, "EnterTextQuestion"),
            (MessageType::HintMessage, "HintMessage"),
            (MessageType::ResultSimulation, "ResultSimulation"),
            (MessageType::Images, "Images"),
            (MessageType::Videos, "Videos"),
        ]
        .into_iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(v))
        .map(|(ty, _)| ty)
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            MessageType::Text => "Text",
            MessageType::SingleChoiceQuestion => "SingleChoiceQuestion",
            MessageType::SingleChoiceTask => "SingleChoiceTask",
            MessageType::MultiChoiceTask => "MultiChoiceTask",
            MessageType::EnterTextQuestion => "EnterTextQuestion",
            MessageType::HintMessage => "HintMessage",
            MessageType::ResultSimulation => "ResultSimulation",
            MessageType::Images => "Images",
            MessageType::Videos => "Videos",
        }
    }
}

/// Type-specific message content. Option positions are 1-based everywhere:
/// authored flows, recorded answers and rule expectations all use the same
/// numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Text {
        content: String,
    },
    SingleChoiceQuestion {
        options: Vec<String>,
        correct: Option<usize>,
        answer: Option<usize>,
    },
    SingleChoiceTask {
        options: Vec<String>,
        correct: Option<usize>,
        answer: Option<usize>,
    },
    MultiChoiceTask {
        options: Vec<String>,
        correct: Vec<usize>,
        answer: Option<Vec<usize>>,
    },
    EnterTextQuestion {
        prompt: Option<String>,
        answer: Option<String>,
    },
    Hint {
        content: String,
    },
    ResultSimulation {
        content: Option<String>,
    },
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::Text { .. } => MessageType::Text,
            MessagePayload::SingleChoiceQuestion { .. } => MessageType::SingleChoiceQuestion,
            MessagePayload::SingleChoiceTask { .. } => MessageType::SingleChoiceTask,
            MessagePayload::MultiChoiceTask { .. } => MessageType::MultiChoiceTask,
            MessagePayload::EnterTextQuestion { .. } => MessageType::EnterTextQuestion,
            MessagePayload::Hint { .. } => MessageType::HintMessage,
            MessagePayload::ResultSimulation { .. } => MessageType::ResultSimulation,
        }
    }
}

/// One message in a chat. Messages form a DAG via `previous_message_id`;
/// `node_order` links a message back to the flow node that produced it (for
/// predicate lookups and transition resolution).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_message_id: Option<Uuid>,
    /// Order number of the originating flow node, when the message came from
    /// a predefined flow. Generated messages have none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_order: Option<u64>,
    pub role: ChatRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    pub interacted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_response_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_limit_ms: Option<i64>,
    pub payload: MessagePayload,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// Recorded selections for choice messages, 1-based. `None` when the
    /// message is not a choice or has not been answered.
    pub fn selected_positions(&self) -> Option<Vec<usize>> {
        match &self.payload {
            MessagePayload::SingleChoiceQuestion { answer, .. }
            | MessagePayload::SingleChoiceTask { answer, .. } => answer.map(|a| vec![a]),
            MessagePayload::MultiChoiceTask { answer, .. } => answer.clone(),
            _ => None,
        }
    }

    /// Free-text answer for enter-text messages.
    pub fn text_answer(&self) -> Option<&str> {
        match &self.payload {
            MessagePayload::EnterTextQuestion { answer, .. } => answer.as_deref(),
            _ => None,
        }
    }

    /// Human-readable content used when the message is replayed into the
    /// generator chat history.
    pub fn content_text(&self) -> String {
        match &self.payload {
            MessagePayload::Text { content } | MessagePayload::Hint { content } => content.clone(),
            MessagePayload::SingleChoiceQuestion { options, .. }
            | MessagePayload::SingleChoiceTask { options, .. }
            | MessagePayload::MultiChoiceTask { options, .. } => options.join(" || "),
            MessagePayload::EnterTextQuestion { prompt, answer } => answer
                .clone()
                .or_else(|| prompt.clone())
                .unwrap_or_default(),
            MessagePayload::ResultSimulation { content } => content.clone().unwrap_or_default(),
        }
    }
}

/// A user's answer to an actionable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerPayload {
    SingleChoice { answer: usize },
    MultiChoice { answers: Vec<usize> },
    EnterText { text: String },
    /// Non-interactive acknowledgement, e.g. the closing result card.
    Acknowledge,
}

/// Inbound user action: which message is being answered and with what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub chat_id: Uuid,
    pub message_id: Uuid,
    pub answer: AnswerPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_response_time_ms: Option<i64>,
}

/// Result of processing one user action: the messages to display next and
/// the chat's remaining hearts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatData {
    pub messages: Vec<Message>,
    pub hearts: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actionable_types_are_the_question_kinds() {
        assert!(MessageType::SingleChoiceQuestion.is_actionable());
        assert!(MessageType::MultiChoiceTask.is_actionable());
        assert!(MessageType::EnterTextQuestion.is_actionable());
        assert!(!MessageType::Text.is_actionable());
        assert!(!MessageType::ResultSimulation.is_actionable());
        assert!(!MessageType::HintMessage.is_actionable());
    }

    #[test]
    fn wire_names_round_trip() {
        for ty in [
            MessageType::Text,
            MessageType::SingleChoiceQuestion,
            MessageType::MultiChoiceTask,
            MessageType::EnterTextQuestion,
            MessageType::ResultSimulation,
        ] {
            assert_eq!(MessageType::from_wire(ty.wire_name()), Some(ty));
        }
        assert_eq!(MessageType::from_wire("enterTEXTquestion"), Some(MessageType::EnterTextQuestion));
        assert_eq!(MessageType::from_wire("Unknown"), None);
    }

    #[test]
    fn selected_positions_cover_choice_payloads() {
        let single = MessagePayload::SingleChoiceQuestion {
            options: vec!["a".into(), "b".into()],
            correct: Some(2),
            answer: Some(1),
        };
        let multi = MessagePayload::MultiChoiceTask {
            options: vec!["a".into(), "b".into(), "c".into()],
            correct: vec![1, 2],
            answer: Some(vec![1, 3]),
        };
        let msg = |payload| Message {
            id: Uuid::now_v7(),
            chat_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            previous_message_id: None,
            node_order: None,
            role: ChatRole::Character,
            character: None,
            interacted: false,
            user_response_time_ms: None,
            response_time_limit_ms: None,
            payload,
        };

        assert_eq!(msg(single).selected_positions(), Some(vec![1]));
        assert_eq!(msg(multi).selected_positions(), Some(vec![1, 3]));
        assert_eq!(
            msg(MessagePayload::Text { content: "hi".into() }).selected_positions(),
            None
        );
    }
}
