use serde::{Deserialize, Serialize};

use crate::message::MessageType;

/// Authored content carried by a flow node, materialized into a
/// [`crate::message::MessagePayload`] when the node fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeContent {
    Text {
        text: String,
    },
    SingleChoice {
        options: Vec<String>,
        /// 1-based position of the correct option.
        correct: Option<usize>,
    },
    MultiChoice {
        options: Vec<String>,
        /// 1-based positions of the correct options.
        correct: Vec<usize>,
    },
    EnterText {
        prompt: Option<String>,
    },
    Hint {
        text: String,
    },
    ResultSimulation,
}

/// Legacy graph node. `order_number` is unique per simulation;
/// `previous_order_number` points at the parent node (0 for roots).
/// An empty `show_predicate` means the node is always shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub order_number: u64,
    pub previous_order_number: u64,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub show_predicate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    pub content: NodeContent,
}

impl FlowNode {
    pub fn is_actionable(&self) -> bool {
        self.message_type.is_actionable()
    }

    pub fn has_predicate(&self) -> bool {
        !self.show_predicate.trim().is_empty()
    }
}

/// How a modern node expects the user to interact with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    TextDisplay,
    SingleChoice,
    MultiChoice,
    OpenText,
    MediaContent,
    ResultSummary,
}

impl InteractionType {
    pub fn requires_user_input(self) -> bool {
        matches!(
            self,
            InteractionType::SingleChoice | InteractionType::MultiChoice | InteractionType::OpenText
        )
    }

    pub fn from_message_type(ty: MessageType) -> Self {
        match ty {
            MessageType::SingleChoiceQuestion | MessageType::SingleChoiceTask => {
                InteractionType::SingleChoice
            }
            MessageType::MultiChoiceTask => InteractionType::MultiChoice,
            MessageType::EnterTextQuestion => InteractionType::OpenText,
            MessageType::Images | MessageType::Videos => InteractionType::MediaContent,
            MessageType::ResultSimulation => InteractionType::ResultSummary,
            MessageType::Text | MessageType::HintMessage => InteractionType::TextDisplay,
        }
    }
}

/// Modern structured node. Transitions follow `previous_message_ids`;
/// visibility is decided by the attached rule list (`rules`), kept as raw
/// JSON here and parsed fail-safe by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedNode {
    pub message_id: u64,
    #[serde(default)]
    pub previous_message_ids: Vec<u64>,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<InteractionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    /// 1-based positions of the correct options.
    #[serde(default)]
    pub correct_positions: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_limit_ms: Option<i64>,
    /// Legacy predicate escape hatch kept for migrated content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_predicate: Option<String>,
    /// Structured rule list, JSON-encoded.
    #[serde(default)]
    pub rules: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<u64>,
}

impl EnhancedNode {
    pub fn is_actionable(&self) -> bool {
        self.interaction_type
            .map(InteractionType::requires_user_input)
            .unwrap_or_else(|| self.message_type.is_actionable())
    }

    /// Migrated predicates that read or write chat state still need the
    /// legacy interpreter.
    pub fn has_complex_predicate(&self) -> bool {
        self.show_predicate
            .as_deref()
            .map(|p| p.contains("saveChatValue") || p.contains("readChatValue"))
            .unwrap_or(false)
    }
}
