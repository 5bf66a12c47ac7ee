//! Materializes flow nodes and generator output into typed messages, and
//! records user answers back onto question messages.

use chrono::Utc;
use mentora_core::{
    AnswerPayload, ChatRole, EnhancedNode, FlowNode, Message, MessagePayload, MessageRequest,
    MessageType, NodeContent,
};
use tracing::warn;
use uuid::Uuid;

use crate::generator::GeneratedMessage;

/// Outcome of judging a recorded answer against the authored solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correctness {
    Correct,
    PartiallyIncorrect,
    Incorrect,
    /// Free-text and acknowledgements carry no judgment.
    NotJudged,
}

impl Correctness {
    /// Hearts adjustment for this outcome. Wrong answers cost a heart,
    /// half-right multi-choice answers cost half.
    pub fn hearts_delta(self) -> f64 {
        match self {
            Correctness::Correct | Correctness::NotJudged => 0.0,
            Correctness::PartiallyIncorrect => -0.5,
            Correctness::Incorrect => -1.0,
        }
    }
}

pub struct ContentEngine;

impl ContentEngine {
    /// Materialize either node family.
    pub fn materialize_candidate(
        node: &super::CandidateNode,
        chat_id: Uuid,
        previous_message_id: Option<Uuid>,
    ) -> Message {
        match node {
            super::CandidateNode::Legacy(node) => {
                Self::materialize_legacy(node, chat_id, previous_message_id)
            }
            super::CandidateNode::Enhanced(node) => {
                Self::materialize_enhanced(node, chat_id, previous_message_id)
            }
        }
    }

    /// Build the message a legacy node displays.
    pub fn materialize_legacy(
        node: &FlowNode,
        chat_id: Uuid,
        previous_message_id: Option<Uuid>,
    ) -> Message {
        let payload = match &node.content {
            NodeContent::Text { text } => MessagePayload::Text { content: text.clone() },
            NodeContent::SingleChoice { options, correct } => match node.message_type {
                MessageType::SingleChoiceTask => MessagePayload::SingleChoiceTask {
                    options: options.clone(),
                    correct: *correct,
                    answer: None,
                },
                _ => MessagePayload::SingleChoiceQuestion {
                    options: options.clone(),
                    correct: *correct,
                    answer: None,
                },
            },
            NodeContent::MultiChoice { options, correct } => MessagePayload::MultiChoiceTask {
                options: options.clone(),
                correct: correct.clone(),
                answer: None,
            },
            NodeContent::EnterText { prompt } => MessagePayload::EnterTextQuestion {
                prompt: prompt.clone(),
                answer: None,
            },
            NodeContent::Hint { text } => MessagePayload::Hint { content: text.clone() },
            NodeContent::ResultSimulation => MessagePayload::ResultSimulation { content: None },
        };

        Message {
            id: Uuid::now_v7(),
            chat_id,
            timestamp: Utc::now(),
            previous_message_id,
            node_order: Some(node.order_number),
            role: ChatRole::Character,
            character: node.character.clone(),
            interacted: false,
            user_response_time_ms: None,
            response_time_limit_ms: None,
            payload,
        }
    }

    /// Build the message an enhanced node displays. Complete conversion
    /// across all interaction kinds; nothing is left to a placeholder.
    pub fn materialize_enhanced(
        node: &EnhancedNode,
        chat_id: Uuid,
        previous_message_id: Option<Uuid>,
    ) -> Message {
        let text = node.text.clone().unwrap_or_default();
        let payload = match node.message_type {
            MessageType::SingleChoiceQuestion => MessagePayload::SingleChoiceQuestion {
                options: node.options.clone(),
                correct: node.correct_positions.first().copied(),
                answer: None,
            },
            MessageType::SingleChoiceTask => MessagePayload::SingleChoiceTask {
                options: node.options.clone(),
                correct: node.correct_positions.first().copied(),
                answer: None,
            },
            MessageType::MultiChoiceTask => MessagePayload::MultiChoiceTask {
                options: node.options.clone(),
                correct: node.correct_positions.clone(),
                answer: None,
            },
            MessageType::EnterTextQuestion => MessagePayload::EnterTextQuestion {
                prompt: node.text.clone(),
                answer: None,
            },
            MessageType::HintMessage => MessagePayload::Hint { content: text },
            MessageType::ResultSimulation => MessagePayload::ResultSimulation {
                content: node.text.clone(),
            },
            MessageType::Text | MessageType::Images | MessageType::Videos => {
                MessagePayload::Text { content: text }
            }
        };

        Message {
            id: Uuid::now_v7(),
            chat_id,
            timestamp: Utc::now(),
            previous_message_id,
            node_order: Some(node.message_id),
            role: ChatRole::Character,
            character: node.character.clone(),
            interacted: false,
            user_response_time_ms: None,
            response_time_limit_ms: node.response_time_limit_ms,
            payload,
        }
    }

    /// Convert a generator message descriptor into a typed message.
    /// Unknown types degrade to plain text rather than failing the turn.
    pub fn materialize_generated(
        descriptor: &GeneratedMessage,
        chat_id: Uuid,
        previous_message_id: Option<Uuid>,
    ) -> Message {
        let message_type = MessageType::from_wire(&descriptor.message_type).unwrap_or_else(|| {
            warn!(message_type = %descriptor.message_type, "unknown generated message type, using text");
            MessageType::Text
        });
        let content = descriptor.content.clone().unwrap_or_default();
        let options = if descriptor.options.is_empty() {
            vec!["Option A".to_string(), "Option B".to_string(), "Option C".to_string()]
        } else {
            descriptor.options.clone()
        };

        let payload = match message_type {
            MessageType::SingleChoiceQuestion => MessagePayload::SingleChoiceQuestion {
                options,
                correct: None,
                answer: None,
            },
            MessageType::SingleChoiceTask => MessagePayload::SingleChoiceTask {
                options,
                correct: None,
                answer: None,
            },
            MessageType::MultiChoiceTask => MessagePayload::MultiChoiceTask {
                options,
                correct: vec![],
                answer: None,
            },
            MessageType::EnterTextQuestion => MessagePayload::EnterTextQuestion {
                prompt: descriptor.content.clone(),
                answer: None,
            },
            MessageType::ResultSimulation => MessagePayload::ResultSimulation {
                content: descriptor.content.clone(),
            },
            MessageType::HintMessage => MessagePayload::Hint { content },
            MessageType::Text | MessageType::Images | MessageType::Videos => {
                MessagePayload::Text { content }
            }
        };

        Message {
            id: Uuid::now_v7(),
            chat_id,
            timestamp: Utc::now(),
            previous_message_id,
            node_order: None,
            role: ChatRole::Character,
            character: descriptor.character_name.clone(),
            interacted: false,
            user_response_time_ms: None,
            response_time_limit_ms: descriptor.response_time_limit_ms,
            payload,
        }
    }

    /// Record a user's answer on the question message and judge it. The
    /// message flips to the user's side of the conversation, like the
    /// answered message the client renders.
    pub fn record_answer(message: &mut Message, request: &MessageRequest) -> Correctness {
        let correctness = match (&mut message.payload, &request.answer) {
            (
                MessagePayload::SingleChoiceQuestion { correct, answer, .. }
                | MessagePayload::SingleChoiceTask { correct, answer, .. },
                AnswerPayload::SingleChoice { answer: chosen },
            ) => {
                *answer = Some(*chosen);
                match correct {
                    Some(correct) if correct == chosen => Correctness::Correct,
                    Some(_) => Correctness::Incorrect,
                    None => Correctness::NotJudged,
                }
            }
            (
                MessagePayload::MultiChoiceTask { correct, answer, .. },
                AnswerPayload::MultiChoice { answers: chosen },
            ) => {
                let mut chosen_sorted = chosen.clone();
                chosen_sorted.sort_unstable();
                chosen_sorted.dedup();
                *answer = Some(chosen_sorted.clone());

                if correct.is_empty() {
                    Correctness::NotJudged
                } else {
                    let mut expected = correct.clone();
                    expected.sort_unstable();
                    let overlap = chosen_sorted
                        .iter()
                        .filter(|&c| expected.contains(c))
                        .count();
                    if chosen_sorted == expected {
                        Correctness::Correct
                    } else if overlap == 0 {
                        Correctness::Incorrect
                    } else {
                        Correctness::PartiallyIncorrect
                    }
                }
            }
            (
                MessagePayload::EnterTextQuestion { answer, .. },
                AnswerPayload::EnterText { text },
            ) => {
                *answer = Some(text.clone());
                Correctness::NotJudged
            }
            (MessagePayload::ResultSimulation { .. }, AnswerPayload::Acknowledge) => {
                Correctness::NotJudged
            }
            (payload, answer) => {
                warn!(
                    message_type = ?payload.message_type(),
                    answer = ?answer,
                    "answer does not match message type, recording nothing"
                );
                return Correctness::NotJudged;
            }
        };

        message.interacted = true;
        message.role = ChatRole::User;
        message.user_response_time_ms = request.user_response_time_ms;
        correctness
    }
}
