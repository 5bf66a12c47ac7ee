use uuid::Uuid;

use crate::generator::GeneratorError;
use crate::store::StoreError;

/// Failures surfaced by the runtime and engines.
///
/// Evaluation problems (predicates, rules) never appear here — they fail
/// safe to "hide the node" during traversal. What does appear is the hard
/// stuff: infrastructure failures, collaborator failures that the runtime's
/// no-fallback policy refuses to mask, and processing errors after the
/// legacy retry was exhausted.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Chat was not visible to the read path even after bounded retries.
    #[error("chat {0} not found")]
    ChatNotFound(Uuid),

    /// The message being answered does not exist in the chat.
    #[error("message {message_id} not found in chat {chat_id}")]
    MessageNotFound { chat_id: Uuid, message_id: Uuid },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("content generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// Engine-level processing failure (after any permitted fallback).
    #[error("{engine} engine failed: {reason}")]
    Processing {
        engine: &'static str,
        reason: String,
    },
}

impl EngineError {
    pub fn processing(engine: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Processing {
            engine,
            reason: reason.into(),
        }
    }
}
