//! Content-generator (LLM) boundary.
//!
//! The engine consumes the generator as an opaque, fallible collaborator:
//! `Ok` responses mean the collaborator reported success; transport
//! failures, timeouts, malformed payloads and explicit rejections all
//! surface as [`GeneratorError`]. How callers react is policy that lives in
//! the engines and the runtime, not here.

mod http;

pub use http::HttpContentGenerator;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("content generation disabled by configuration")]
    Disabled,
    #[error("generator request failed: {0}")]
    Transport(String),
    #[error("generator request timed out")]
    Timeout,
    #[error("generator returned malformed payload: {0}")]
    Malformed(String),
    #[error("generator rejected the request: {0}")]
    Rejected(String),
}

/// One prior message replayed to the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    pub message_id: Uuid,
    pub message_type: String,
    /// "USER" or "ASSISTANT".
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub requires_response: bool,
}

/// The user action that triggered this generation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessagePayload {
    pub message_id: String,
    pub message_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_options: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationContextPayload {
    pub simulation_name: String,
    pub simulation_description: String,
    pub learning_objectives: String,
    pub character_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationPayload {
    pub name: String,
    pub industry: String,
    pub size: String,
    pub localization: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillPayload {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMaterialPayload {
    pub filename: String,
    pub content: String,
}

/// Per-turn generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub simulation_id: Uuid,
    pub chat_id: Uuid,
    pub chat_history: Vec<ChatHistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<UserMessagePayload>,
    pub simulation_context: SimulationContextPayload,
    pub hyper_parameters: HashMap<String, f64>,
    pub organization_context: OrganizationPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skill_materials: Vec<SkillMaterialPayload>,
}

/// First-turn request for a brand-new chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub simulation_id: Uuid,
    pub chat_id: Uuid,
    pub skill: SkillPayload,
    pub simulation_context: SimulationContextPayload,
    pub organization_context: OrganizationPayload,
    pub initial_hyper_parameters: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skill_materials: Vec<SkillMaterialPayload>,
}

/// A message descriptor produced by the generator, converted into a typed
/// message entity by the content engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_limit_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub messages: Vec<GeneratedMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_hyper_parameters: Option<HashMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_ended: Option<bool>,
}

/// Real-time content collaborator. Implementations must be treated as slow
/// and fallible; callers own all fallback policy.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn initialize(
        &self,
        request: InitializeRequest,
    ) -> Result<GenerationResponse, GeneratorError>;

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_defaults_tolerate_sparse_payloads() {
        let response: GenerationResponse =
            serde_json::from_str(r#"{ "success": true }"#).unwrap();
        assert!(response.success);
        assert!(response.messages.is_empty());
        assert!(response.updated_hyper_parameters.is_none());
        assert!(response.conversation_ended.is_none());
    }

    #[test]
    fn generated_message_parses_wire_shape() {
        let raw = r#"{
            "message_type": "SingleChoiceQuestion",
            "options": ["Listen first", "Interrupt"],
            "character_name": "Jordan",
            "response_time_limit_ms": 30000
        }"#;
        let message: GeneratedMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.options.len(), 2);
        assert!(message.content.is_none());
    }
}
