use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use mentora_core::{
    AnswerPayload, ChatData, ChatRole, Message, MessagePayload, MessageRequest,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EngineMetrics, flush_hyper_parameters};
use crate::context::SimulationContext;
use crate::error::EngineError;
use crate::flow::content::ContentEngine;
use crate::generator::{
    ChatHistoryEntry, ContentGenerator, GenerationRequest, GenerationResponse, InitializeRequest,
    OrganizationPayload, SimulationContextPayload, SkillMaterialPayload, SkillPayload,
    UserMessagePayload,
};
use crate::store::StoreTransaction;

const INITIAL_OBJECTIVE_SCORE: f64 = 0.5;

/// Processor for simulations with no predefined graph: every turn is
/// composed in real time by the content-generator collaborator.
///
/// Fallback policy lives here for initialization and final messages only
/// (locally synthesized placeholders). Per-turn generation failures are
/// propagated so the runtime's no-downgrade policy can take effect.
pub struct AiGeneratedEngine {
    generator: Arc<dyn ContentGenerator>,
    metrics: EngineMetrics,
}

impl AiGeneratedEngine {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            generator,
            metrics: EngineMetrics::new("ai-generated-1.0"),
        }
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub async fn process_user_message(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
        request: &MessageRequest,
    ) -> Result<ChatData, EngineError> {
        let started = Instant::now();
        let result = self.process_inner(tx, context, request).await;
        match &result {
            Ok(_) => self.metrics.record_processed(started.elapsed()),
            Err(_) => self.metrics.record_error(),
        }
        result
    }

    async fn process_inner(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
        request: &MessageRequest,
    ) -> Result<ChatData, EngineError> {
        // Record the answer on the interacted message when it exists;
        // generation can proceed either way.
        let answered = self.record_answer(tx, context, request).await?;

        let generation_request = self.build_generation_request(context, Some(request));
        let response = self.generator.generate(generation_request).await?;

        let generated = self.store_generated_messages(tx, context, &response).await?;
        self.apply_hyper_parameter_updates(context, &response);
        flush_hyper_parameters(tx, context).await?;

        if response.conversation_ended.unwrap_or(false) {
            context.mark_completed();
            tx.mark_chat_finished(context.chat_id).await?;
            info!(chat_id = %context.chat_id, "conversation ended by generator");
        }

        let mut messages = Vec::new();
        messages.extend(answered);
        messages.extend(generated);
        debug!(
            chat_id = %context.chat_id,
            returned = messages.len(),
            "ai-generated processing complete"
        );
        Ok(ChatData {
            messages,
            hearts: context.hearts,
        })
    }

    pub async fn initialize_simulation(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
    ) -> Result<Vec<Message>, EngineError> {
        let started = Instant::now();

        let request = self.build_initialize_request(context);
        let messages = match self.generator.initialize(request).await {
            Ok(response) => {
                let messages = self.store_generated_messages(tx, context, &response).await?;
                self.apply_hyper_parameter_updates(context, &response);
                flush_hyper_parameters(tx, context).await?;
                messages
            }
            Err(err) => {
                warn!(%err, chat_id = %context.chat_id, "generator unavailable at init, using fallback messages");
                self.fallback_initial_messages(tx, context).await
            }
        };

        self.metrics.record_initialized(started.elapsed());
        Ok(messages)
    }

    pub async fn generate_final_message(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
    ) -> Result<Message, EngineError> {
        let mut request = self.build_generation_request(context, None);
        request.user_message = Some(UserMessagePayload {
            message_id: "final-message-request".to_string(),
            message_type: "Text".to_string(),
            content: "Generate a final summary and conclusion message for this simulation."
                .to_string(),
            selected_options: vec![],
            response_time_ms: None,
        });

        match self.generator.generate(request).await {
            Ok(response) if !response.messages.is_empty() => {
                let previous = context.last_message().map(|m| m.id);
                let message = ContentEngine::materialize_generated(
                    &response.messages[0],
                    context.chat_id,
                    previous,
                );
                match tx.save_message(message.clone()).await {
                    Ok(saved) => Ok(saved),
                    Err(err) => {
                        warn!(%err, "could not persist final message, returning unsaved");
                        Ok(message)
                    }
                }
            }
            Ok(_) => {
                warn!(chat_id = %context.chat_id, "generator returned no final message, using fallback");
                self.fallback_final_message(tx, context).await
            }
            Err(err) => {
                warn!(%err, chat_id = %context.chat_id, "generator failed for final message, using fallback");
                self.fallback_final_message(tx, context).await
            }
        }
    }

    pub fn can_handle(&self, context: &SimulationContext) -> bool {
        context.simulation.kind == mentora_core::SimulationKind::AiGenerated
    }

    pub fn validate_simulation(&self, context: &SimulationContext) -> Vec<String> {
        let mut issues = Vec::new();
        if context.simulation.kind != mentora_core::SimulationKind::AiGenerated {
            issues.push("Simulation type must be AI_GENERATED".to_string());
        }
        if context.simulation.name.trim().is_empty() {
            issues.push("Simulation name is required for AI generation".to_string());
        }
        issues
    }

    pub fn is_simulation_complete(&self, context: &SimulationContext) -> bool {
        context.completed || context.hearts <= 0.0
    }

    async fn record_answer(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
        request: &MessageRequest,
    ) -> Result<Option<Message>, EngineError> {
        let Some(position) = context
            .message_history
            .iter()
            .position(|m| m.id == request.message_id)
        else {
            warn!(
                chat_id = %context.chat_id,
                message_id = %request.message_id,
                "answered message not found, generating without it"
            );
            return Ok(None);
        };

        let mut answered = context.message_history[position].clone();
        ContentEngine::record_answer(&mut answered, request);
        let answered = tx.save_message(answered).await?;
        context.message_history[position] = answered.clone();
        Ok(Some(answered))
    }

    async fn store_generated_messages(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
        response: &GenerationResponse,
    ) -> Result<Vec<Message>, EngineError> {
        let mut stored = Vec::new();
        let mut previous = context.last_message().map(|m| m.id);
        for descriptor in &response.messages {
            let message =
                ContentEngine::materialize_generated(descriptor, context.chat_id, previous);
            let saved = tx.save_message(message).await?;
            previous = Some(saved.id);
            context.add_message(saved.clone());
            stored.push(saved);
        }
        Ok(stored)
    }

    fn apply_hyper_parameter_updates(
        &self,
        context: &mut SimulationContext,
        response: &GenerationResponse,
    ) {
        if let Some(updates) = &response.updated_hyper_parameters {
            for (key, value) in updates {
                context.set_hyper_parameter(key, *value);
            }
        }
    }

    fn build_generation_request(
        &self,
        context: &SimulationContext,
        request: Option<&MessageRequest>,
    ) -> GenerationRequest {
        GenerationRequest {
            simulation_id: context.simulation.id,
            chat_id: context.chat_id,
            chat_history: build_chat_history(context),
            user_message: request.map(|r| build_user_message(context, r)),
            simulation_context: build_simulation_context(context),
            hyper_parameters: context.hyper_parameters().clone(),
            organization_context: build_organization_context(context),
            skill_materials: build_skill_materials(context),
        }
    }

    fn build_initialize_request(&self, context: &SimulationContext) -> InitializeRequest {
        let skill = match &context.skill {
            Some(skill) => SkillPayload {
                name: skill.name.clone(),
                description: skill
                    .description
                    .clone()
                    .unwrap_or_else(|| "General workplace simulation skill".to_string()),
                objectives: skill.objectives.clone(),
            },
            None => SkillPayload {
                name: "Default Skill".to_string(),
                description: "General workplace simulation skill".to_string(),
                objectives: vec![],
            },
        };

        InitializeRequest {
            simulation_id: context.simulation.id,
            chat_id: context.chat_id,
            skill,
            simulation_context: build_simulation_context(context),
            organization_context: build_organization_context(context),
            initial_hyper_parameters: context
                .learning_objectives
                .iter()
                .map(|objective| (objective.clone(), INITIAL_OBJECTIVE_SCORE))
                .collect::<HashMap<_, _>>(),
            skill_materials: build_skill_materials(context),
        }
    }

    /// Locally synthesized greeting pair used when the collaborator cannot
    /// produce the opening turn. Saves are best effort.
    async fn fallback_initial_messages(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
    ) -> Vec<Message> {
        let welcome = Message {
            id: Uuid::now_v7(),
            chat_id: context.chat_id,
            timestamp: Utc::now(),
            previous_message_id: None,
            node_order: None,
            role: ChatRole::Character,
            character: Some("AI Assistant".to_string()),
            interacted: false,
            user_response_time_ms: None,
            response_time_limit_ms: None,
            payload: MessagePayload::Text {
                content: "We are so sorry, but the dynamic simulation is currently unavailable. \
                          Please try again later or contact support if this issue persists."
                    .to_string(),
            },
        };
        let closing = Message {
            id: Uuid::now_v7(),
            chat_id: context.chat_id,
            timestamp: Utc::now(),
            previous_message_id: Some(welcome.id),
            node_order: None,
            role: ChatRole::Character,
            character: Some("AI Assistant".to_string()),
            interacted: false,
            user_response_time_ms: None,
            response_time_limit_ms: None,
            payload: MessagePayload::ResultSimulation { content: None },
        };

        let mut messages = Vec::new();
        for message in [welcome, closing] {
            match tx.save_message(message.clone()).await {
                Ok(saved) => {
                    context.add_message(saved.clone());
                    messages.push(saved);
                }
                Err(err) => {
                    warn!(%err, "could not persist fallback message, returning unsaved");
                    messages.push(message);
                }
            }
        }
        messages
    }

    async fn fallback_final_message(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
    ) -> Result<Message, EngineError> {
        let message = Message {
            id: Uuid::now_v7(),
            chat_id: context.chat_id,
            timestamp: Utc::now(),
            previous_message_id: context.last_message().map(|m| m.id),
            node_order: None,
            role: ChatRole::Character,
            character: Some("AI Assistant".to_string()),
            interacted: false,
            user_response_time_ms: None,
            response_time_limit_ms: None,
            payload: MessagePayload::ResultSimulation {
                content: Some(
                    "Thank you for completing this simulation! Your responses have been recorded."
                        .to_string(),
                ),
            },
        };
        match tx.save_message(message.clone()).await {
            Ok(saved) => Ok(saved),
            Err(err) => {
                warn!(%err, "could not persist fallback final message, returning unsaved");
                Ok(message)
            }
        }
    }
}

fn build_chat_history(context: &SimulationContext) -> Vec<ChatHistoryEntry> {
    context
        .message_history
        .iter()
        .map(|message| ChatHistoryEntry {
            message_id: message.id,
            message_type: message.message_type().wire_name().to_string(),
            role: match message.role {
                ChatRole::User => "USER".to_string(),
                ChatRole::Character => "ASSISTANT".to_string(),
            },
            content: message.content_text(),
            character_name: message.character.clone(),
            timestamp: message.timestamp,
            requires_response: message.message_type().is_question(),
        })
        .collect()
}

fn build_user_message(context: &SimulationContext, request: &MessageRequest) -> UserMessagePayload {
    let answered = context
        .message_history
        .iter()
        .find(|m| m.id == request.message_id);

    let (content, selected) = match &request.answer {
        AnswerPayload::EnterText { text } => (text.clone(), vec![]),
        AnswerPayload::SingleChoice { answer } => {
            (option_labels(answered, &[*answer]), vec![*answer])
        }
        AnswerPayload::MultiChoice { answers } => {
            (option_labels(answered, answers), answers.clone())
        }
        AnswerPayload::Acknowledge => ("User has completed the simulation".to_string(), vec![]),
    };

    UserMessagePayload {
        message_id: request.message_id.to_string(),
        message_type: answered
            .map(|m| m.message_type().wire_name().to_string())
            .unwrap_or_else(|| "Text".to_string()),
        content,
        selected_options: selected,
        response_time_ms: request.user_response_time_ms,
    }
}

/// Text of the chosen options, for generator context. Falls back to the
/// bare positions when the question is unknown.
fn option_labels(message: Option<&Message>, positions: &[usize]) -> String {
    let options = message.and_then(|m| match &m.payload {
        MessagePayload::SingleChoiceQuestion { options, .. }
        | MessagePayload::SingleChoiceTask { options, .. }
        | MessagePayload::MultiChoiceTask { options, .. } => Some(options),
        _ => None,
    });

    match options {
        Some(options) => positions
            .iter()
            .filter_map(|&p| options.get(p.saturating_sub(1)))
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
        None => positions
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn build_simulation_context(context: &SimulationContext) -> SimulationContextPayload {
    SimulationContextPayload {
        simulation_name: context.simulation.name.clone(),
        simulation_description: "AI-generated simulation".to_string(),
        learning_objectives: context.learning_objectives.join(", "),
        character_info: "AI-generated characters based on simulation context".to_string(),
    }
}

fn build_organization_context(context: &SimulationContext) -> OrganizationPayload {
    match &context.user.organization {
        Some(org) => OrganizationPayload {
            name: org.name.clone(),
            industry: org.industry.clone().unwrap_or_else(|| "Technology".to_string()),
            size: org.size.clone().unwrap_or_else(|| "50-100 employees".to_string()),
            localization: org.localization.clone(),
        },
        None => OrganizationPayload {
            name: "Default Organization".to_string(),
            industry: "Technology".to_string(),
            size: "50-100 employees".to_string(),
            localization: "en".to_string(),
        },
    }
}

fn build_skill_materials(context: &SimulationContext) -> Vec<SkillMaterialPayload> {
    let Some(skill) = &context.skill else {
        return Vec::new();
    };
    skill
        .materials
        .iter()
        .map(|material| SkillMaterialPayload {
            filename: material.file_name.clone(),
            content: material.content.clone().unwrap_or_else(|| {
                match &material.tag {
                    Some(tag) => format!("Material: {} (Tag: {tag})", material.file_name),
                    None => format!("Material: {}", material.file_name),
                }
            }),
        })
        .collect()
}
