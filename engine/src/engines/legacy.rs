use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use mentora_core::{ChatData, ChatRole, Message, MessagePayload, MessageRequest};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EngineMetrics, advance_flow, flush_hyper_parameters};
use crate::context::SimulationContext;
use crate::error::EngineError;
use crate::flow::content::ContentEngine;
use crate::flow::resolver::FlowResolver;
use crate::flow::{FlowPatternCache, NodeCollector};
use crate::store::StoreTransaction;

/// Processor for predicate-graph simulations: traversal over `FlowNode`s
/// gated by `show_predicate` scripts.
pub struct LegacyEngine {
    resolver: FlowResolver,
    metrics: EngineMetrics,
}

impl LegacyEngine {
    pub fn new(cache: Arc<FlowPatternCache>) -> Self {
        Self {
            resolver: FlowResolver::new(cache),
            metrics: EngineMetrics::new("legacy-1.0 (show_predicate compatible)"),
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
        let answered = record_answer(tx, context, request).await?;

        let emitted = advance_flow(&self.resolver, tx, context, answered.clone()).await?;
        flush_hyper_parameters(tx, context).await?;
        finish_if_terminal(tx, context).await?;

        let mut messages = vec![answered];
        messages.extend(emitted);
        debug!(
            chat_id = %context.chat_id,
            emitted = messages.len(),
            hearts = context.hearts,
            "legacy processing complete"
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
        let nodes = NodeCollector::initial_nodes(&context.simulation);

        let mut messages = Vec::new();
        let mut previous = context.last_message().map(|m| m.id);
        for node in &nodes {
            let message = ContentEngine::materialize_legacy(node, context.chat_id, previous);
            let saved = tx.save_message(message).await?;
            previous = Some(saved.id);
            context.add_message(saved.clone());
            messages.push(saved);
        }

        self.metrics.record_initialized(started.elapsed());
        info!(
            chat_id = %context.chat_id,
            messages = messages.len(),
            "legacy simulation initialized"
        );
        Ok(messages)
    }

    pub async fn generate_final_message(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
    ) -> Result<Message, EngineError> {
        final_result_message(tx, context).await
    }

    pub fn can_handle(&self, context: &SimulationContext) -> bool {
        context.simulation.has_legacy_nodes()
    }

    pub fn validate_simulation(&self, context: &SimulationContext) -> Vec<String> {
        let mut issues = Vec::new();
        let simulation = &context.simulation;
        match &simulation.nodes {
            Some(nodes) if nodes.is_empty() => {
                issues.push("Simulation has no flow nodes".to_string());
            }
            Some(nodes) => {
                if !nodes.iter().any(|n| n.is_actionable()) {
                    issues.push("Simulation has no actionable nodes (questions)".to_string());
                }
            }
            None => {}
        }
        issues
    }

    pub fn is_simulation_complete(&self, context: &SimulationContext) -> bool {
        context.completed || context.hearts <= 0.0
    }
}

/// Record the user's answer onto the question message, persist it, and
/// apply the hearts cost of a wrong answer. Shared by the predefined-flow
/// engines.
pub(crate) async fn record_answer(
    tx: &mut dyn StoreTransaction,
    context: &mut SimulationContext,
    request: &MessageRequest,
) -> Result<Message, EngineError> {
    let position = context
        .message_history
        .iter()
        .position(|m| m.id == request.message_id)
        .ok_or(EngineError::MessageNotFound {
            chat_id: context.chat_id,
            message_id: request.message_id,
        })?;

    let mut answered = context.message_history[position].clone();
    let correctness = ContentEngine::record_answer(&mut answered, request);
    let answered = tx.save_message(answered).await?;
    context.message_history[position] = answered.clone();

    let delta = correctness.hearts_delta();
    if delta != 0.0 {
        context.update_hearts(context.hearts + delta);
        tx.update_chat_hearts(context.chat_id, context.hearts).await?;
        debug!(
            chat_id = %context.chat_id,
            delta,
            hearts = context.hearts,
            "hearts adjusted for answer"
        );
    }

    Ok(answered)
}

/// Mark the chat finished when the context reached a terminal state.
pub(crate) async fn finish_if_terminal(
    tx: &mut dyn StoreTransaction,
    context: &mut SimulationContext,
) -> Result<(), EngineError> {
    if context.hearts <= 0.0 {
        context.mark_completed();
    }
    if context.completed {
        tx.mark_chat_finished(context.chat_id).await?;
    }
    Ok(())
}

/// Closing result card for predefined flows. Best effort: a failed save
/// degrades to an unsaved in-memory message instead of failing the call.
pub(crate) async fn final_result_message(
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
        character: None,
        interacted: false,
        user_response_time_ms: None,
        response_time_limit_ms: None,
        payload: MessagePayload::ResultSimulation {
            content: Some(final_summary(context)),
        },
    };

    match tx.save_message(message.clone()).await {
        Ok(saved) => Ok(saved),
        Err(err) => {
            warn!(%err, "could not persist final message, returning unsaved");
            Ok(message)
        }
    }
}

fn final_summary(context: &SimulationContext) -> String {
    if context.hearts <= 0.0 {
        "You have run out of hearts for this simulation. Review the feedback above and try again to improve your approach.".to_string()
    } else {
        "Simulation complete. Your responses have been recorded and your skill scores updated.".to_string()
    }
}
