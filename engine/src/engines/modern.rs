use std::sync::Arc;
use std::time::Instant;

use mentora_core::{ChatData, Message, MessageRequest};
use tracing::{debug, info};

use super::legacy::{finish_if_terminal, record_answer};
use super::{EngineMetrics, advance_flow, flush_hyper_parameters};
use crate::context::SimulationContext;
use crate::error::EngineError;
use crate::flow::content::ContentEngine;
use crate::flow::resolver::FlowResolver;
use crate::flow::{FlowPatternCache, NodeCollector};
use crate::rules::parse_rules;
use crate::store::StoreTransaction;
use crate::validate::RuleValidator;

/// Processor for rule-based simulations over `EnhancedNode`s: structured
/// rule lists decide visibility, transitions follow `previous_message_ids`,
/// and every node kind converts to a typed message.
pub struct ModernEngine {
    resolver: FlowResolver,
    rule_validator: RuleValidator,
    metrics: EngineMetrics,
}

impl ModernEngine {
    pub fn new(cache: Arc<FlowPatternCache>) -> Self {
        Self {
            resolver: FlowResolver::new(cache),
            rule_validator: RuleValidator::new(),
            metrics: EngineMetrics::new("modern-1.0 (rule based)"),
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
            "modern processing complete"
        );
        Ok(ChatData {
            messages,
            hearts: context.hearts,
        })
    }

    /// Initial display: the ALWAYS_SHOW run up to the first actionable
    /// node, each converted to its message form.
    pub async fn initialize_simulation(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
    ) -> Result<Vec<Message>, EngineError> {
        let started = Instant::now();
        let nodes = NodeCollector::initial_enhanced_nodes(&context.simulation);

        let mut messages = Vec::new();
        let mut previous = context.last_message().map(|m| m.id);
        for node in &nodes {
            let message = ContentEngine::materialize_enhanced(node, context.chat_id, previous);
            let saved = tx.save_message(message).await?;
            previous = Some(saved.id);
            context.add_message(saved.clone());
            messages.push(saved);
        }

        self.metrics.record_initialized(started.elapsed());
        info!(
            chat_id = %context.chat_id,
            messages = messages.len(),
            "modern simulation initialized"
        );
        Ok(messages)
    }

    pub async fn generate_final_message(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
    ) -> Result<Message, EngineError> {
        super::legacy::final_result_message(tx, context).await
    }

    pub fn can_handle(&self, context: &SimulationContext) -> bool {
        context.simulation.has_modern_nodes()
    }

    pub fn validate_simulation(&self, context: &SimulationContext) -> Vec<String> {
        let mut issues = Vec::new();
        if context.simulation.enhanced_nodes.is_empty() {
            issues.push("Simulation has no rule-bearing nodes".to_string());
            return issues;
        }

        for node in &context.simulation.enhanced_nodes {
            let rules = parse_rules(&node.rules);
            let report = self.rule_validator.validate_rule_set(&rules);
            issues.extend(
                report
                    .issues
                    .into_iter()
                    .map(|issue| format!("Node {}: {}", node.message_id, issue.message)),
            );
        }
        issues
    }

    pub fn is_simulation_complete(&self, context: &SimulationContext) -> bool {
        context.completed || context.hearts <= 0.0 || context.message_budget_exhausted()
    }
}
