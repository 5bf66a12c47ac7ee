//! The three processing engines behind one uniform contract, plus the
//! factory that routes a detected simulation type to its engine.

pub mod ai_generated;
pub mod legacy;
pub mod modern;

pub use ai_generated::AiGeneratedEngine;
pub use legacy::LegacyEngine;
pub use modern::ModernEngine;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mentora_core::{ChatData, Message, MessageRequest};

use crate::context::SimulationContext;
use crate::detect::SimulationType;
use crate::error::EngineError;
use crate::flow::FlowPatternCache;
use crate::flow::content::ContentEngine;
use crate::flow::resolver::FlowResolver;
use crate::generator::ContentGenerator;
use crate::store::StoreTransaction;

/// Per-engine processing counters.
#[derive(Debug)]
pub struct EngineMetrics {
    version: &'static str,
    processed_messages: AtomicU64,
    initialized_chats: AtomicU64,
    errors: AtomicU64,
    total_processing_micros: AtomicU64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub engine_version: String,
    pub processed_messages: u64,
    pub initialized_chats: u64,
    pub error_count: u64,
    pub average_processing_ms: f64,
}

impl EngineMetrics {
    pub fn new(version: &'static str) -> Self {
        Self {
            version,
            processed_messages: AtomicU64::new(0),
            initialized_chats: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_processing_micros: AtomicU64::new(0),
        }
    }

    pub fn record_processed(&self, elapsed: Duration) {
        self.processed_messages.fetch_add(1, Ordering::Relaxed);
        self.total_processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_initialized(&self, elapsed: Duration) {
        self.initialized_chats.fetch_add(1, Ordering::Relaxed);
        self.total_processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed = self.processed_messages.load(Ordering::Relaxed);
        let initialized = self.initialized_chats.load(Ordering::Relaxed);
        let total = processed + initialized;
        let micros = self.total_processing_micros.load(Ordering::Relaxed);
        MetricsSnapshot {
            engine_version: self.version.to_string(),
            processed_messages: processed,
            initialized_chats: initialized,
            error_count: self.errors.load(Ordering::Relaxed),
            average_processing_ms: if total == 0 {
                0.0
            } else {
                micros as f64 / total as f64 / 1000.0
            },
        }
    }
}

/// Walk the flow from `from`, materializing and persisting valid candidate
/// nodes until an actionable node is reached, the candidate set runs dry
/// (a completion condition) or the message budget is exhausted.
pub(crate) async fn advance_flow(
    resolver: &FlowResolver,
    tx: &mut dyn StoreTransaction,
    context: &mut SimulationContext,
    from: Message,
) -> Result<Vec<Message>, EngineError> {
    let mut emitted = Vec::new();
    let mut current = from;
    let mut reached_actionable = false;

    loop {
        if context.message_budget_exhausted() {
            context.mark_completed();
            break;
        }

        let candidates = resolver.resolve_next_nodes(context, Some(&current));
        if candidates.is_empty() {
            break;
        }

        let mut advanced = None;
        for node in &candidates {
            let message =
                ContentEngine::materialize_candidate(node, context.chat_id, Some(current.id));
            let saved = tx.save_message(message).await?;
            context.add_message(saved.clone());
            emitted.push(saved.clone());
            advanced = Some(saved);
            if node.is_actionable() {
                reached_actionable = true;
                break;
            }
        }

        match advanced {
            Some(next) if !reached_actionable => current = next,
            _ => break,
        }
    }

    if !reached_actionable {
        // Nothing left to wait on: the conversation has run its course.
        context.mark_completed();
    }
    Ok(emitted)
}

/// Persist hyperparameter values mutated during this call.
pub(crate) async fn flush_hyper_parameters(
    tx: &mut dyn StoreTransaction,
    context: &SimulationContext,
) -> Result<(), EngineError> {
    let dirty: Vec<(String, f64)> = context
        .dirty_hyper_parameters()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    for (key, value) in dirty {
        tx.update_hyper_parameter(context.chat_id, &key, value).await?;
    }
    Ok(())
}

/// Engine selected for one processing call. Dispatch is exhaustive over
/// the closed engine family.
pub enum Engine<'a> {
    Legacy(&'a LegacyEngine),
    Modern(&'a ModernEngine),
    AiGenerated(&'a AiGeneratedEngine),
}

impl Engine<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Legacy(_) => "legacy",
            Engine::Modern(_) => "modern",
            Engine::AiGenerated(_) => "ai_generated",
        }
    }

    pub async fn process_user_message(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
        request: &MessageRequest,
    ) -> Result<ChatData, EngineError> {
        match self {
            Engine::Legacy(engine) => engine.process_user_message(tx, context, request).await,
            Engine::Modern(engine) => engine.process_user_message(tx, context, request).await,
            Engine::AiGenerated(engine) => engine.process_user_message(tx, context, request).await,
        }
    }

    pub async fn initialize_simulation(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
    ) -> Result<Vec<Message>, EngineError> {
        match self {
            Engine::Legacy(engine) => engine.initialize_simulation(tx, context).await,
            Engine::Modern(engine) => engine.initialize_simulation(tx, context).await,
            Engine::AiGenerated(engine) => engine.initialize_simulation(tx, context).await,
        }
    }

    pub async fn generate_final_message(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut SimulationContext,
    ) -> Result<Message, EngineError> {
        match self {
            Engine::Legacy(engine) => engine.generate_final_message(tx, context).await,
            Engine::Modern(engine) => engine.generate_final_message(tx, context).await,
            Engine::AiGenerated(engine) => engine.generate_final_message(tx, context).await,
        }
    }

    pub fn can_handle(&self, context: &SimulationContext) -> bool {
        match self {
            Engine::Legacy(engine) => engine.can_handle(context),
            Engine::Modern(engine) => engine.can_handle(context),
            Engine::AiGenerated(engine) => engine.can_handle(context),
        }
    }

    pub fn validate_simulation(&self, context: &SimulationContext) -> Vec<String> {
        match self {
            Engine::Legacy(engine) => engine.validate_simulation(context),
            Engine::Modern(engine) => engine.validate_simulation(context),
            Engine::AiGenerated(engine) => engine.validate_simulation(context),
        }
    }

    pub fn is_simulation_complete(&self, context: &SimulationContext) -> bool {
        match self {
            Engine::Legacy(engine) => engine.is_simulation_complete(context),
            Engine::Modern(engine) => engine.is_simulation_complete(context),
            Engine::AiGenerated(engine) => engine.is_simulation_complete(context),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        match self {
            Engine::Legacy(engine) => engine.metrics().snapshot(),
            Engine::Modern(engine) => engine.metrics().snapshot(),
            Engine::AiGenerated(engine) => engine.metrics().snapshot(),
        }
    }
}

/// Creates and owns the engines; selection is by detected type. Hybrid and
/// unknown simulations route to the legacy engine for maximum
/// compatibility.
pub struct EngineFactory {
    legacy: LegacyEngine,
    modern: ModernEngine,
    ai_generated: AiGeneratedEngine,
}

impl EngineFactory {
    pub fn new(generator: Arc<dyn ContentGenerator>, cache: Arc<FlowPatternCache>) -> Self {
        Self {
            legacy: LegacyEngine::new(cache.clone()),
            modern: ModernEngine::new(cache),
            ai_generated: AiGeneratedEngine::new(generator),
        }
    }

    pub fn engine_for(&self, detected: SimulationType) -> Engine<'_> {
        match detected {
            SimulationType::Modern => Engine::Modern(&self.modern),
            SimulationType::AiGenerated => Engine::AiGenerated(&self.ai_generated),
            SimulationType::Legacy | SimulationType::Hybrid | SimulationType::Unknown => {
                Engine::Legacy(&self.legacy)
            }
        }
    }

    pub fn legacy_engine(&self) -> Engine<'_> {
        Engine::Legacy(&self.legacy)
    }

    pub fn engine_name(detected: SimulationType) -> &'static str {
        match detected {
            SimulationType::Modern => "modern",
            SimulationType::AiGenerated => "ai_generated",
            SimulationType::Hybrid => "legacy (hybrid mode)",
            SimulationType::Unknown => "legacy (fallback)",
            SimulationType::Legacy => "legacy",
        }
    }

    pub fn all_metrics(&self) -> Vec<(&'static str, MetricsSnapshot)> {
        vec![
            ("legacy", self.legacy.metrics().snapshot()),
            ("modern", self.modern.metrics().snapshot()),
            ("ai_generated", self.ai_generated.metrics().snapshot()),
        ]
    }
}
