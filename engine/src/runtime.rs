//! Dual-mode runtime: the single entry point the message layer talks to.
//!
//! Each call owns one store transaction (read committed, begun fresh per
//! call) so a failure in one message's processing cannot corrupt another's.
//! Inbound messages can be submitted as independent tasks on the runtime's
//! worker pool; note that concurrent submissions for the same chat are NOT
//! serialized — last write wins, as in the original message pipeline.

use std::sync::Arc;

use mentora_core::{Chat, ChatData, Message, MessageRequest, Simulation};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::context::ContextBuilder;
use crate::detect::{SimulationType, SimulationTypeDetector};
use crate::engines::{EngineFactory, MetricsSnapshot};
use crate::error::EngineError;
use crate::flow::{CacheStatistics, FlowPatternCache};
use crate::generator::ContentGenerator;
use crate::store::{IsolationLevel, SimulationStore, StoreTransaction};
use crate::validate::CompatibilityValidator;

/// Diagnostic view of how a simulation will be processed.
#[derive(Debug, Clone)]
pub struct SimulationRuntimeInfo {
    pub simulation_id: Uuid,
    pub simulation_name: String,
    pub detected_type: SimulationType,
    pub is_compatible: bool,
    pub engine_name: &'static str,
    pub node_count: usize,
    pub has_legacy_predicates: bool,
    pub has_modern_rules: bool,
    pub compatibility_issues: Vec<String>,
}

pub struct SimulationRuntime {
    store: Arc<dyn SimulationStore>,
    detector: SimulationTypeDetector,
    validator: CompatibilityValidator,
    context_builder: ContextBuilder,
    factory: EngineFactory,
    cache: Arc<FlowPatternCache>,
}

impl SimulationRuntime {
    pub fn new(
        store: Arc<dyn SimulationStore>,
        generator: Arc<dyn ContentGenerator>,
        config: EngineConfig,
    ) -> Self {
        let cache = Arc::new(FlowPatternCache::new(config.flow_cache_ttl));
        Self {
            store,
            detector: SimulationTypeDetector::new(),
            validator: CompatibilityValidator::new(),
            context_builder: ContextBuilder::new(config),
            factory: EngineFactory::new(generator, cache.clone()),
            cache,
        }
    }

    /// Submit a message as an independent unit of work on the worker pool.
    pub fn submit_user_message(
        self: &Arc<Self>,
        request: MessageRequest,
    ) -> JoinHandle<Result<ChatData, EngineError>> {
        let runtime = Arc::clone(self);
        tokio::spawn(async move { runtime.process_user_message(request).await })
    }

    /// Process one user message inside its own transaction.
    ///
    /// Failure policy: an AI-generated simulation never falls back — the
    /// transaction rolls back and the error propagates, because masking AI
    /// failures with legacy content is worse than a visible failure. Any
    /// other type gets one retry against a freshly built context on the
    /// legacy engine.
    pub async fn process_user_message(
        &self,
        request: MessageRequest,
    ) -> Result<ChatData, EngineError> {
        info!(chat_id = %request.chat_id, message_id = %request.message_id, "processing user message");

        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let mut context = match self
            .context_builder
            .build_from_request(&mut *tx, request.chat_id)
            .await
        {
            Ok(context) => context,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        };

        let detected = self.detector.detect(&context.simulation);
        info!(
            chat_id = %request.chat_id,
            simulation = %context.simulation.name,
            %detected,
            "simulation classified"
        );
        self.validator.validate(&context.simulation, detected);

        let engine = self.factory.engine_for(detected);
        match engine
            .process_user_message(&mut *tx, &mut context, &request)
            .await
        {
            Ok(data) => {
                tx.commit().await?;
                Ok(data)
            }
            Err(err) if detected == SimulationType::AiGenerated => {
                // No fallback by design: surface the failure.
                error!(
                    chat_id = %request.chat_id,
                    %err,
                    "AI-generated processing failed, rolling back without fallback"
                );
                let _ = tx.rollback().await;
                Err(err)
            }
            Err(err) => {
                warn!(
                    chat_id = %request.chat_id,
                    %err,
                    "processing failed, retrying once with legacy engine"
                );
                let _ = tx.rollback().await;
                self.legacy_retry(&request).await
            }
        }
    }

    async fn legacy_retry(&self, request: &MessageRequest) -> Result<ChatData, EngineError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        // Fresh context: the failed attempt may have left stale state.
        let mut context = match self
            .context_builder
            .build_from_request(&mut *tx, request.chat_id)
            .await
        {
            Ok(context) => context,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        };

        match self
            .factory
            .legacy_engine()
            .process_user_message(&mut *tx, &mut context, request)
            .await
        {
            Ok(data) => {
                tx.commit().await?;
                Ok(data)
            }
            Err(err) => {
                error!(chat_id = %request.chat_id, %err, "legacy retry failed, rolling back");
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Generate the opening messages for a freshly created chat. Operates
    /// on the passed aggregate directly — no by-id reload, so a chat that
    /// has not replicated to the read path yet initializes fine.
    pub async fn initialize_chat(&self, chat: &Chat) -> Result<Vec<Message>, EngineError> {
        info!(chat_id = %chat.id, simulation = %chat.simulation.name, "initializing chat");

        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let mut context = match self.context_builder.build_from_chat(&mut *tx, chat).await {
            Ok(context) => context,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        };

        let detected = self.detector.detect(&context.simulation);
        self.validator.validate(&context.simulation, detected);

        let engine = self.factory.engine_for(detected);
        match engine.initialize_simulation(&mut *tx, &mut context).await {
            Ok(messages) => {
                tx.commit().await?;
                info!(chat_id = %chat.id, count = messages.len(), "chat initialized");
                Ok(messages)
            }
            Err(err) => {
                error!(chat_id = %chat.id, %err, "initialization failed");
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Closing message when a simulation can no longer continue (hearts
    /// exhausted or flow complete).
    pub async fn generate_last_simulation_message(
        &self,
        chat: &Chat,
    ) -> Result<Message, EngineError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let mut context = match self.context_builder.build_from_chat(&mut *tx, chat).await {
            Ok(context) => context,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        };

        let detected = self.detector.detect(&context.simulation);
        let engine = self.factory.engine_for(detected);
        match engine.generate_final_message(&mut *tx, &mut context).await {
            Ok(message) => {
                tx.commit().await?;
                Ok(message)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Diagnostic only; never fails.
    pub fn simulation_runtime_info(&self, simulation: &Simulation) -> SimulationRuntimeInfo {
        let detected = self.detector.detect(simulation);
        let issues = self.validator.issues(simulation, detected);

        SimulationRuntimeInfo {
            simulation_id: simulation.id,
            simulation_name: simulation.name.clone(),
            detected_type: detected,
            is_compatible: issues
                .iter()
                .all(|i| i.severity != crate::validate::Severity::Error),
            engine_name: EngineFactory::engine_name(detected),
            node_count: simulation.node_count(),
            has_legacy_predicates: simulation
                .legacy_nodes()
                .iter()
                .any(|n| n.has_predicate()),
            has_modern_rules: simulation
                .enhanced_nodes
                .iter()
                .any(|n| !n.rules.is_null()),
            compatibility_issues: issues.into_iter().map(|i| i.message).collect(),
        }
    }

    pub fn engine_metrics(&self) -> Vec<(&'static str, MetricsSnapshot)> {
        self.factory.all_metrics()
    }

    pub fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }
}

#[cfg(test)]
mod tests {
    use mentora_core::{MessageType, NodeContent, SimulationKind};
    use mentora_core::flow::FlowNode;

    use super::*;
    use crate::generator::{
        GenerationRequest, GenerationResponse, GeneratorError, InitializeRequest,
    };
    use crate::store::MemoryStore;

    struct NullGenerator;

    #[async_trait::async_trait]
    impl ContentGenerator for NullGenerator {
        async fn initialize(
            &self,
            _request: InitializeRequest,
        ) -> Result<GenerationResponse, GeneratorError> {
            Err(GeneratorError::Disabled)
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, GeneratorError> {
            Err(GeneratorError::Disabled)
        }
    }

    fn runtime() -> SimulationRuntime {
        SimulationRuntime::new(
            Arc::new(MemoryStore::new()),
            Arc::new(NullGenerator),
            EngineConfig::default(),
        )
    }

    fn question_node(order: u64, previous: u64) -> FlowNode {
        FlowNode {
            order_number: order,
            previous_order_number: previous,
            message_type: MessageType::SingleChoiceQuestion,
            name: None,
            show_predicate: String::new(),
            character: None,
            content: NodeContent::SingleChoice {
                options: vec!["a".into(), "b".into()],
                correct: Some(1),
            },
        }
    }

    #[test]
    fn runtime_info_reports_type_and_issues() {
        let runtime = runtime();
        let simulation = Simulation {
            id: Uuid::now_v7(),
            name: "Feedback".into(),
            kind: SimulationKind::Predefined,
            nodes: Some(vec![
                question_node(1, 0),
                FlowNode {
                    show_predicate: "readChatValue[\"x\"] > 1".into(),
                    ..question_node(2, 1)
                },
            ]),
            enhanced_nodes: vec![],
            skill_id: None,
        };

        let info = runtime.simulation_runtime_info(&simulation);
        assert_eq!(info.detected_type, SimulationType::Legacy);
        assert!(info.is_compatible);
        assert_eq!(info.engine_name, "legacy");
        assert_eq!(info.node_count, 2);
        assert!(info.has_legacy_predicates);
        assert!(!info.has_modern_rules);
        assert!(info.compatibility_issues.is_empty());
    }

    #[test]
    fn runtime_info_never_fails_on_empty_simulations() {
        let runtime = runtime();
        let simulation = Simulation {
            id: Uuid::now_v7(),
            name: String::new(),
            kind: SimulationKind::Predefined,
            nodes: Some(vec![]),
            enhanced_nodes: vec![],
            skill_id: None,
        };

        let info = runtime.simulation_runtime_info(&simulation);
        assert_eq!(info.detected_type, SimulationType::Unknown);
        assert!(!info.is_compatible);
        assert!(!info.compatibility_issues.is_empty());
    }
}
