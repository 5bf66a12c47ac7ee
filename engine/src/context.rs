//! Execution-scoped state for one processing call.
//!
//! A [`SimulationContext`] is hydrated from persisted state at the start of
//! every call and discarded afterwards — it is never cached across calls.
//! Mutations made during rule evaluation accumulate here (hyperparameters,
//! variables, completion) and are flushed to the store by the owning engine.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use mentora_core::{Chat, Message, Simulation, SimulationMode, Skill, User};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::store::StoreTransaction;

/// Objectives tracked when a skill does not configure its own.
pub const DEFAULT_LEARNING_OBJECTIVES: [&str; 7] = [
    "active_listening",
    "empathy",
    "engagement",
    "collaboration",
    "feedback_delivery",
    "goal_setting",
    "joint_decision_making",
];

#[derive(Debug, Clone)]
pub struct SimulationContext {
    pub chat_id: Uuid,
    pub user: User,
    pub simulation: Simulation,
    pub skill: Option<Skill>,
    pub mode: SimulationMode,
    pub max_messages: usize,
    pub message_history: Vec<Message>,
    pub learning_objectives: Vec<String>,
    pub hearts: f64,
    pub completed: bool,
    /// Wall-clock session start: the first message's timestamp, or the
    /// build time for an empty chat.
    pub started_at: DateTime<Utc>,
    /// Evaluation clock, captured once per call so time rules are stable
    /// within a call and controllable under test.
    pub now: DateTime<Utc>,
    hyper_parameters: HashMap<String, f64>,
    dirty_hyper_parameters: HashSet<String>,
    /// Scratch variables written by branching-rule actions.
    pub variables: HashMap<String, serde_json::Value>,
    /// Guards hyperparameter actions against double application within a
    /// call (keyed by rule id + trigger).
    applied_actions: HashSet<String>,
}

impl SimulationContext {
    /// Context for a chat with mode/budget heuristics applied and no
    /// hyperparameters hydrated yet.
    pub fn from_chat(chat: &Chat) -> Self {
        let now = Utc::now();
        let started_at = chat.messages.first().map(|m| m.timestamp).unwrap_or(now);

        Self {
            chat_id: chat.id,
            user: chat.user.clone(),
            simulation: chat.simulation.clone(),
            skill: chat.skill.clone(),
            mode: determine_mode(&chat.simulation),
            max_messages: determine_max_messages(&chat.simulation),
            message_history: chat.messages.clone(),
            learning_objectives: learning_objectives(chat.skill.as_ref()),
            hearts: chat.hearts,
            completed: chat.finished,
            started_at,
            now,
            hyper_parameters: HashMap::new(),
            dirty_hyper_parameters: HashSet::new(),
            variables: HashMap::new(),
            applied_actions: HashSet::new(),
        }
    }

    pub fn message_count(&self) -> usize {
        self.message_history.len()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.message_history.last()
    }

    pub fn add_message(&mut self, message: Message) {
        self.message_history.push(message);
    }

    /// Current value of a hyperparameter, defaulting to 0.0.
    pub fn hyper_parameter(&self, key: &str) -> f64 {
        self.hyper_parameters.get(key).copied().unwrap_or(0.0)
    }

    pub fn hyper_parameters(&self) -> &HashMap<String, f64> {
        &self.hyper_parameters
    }

    pub fn set_hyper_parameter(&mut self, key: &str, value: f64) {
        debug!(key, value, "hyperparameter updated");
        self.hyper_parameters.insert(key.to_string(), value);
        self.dirty_hyper_parameters.insert(key.to_string());
    }

    /// Seed a value during hydration without marking it for write-back.
    pub fn seed_hyper_parameter(&mut self, key: &str, value: f64) {
        self.hyper_parameters.insert(key.to_string(), value);
    }

    /// Keys mutated during this call, for persistence by the engine.
    pub fn dirty_hyper_parameters(&self) -> impl Iterator<Item = (&str, f64)> {
        self.dirty_hyper_parameters
            .iter()
            .map(|k| (k.as_str(), self.hyper_parameter(k)))
    }

    /// Claim a one-shot action slot. Returns false when the same rule has
    /// already fired for the same trigger in this call.
    pub fn claim_action(&mut self, key: String) -> bool {
        self.applied_actions.insert(key)
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub fn update_hearts(&mut self, hearts: f64) {
        self.hearts = hearts.max(0.0);
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.now - self.started_at).num_seconds().max(0)
    }

    /// Recorded selections (1-based) for the answered message produced by
    /// the flow node with the given order number.
    pub fn user_selections(&self, node_order: u64) -> Vec<usize> {
        self.message_history
            .iter()
            .filter(|m| m.node_order == Some(node_order) && m.interacted)
            .find_map(Message::selected_positions)
            .unwrap_or_default()
    }

    /// Free-text answer recorded for the node with the given order number.
    pub fn user_text_input(&self, node_order: u64) -> Option<String> {
        self.message_history
            .iter()
            .filter(|m| m.node_order == Some(node_order) && m.interacted)
            .find_map(|m| m.text_answer().map(str::to_string))
    }

    pub fn message_budget_exhausted(&self) -> bool {
        self.message_count() >= self.max_messages
    }
}

/// Builds a fresh [`SimulationContext`] per processing call.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    config: EngineConfig,
}

impl ContextBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Load the chat by id and build its context. The load retries a fixed
    /// number of times with a fixed delay to absorb the race where a chat
    /// created moments ago is not yet visible to this read path.
    pub async fn build_from_request(
        &self,
        tx: &mut dyn StoreTransaction,
        chat_id: Uuid,
    ) -> Result<SimulationContext, EngineError> {
        let chat = self.load_chat_with_retry(tx, chat_id).await?;
        self.build_from_chat(tx, &chat).await
    }

    async fn load_chat_with_retry(
        &self,
        tx: &mut dyn StoreTransaction,
        chat_id: Uuid,
    ) -> Result<Chat, EngineError> {
        let attempts = self.config.chat_load_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(chat) = tx.find_chat_with_messages(chat_id).await? {
                debug!(%chat_id, attempt, "chat loaded");
                return Ok(chat);
            }
            if attempt < attempts {
                debug!(%chat_id, attempt, "chat not visible yet, retrying");
                tokio::time::sleep(self.config.chat_load_delay).await;
            }
        }
        warn!(%chat_id, attempts, "chat not found after retries");
        Err(EngineError::ChatNotFound(chat_id))
    }

    /// Build a context from an already-loaded chat aggregate.
    pub async fn build_from_chat(
        &self,
        tx: &mut dyn StoreTransaction,
        chat: &Chat,
    ) -> Result<SimulationContext, EngineError> {
        let mut context = SimulationContext::from_chat(chat);

        // One lookup per objective; a failing lookup defaults that key to
        // 0.0 instead of aborting the whole build.
        for objective in context.learning_objectives.clone() {
            match tx.get_or_create_hyper_parameter(chat.id, &objective).await {
                Ok(value) => context.seed_hyper_parameter(&objective, value),
                Err(err) => {
                    warn!(%err, objective, "hyperparameter hydration failed, defaulting to 0.0");
                    context.seed_hyper_parameter(&objective, 0.0);
                }
            }
        }

        debug!(
            chat_id = %chat.id,
            messages = context.message_count(),
            hyper_parameters = context.hyper_parameters.len(),
            mode = ?context.mode,
            "context built"
        );

        Ok(context)
    }
}

fn determine_mode(simulation: &Simulation) -> SimulationMode {
    if simulation.has_modern_nodes() {
        SimulationMode::Hybrid
    } else if simulation.has_legacy_nodes() {
        SimulationMode::Predefined
    } else {
        SimulationMode::Dynamic
    }
}

/// Message budget scales with graph size to allow branching and retries;
/// unknown graphs get a flat default.
fn determine_max_messages(simulation: &Simulation) -> usize {
    if simulation.nodes.is_some() || simulation.has_modern_nodes() {
        50usize.max(simulation.node_count() * 3)
    } else {
        100
    }
}

fn learning_objectives(skill: Option<&Skill>) -> Vec<String> {
    match skill {
        Some(skill) if !skill.objectives.is_empty() => skill.objectives.clone(),
        _ => DEFAULT_LEARNING_OBJECTIVES
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}
