//! Persistence boundary.
//!
//! The engine owns no storage. Every processing call runs against a
//! [`StoreTransaction`] obtained from a [`SimulationStore`]; the runtime
//! begins exactly one transaction per call and commits or rolls back as a
//! unit, so a failure in one message's processing cannot corrupt another's.
//!
//! [`MemoryStore`] is the reference implementation used by tests and local
//! runs: snapshot at begin, swap at commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mentora_core::{Chat, Message};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("chat {0} not found")]
    UnknownChat(Uuid),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Transaction isolation requested by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
}

#[async_trait]
pub trait SimulationStore: Send + Sync {
    /// Begin a new transaction. The runtime uses one per processing call.
    async fn begin(&self, isolation: IsolationLevel)
    -> Result<Box<dyn StoreTransaction>, StoreError>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_chat(&mut self, chat_id: Uuid) -> Result<Option<Chat>, StoreError>;

    /// Eager variant: the chat with its full ordered message list.
    async fn find_chat_with_messages(&mut self, chat_id: Uuid)
    -> Result<Option<Chat>, StoreError>;

    /// Insert or replace a message (answer recording rewrites in place).
    async fn save_message(&mut self, message: Message) -> Result<Message, StoreError>;

    /// Persist the chat's hearts. Values below zero are clamped to zero;
    /// hearts are never stored negative.
    async fn update_chat_hearts(&mut self, chat_id: Uuid, hearts: f64) -> Result<(), StoreError>;

    async fn mark_chat_finished(&mut self, chat_id: Uuid) -> Result<(), StoreError>;

    /// Read a hyperparameter, creating it at 0.0 on first access.
    async fn get_or_create_hyper_parameter(
        &mut self,
        chat_id: Uuid,
        key: &str,
    ) -> Result<f64, StoreError>;

    async fn update_hyper_parameter(
        &mut self,
        chat_id: Uuid,
        key: &str,
        value: f64,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    chats: HashMap<Uuid, Chat>,
    hyper_parameters: HashMap<(Uuid, String), f64>,
}

/// In-memory store with transactional snapshot semantics.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    /// Reads left to swallow per chat, simulating replication lag where a
    /// freshly created chat is not yet visible to the read path.
    visibility_delays: Arc<Mutex<HashMap<Uuid, u32>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a chat outside any transaction (test setup).
    pub fn insert_chat(&self, chat: Chat) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.chats.insert(chat.id, chat);
    }

    /// Make the next `attempts` reads of `chat_id` return nothing, as if the
    /// chat had not replicated to the read path yet.
    pub fn delay_visibility(&self, chat_id: Uuid, attempts: u32) {
        let mut delays = self
            .visibility_delays
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        delays.insert(chat_id, attempts);
    }

    /// Committed view of a chat.
    pub fn chat(&self, chat_id: Uuid) -> Option<Chat> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.chats.get(&chat_id).cloned()
    }

    /// Committed view of a hyperparameter.
    pub fn hyper_parameter(&self, chat_id: Uuid, key: &str) -> Option<f64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.hyper_parameters.get(&(chat_id, key.to_string())).copied()
    }

    fn consume_visibility_delay(&self, chat_id: Uuid) -> bool {
        let mut delays = self
            .visibility_delays
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match delays.get_mut(&chat_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => {
                delays.remove(&chat_id);
                false
            }
        }
    }
}

#[async_trait]
impl SimulationStore for MemoryStore {
    async fn begin(
        &self,
        _isolation: IsolationLevel,
    ) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let working = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.clone()
        };
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            working,
        }))
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    working: MemoryState,
}

impl MemoryTransaction {
    fn chat_mut(&mut self, chat_id: Uuid) -> Result<&mut Chat, StoreError> {
        self.working
            .chats
            .get_mut(&chat_id)
            .ok_or(StoreError::UnknownChat(chat_id))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_chat(&mut self, chat_id: Uuid) -> Result<Option<Chat>, StoreError> {
        if self.store.consume_visibility_delay(chat_id) {
            return Ok(None);
        }
        Ok(self.working.chats.get(&chat_id).map(|chat| {
            let mut stripped = chat.clone();
            stripped.messages.clear();
            stripped
        }))
    }

    async fn find_chat_with_messages(
        &mut self,
        chat_id: Uuid,
    ) -> Result<Option<Chat>, StoreError> {
        if self.store.consume_visibility_delay(chat_id) {
            return Ok(None);
        }
        Ok(self.working.chats.get(&chat_id).cloned())
    }

    async fn save_message(&mut self, message: Message) -> Result<Message, StoreError> {
        let chat = self.chat_mut(message.chat_id)?;
        match chat.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message.clone(),
            None => chat.messages.push(message.clone()),
        }
        Ok(message)
    }

    async fn update_chat_hearts(&mut self, chat_id: Uuid, hearts: f64) -> Result<(), StoreError> {
        let chat = self.chat_mut(chat_id)?;
        chat.hearts = hearts.max(0.0);
        Ok(())
    }

    async fn mark_chat_finished(&mut self, chat_id: Uuid) -> Result<(), StoreError> {
        let chat = self.chat_mut(chat_id)?;
        chat.finished = true;
        Ok(())
    }

    async fn get_or_create_hyper_parameter(
        &mut self,
        chat_id: Uuid,
        key: &str,
    ) -> Result<f64, StoreError> {
        Ok(*self
            .working
            .hyper_parameters
            .entry((chat_id, key.to_string()))
            .or_insert(0.0))
    }

    async fn update_hyper_parameter(
        &mut self,
        chat_id: Uuid,
        key: &str,
        value: f64,
    ) -> Result<(), StoreError> {
        self.working
            .hyper_parameters
            .insert((chat_id, key.to_string()), value);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut state = self.store.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = self.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mentora_core::{
        ChatRole, Message, MessagePayload, Simulation, SimulationKind, User,
    };

    use super::*;

    fn chat() -> Chat {
        Chat {
            id: Uuid::now_v7(),
            user: User {
                id: Uuid::now_v7(),
                name: "Riley".into(),
                organization: None,
            },
            simulation: Simulation {
                id: Uuid::now_v7(),
                name: "Delegation".into(),
                kind: SimulationKind::Predefined,
                nodes: Some(vec![]),
                enhanced_nodes: vec![],
                skill_id: None,
            },
            skill: None,
            hearts: 5.0,
            finished: false,
            messages: vec![],
        }
    }

    fn text_message(chat_id: Uuid) -> Message {
        Message {
            id: Uuid::now_v7(),
            chat_id,
            timestamp: Utc::now(),
            previous_message_id: None,
            node_order: None,
            role: ChatRole::Character,
            character: None,
            interacted: false,
            user_response_time_ms: None,
            response_time_limit_ms: None,
            payload: MessagePayload::Text { content: "hi".into() },
        }
    }

    #[tokio::test]
    async fn commit_makes_writes_visible() {
        let store = MemoryStore::new();
        let seeded = chat();
        let chat_id = seeded.id;
        store.insert_chat(seeded);

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.save_message(text_message(chat_id)).await.unwrap();
        tx.update_chat_hearts(chat_id, 4.0).await.unwrap();
        tx.commit().await.unwrap();

        let committed = store.chat(chat_id).unwrap();
        assert_eq!(committed.messages.len(), 1);
        assert_eq!(committed.hearts, 4.0);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = MemoryStore::new();
        let seeded = chat();
        let chat_id = seeded.id;
        store.insert_chat(seeded);

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.save_message(text_message(chat_id)).await.unwrap();
        tx.mark_chat_finished(chat_id).await.unwrap();
        tx.rollback().await.unwrap();

        let committed = store.chat(chat_id).unwrap();
        assert!(committed.messages.is_empty());
        assert!(!committed.finished);
    }

    #[tokio::test]
    async fn hearts_are_never_stored_negative() {
        let store = MemoryStore::new();
        let seeded = chat();
        let chat_id = seeded.id;
        store.insert_chat(seeded);

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.update_chat_hearts(chat_id, -2.5).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.chat(chat_id).unwrap().hearts, 0.0);
    }

    #[tokio::test]
    async fn visibility_delay_hides_chat_for_n_reads() {
        let store = MemoryStore::new();
        let seeded = chat();
        let chat_id = seeded.id;
        store.insert_chat(seeded);
        store.delay_visibility(chat_id, 2);

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(tx.find_chat_with_messages(chat_id).await.unwrap().is_none());
        assert!(tx.find_chat_with_messages(chat_id).await.unwrap().is_none());
        assert!(tx.find_chat_with_messages(chat_id).await.unwrap().is_some());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn hyper_parameters_default_to_zero() {
        let store = MemoryStore::new();
        let seeded = chat();
        let chat_id = seeded.id;
        store.insert_chat(seeded);

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert_eq!(
            tx.get_or_create_hyper_parameter(chat_id, "empathy").await.unwrap(),
            0.0
        );
        tx.update_hyper_parameter(chat_id, "empathy", 2.5).await.unwrap();
        assert_eq!(
            tx.get_or_create_hyper_parameter(chat_id, "empathy").await.unwrap(),
            2.5
        );
        tx.commit().await.unwrap();

        assert_eq!(store.hyper_parameter(chat_id, "empathy"), Some(2.5));
    }
}
