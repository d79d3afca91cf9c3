//! Append-only conversation store for read APIs
//!
//! Separate from the checkpointed supervisor state: the store keeps the
//! full per-session transcript and is written only by the chat adapter,
//! after the supervisor returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A single conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

/// Interface for long-term conversation history
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a turn to the session transcript
    async fn append_turn(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<HashMap<String, Value>>,
    );

    /// Transcript for a session; with `limit`, the last `limit` turns
    async fn get_history(&self, session_id: &str, limit: Option<usize>) -> Vec<Turn>;

    /// Known session ids
    async fn list_sessions(&self, limit: Option<usize>) -> Vec<String>;
}

/// In-memory conversation store
#[derive(Default)]
pub struct InMemoryConversationStore {
    history: RwLock<HashMap<String, Vec<Turn>>>,
    /// Insertion order of sessions, for stable listing
    order: RwLock<Vec<String>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append_turn(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<HashMap<String, Value>>,
    ) {
        let mut history = self.history.write().await;
        if !history.contains_key(session_id) {
            self.order.write().await.push(session_id.to_string());
        }
        let turns = history.entry(session_id.to_string()).or_default();
        turns.push(Turn {
            role: role.to_string(),
            content: content.to_string(),
            metadata,
        });
    }

    async fn get_history(&self, session_id: &str, limit: Option<usize>) -> Vec<Turn> {
        let history = self.history.read().await;
        let turns = history.get(session_id).cloned().unwrap_or_default();
        match limit {
            Some(limit) if turns.len() > limit => turns[turns.len() - limit..].to_vec(),
            _ => turns,
        }
    }

    async fn list_sessions(&self, limit: Option<usize>) -> Vec<String> {
        let order = self.order.read().await;
        match limit {
            Some(limit) => order.iter().take(limit).cloned().collect(),
            None => order.clone(),
        }
    }
}
