//! Keyed persistent store of supervisor state per session

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::domain::SupervisorState;
use crate::error::DispatchResult;

/// Keyed store of per-session supervisor state. Backends must serialize
/// reads and writes for a given thread id; the supervisor additionally
/// holds a per-session lock across the whole turn.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn get(&self, thread_id: &str) -> DispatchResult<Option<SupervisorState>>;

    async fn put(&self, thread_id: &str, state: SupervisorState) -> DispatchResult<()>;

    async fn delete(&self, thread_id: &str) -> DispatchResult<()>;
}

struct Entry {
    state: SupervisorState,
    saved_at: Instant,
}

/// In-memory checkpointer with per-entry TTL. Expired sessions are dropped
/// lazily on read.
pub struct InMemoryCheckpointer {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl InMemoryCheckpointer {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn get(&self, thread_id: &str) -> DispatchResult<Option<SupervisorState>> {
        {
            let entries = self.entries.read().await;
            match entries.get(thread_id) {
                None => return Ok(None),
                Some(entry) if entry.saved_at.elapsed() < self.ttl => {
                    return Ok(Some(entry.state.clone()))
                }
                Some(_) => {}
            }
        }
        // Entry expired: drop it
        self.entries.write().await.remove(thread_id);
        Ok(None)
    }

    async fn put(&self, thread_id: &str, state: SupervisorState) -> DispatchResult<()> {
        self.entries.write().await.insert(
            thread_id.to_string(),
            Entry {
                state,
                saved_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> DispatchResult<()> {
        self.entries.write().await.remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Message;

    fn state_with_message(text: &str) -> SupervisorState {
        let mut state = SupervisorState {
            session_id: "s1".into(),
            ..Default::default()
        };
        state.messages.push(Message::user(text));
        state
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let cp = InMemoryCheckpointer::new(Duration::from_secs(60));
        cp.put("s1", state_with_message("hello")).await.unwrap();

        let loaded = cp.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "hello");
        assert!(cp.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let cp = InMemoryCheckpointer::new(Duration::from_millis(10));
        cp.put("s1", state_with_message("hello")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cp.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cp = InMemoryCheckpointer::new(Duration::from_secs(60));
        cp.put("s1", state_with_message("hello")).await.unwrap();
        cp.delete("s1").await.unwrap();
        assert!(cp.get("s1").await.unwrap().is_none());
    }
}
