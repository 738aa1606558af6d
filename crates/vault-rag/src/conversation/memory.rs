//! Bounded in-memory conversation store using moka.
//!
//! Sessions are evicted after an idle period or when the session count
//! exceeds its bound. Each session carries its own lock, so appends to one
//! conversation never wait on another.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use parking_lot::Mutex;

use crate::config::ConversationConfig;
use crate::error::Result;
use crate::types::Turn;

use super::ConversationStore;

type Session = Arc<Mutex<Vec<Turn>>>;

/// In-memory conversation store
pub struct MemoryConversationStore {
    sessions: Cache<String, Session>,
    max_turns: Option<usize>,
}

impl MemoryConversationStore {
    pub fn new(config: &ConversationConfig) -> Self {
        let sessions = Cache::builder()
            .max_capacity(config.max_conversations)
            .time_to_idle(Duration::from_secs(config.idle_ttl_secs))
            .build();

        Self {
            sessions,
            max_turns: config.max_turns.map(|max| max.max(1)),
        }
    }

    /// Drop a conversation
    pub fn evict(&self, id: &str) {
        self.sessions.invalidate(id);
    }

    /// Number of live conversations (approximate until pending tasks run)
    pub fn len(&self) -> u64 {
        self.sessions.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new(&ConversationConfig::default())
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(&self, id: &str, question: &str, answer: &str) -> Result<()> {
        let session = self
            .sessions
            .get_with(id.to_string(), || Arc::new(Mutex::new(Vec::new())));

        let mut turns = session.lock();
        turns.push(Turn::new(question, answer));
        if let Some(max_turns) = self.max_turns {
            let excess = turns.len().saturating_sub(max_turns);
            turns.drain(..excess);
        }
        Ok(())
    }

    async fn history(&self, id: &str) -> Result<Vec<Turn>> {
        Ok(self
            .sessions
            .get(id)
            .map(|session| session.lock().clone())
            .unwrap_or_default())
    }
}
