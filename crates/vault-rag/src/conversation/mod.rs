//! Conversation history keyed by an opaque conversation id

mod memory;

pub use memory::MemoryConversationStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Turn;

/// Per-conversation turn history
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a turn; the conversation is created on first reference
    async fn append(&self, id: &str, question: &str, answer: &str) -> Result<()>;

    /// Turns in the order they were appended; empty for an unknown id
    async fn history(&self, id: &str) -> Result<Vec<Turn>>;

    /// Fresh conversation id
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Render turns as `Human:`/`AI:` lines in order
pub fn format_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("Human: {}\nAI: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_history() {
        let turns = vec![Turn::new("q1", "a1"), Turn::new("q2", "a2")];
        assert_eq!(format_history(&turns), "Human: q1\nAI: a1\nHuman: q2\nAI: a2");
        assert_eq!(format_history(&[]), "");
    }
}
