//! Conversation memory kept across runs when memory mode is on

use super::message::Message;
use serde::{Deserialize, Serialize};

/// One completed run: the user message, any tool exchanges, and the final
/// assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub messages: Vec<Message>,
}

impl Turn {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn user_text(&self) -> &str {
        self.messages
            .iter()
            .find_map(|m| match m {
                Message::User { content } => Some(content.as_str()),
                _ => None,
            })
            .unwrap_or("")
    }

    pub fn answer(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::Assistant { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .unwrap_or("")
    }
}

/// Ordered sequence of completed turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// All remembered messages, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.turns
            .iter()
            .flat_map(|t| t.messages.iter().cloned())
            .collect()
    }
}
