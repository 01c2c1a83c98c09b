//! Chat Relay: bounded in-memory chat log.
//!
//! The [`ChatLog`] keeps the most recent messages in arrival order. When
//! the cap is exceeded the oldest message is dropped. The full log is
//! replayed to new connections; each accepted message is broadcast once.

use std::collections::VecDeque;

use kanban_proto::chat::{
    ChatMessage, DEFAULT_CHAT_CAPACITY, MAX_TEXT_LEN, MAX_USER_LEN, truncate_chars,
};
use kanban_proto::timestamp::Timestamp;
use uuid::Uuid;

/// Append-only chat log with FIFO eviction.
#[derive(Debug)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLog {
    /// Creates an empty log holding at most [`DEFAULT_CHAT_CAPACITY`] messages.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHAT_CAPACITY)
    }

    /// Creates an empty log with a custom cap (at least one message).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a message, returning the stored copy to broadcast.
    ///
    /// Returns `None` when `text` is blank after trimming. The user name is
    /// trimmed and falls back to `fallback_user` when blank; user and text
    /// are truncated to their character limits.
    pub fn append(&mut self, user: &str, text: &str, fallback_user: &str) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let user = match user.trim() {
            "" => fallback_user,
            u => u,
        };

        let message = ChatMessage {
            id: Uuid::now_v7().to_string(),
            user: truncate_chars(user, MAX_USER_LEN).to_string(),
            text: truncate_chars(text, MAX_TEXT_LEN).to_string(),
            ts: Timestamp::now(),
        };
        self.messages.push_back(message.clone());
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
        Some(message)
    }

    /// All messages, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Maximum number of stored messages.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
