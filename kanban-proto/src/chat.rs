//! Chat feed message type and its limits.

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Maximum length of a chat user name in characters.
pub const MAX_USER_LEN: usize = 40;

/// Maximum length of a chat message text in characters.
pub const MAX_TEXT_LEN: usize = 1000;

/// Default number of messages kept in the shared chat log.
pub const DEFAULT_CHAT_CAPACITY: usize = 100;

/// A message in the shared chat feed, as stored by the server and broadcast
/// in `chat:message` / `chat:history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message id assigned by the server.
    pub id: String,
    /// Display name of the author (at most [`MAX_USER_LEN`] characters).
    pub user: String,
    /// Message body (non-empty, at most [`MAX_TEXT_LEN`] characters).
    pub text: String,
    /// When the server accepted the message.
    pub ts: Timestamp,
}

/// Truncates `s` to at most `max` characters, respecting char boundaries.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
