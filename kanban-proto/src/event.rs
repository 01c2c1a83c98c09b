//! Wire protocol between board clients and the server.
//!
//! Every WebSocket text frame carries one JSON object of the form
//! `{"event": "<name>", "data": {...}}`. Clients send [`ClientEvent`]s
//! (mutation intents and chat messages); the server answers with
//! [`ServerEvent`]s (full board snapshots, notices, presence, chat).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::board::{Board, ColumnId, TaskId};
use crate::chat::ChatMessage;
use crate::notice::Notice;

/// Errors produced while encoding or decoding protocol frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The event could not be serialized.
    #[error("event encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not a valid event.
    #[error("event decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Destination index of a move.
///
/// Integers (and integral floats like `2.0`) are clamped into the
/// destination column; anything else on the wire (absent, fractional,
/// string, null) means "append at the end".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToIndex {
    /// Requested position, possibly out of range.
    At(i64),
    /// Append after the last task.
    #[default]
    End,
}

impl ToIndex {
    /// Resolves the requested index against a column of length `len`.
    #[must_use]
    pub fn clamp(self, len: usize) -> usize {
        match self {
            Self::At(i) if i <= 0 => 0,
            Self::At(i) => usize::try_from(i).map_or(len, |i| i.min(len)),
            Self::End => len,
        }
    }
}

impl Serialize for ToIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::At(i) => serializer.serialize_i64(*i),
            Self::End => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for ToIndex {
    // Integral floats such as `2.0` count as integers; out-of-range values
    // saturate and are clamped later.
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let index = value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        });
        Ok(index.map_or(Self::End, Self::At))
    }
}

/// Payload of `task:create`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    /// Target column; unknown or absent falls back to the first column.
    #[serde(default)]
    pub column_id: Option<ColumnId>,
    /// Initial title; blank falls back to the default title.
    #[serde(default)]
    pub title: Option<String>,
    /// Initial description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Payload of `task:move`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTask {
    /// Task being moved.
    pub task_id: TaskId,
    /// Column the client saw the task in when the drag started.
    pub from_column_id: ColumnId,
    /// Column the task was dropped on.
    pub to_column_id: ColumnId,
    /// Drop position inside the destination column.
    #[serde(default)]
    pub to_index: ToIndex,
}

/// Payload of `task:update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTask {
    /// Task being edited.
    pub task_id: TaskId,
    /// New title; ignored when blank after trimming.
    #[serde(default)]
    pub title: Option<String>,
    /// New description; applied verbatim, including empty.
    #[serde(default)]
    pub description: Option<String>,
}

/// Payload of `task:delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTask {
    /// Task being deleted.
    pub task_id: TaskId,
}

/// Payload of `column:rename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameColumn {
    /// Column being renamed.
    pub column_id: ColumnId,
    /// New title; ignored when blank after trimming.
    #[serde(default)]
    pub title: Option<String>,
}

/// Payload of the inbound `chat:message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendChat {
    /// Author name chosen by the client.
    #[serde(default)]
    pub user: String,
    /// Message text.
    #[serde(default)]
    pub text: String,
}

/// Events sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Create a task in a column.
    #[serde(rename = "task:create")]
    CreateTask(CreateTask),
    /// Move a task between or within columns.
    #[serde(rename = "task:move")]
    MoveTask(MoveTask),
    /// Edit a task's title and/or description.
    #[serde(rename = "task:update")]
    UpdateTask(UpdateTask),
    /// Delete a task.
    #[serde(rename = "task:delete")]
    DeleteTask(DeleteTask),
    /// Rename a column.
    #[serde(rename = "column:rename")]
    RenameColumn(RenameColumn),
    /// Post a chat message.
    #[serde(rename = "chat:message")]
    Chat(SendChat),
}

impl ClientEvent {
    /// Wire name of the event, used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateTask(_) => "task:create",
            Self::MoveTask(_) => "task:move",
            Self::UpdateTask(_) => "task:update",
            Self::DeleteTask(_) => "task:delete",
            Self::RenameColumn(_) => "column:rename",
            Self::Chat(_) => "chat:message",
        }
    }
}

/// Events sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full board snapshot.
    #[serde(rename = "board:state")]
    BoardState(Board),
    /// Human-readable description of a change, join or leave.
    #[serde(rename = "board:notice")]
    Notice(Notice),
    /// Number of connected clients.
    #[serde(rename = "presence:count")]
    PresenceCount {
        /// Live connection count.
        count: usize,
    },
    /// Entire chat log, sent once to a new connection.
    #[serde(rename = "chat:history")]
    ChatHistory {
        /// Messages oldest first.
        messages: Vec<ChatMessage>,
    },
    /// A newly appended chat message.
    #[serde(rename = "chat:message")]
    ChatMessage(ChatMessage),
}

/// Encodes a [`ClientEvent`] into a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_client(event: &ClientEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

/// Decodes a [`ClientEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if the frame is not a known event.
pub fn decode_client(text: &str) -> Result<ClientEvent, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Encodes a [`ServerEvent`] into a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_server(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

/// Decodes a [`ServerEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if the frame is not a known event.
pub fn decode_server(text: &str) -> Result<ServerEvent, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}
