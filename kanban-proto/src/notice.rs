//! Human-readable board notices broadcast in `board:notice`.

use serde::{Deserialize, Serialize};

use crate::board::{ColumnId, TaskId};
use crate::timestamp::Timestamp;

/// What kind of event a [`Notice`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeKind {
    /// A client connected.
    Join,
    /// A client disconnected.
    Leave,
    /// A task was created.
    Create,
    /// A task changed column or position.
    Move,
    /// A task title changed.
    Rename,
    /// A column title changed.
    ColRename,
    /// A task was deleted.
    Delete,
}

impl std::fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Join => write!(f, "join"),
            Self::Leave => write!(f, "leave"),
            Self::Create => write!(f, "create"),
            Self::Move => write!(f, "move"),
            Self::Rename => write!(f, "rename"),
            Self::ColRename => write!(f, "col-rename"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Entity references attached to a notice so clients can highlight them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeMeta {
    /// Task the notice is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Column the notice is about (create, col-rename).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<ColumnId>,
    /// Destination column of a move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_column_id: Option<ColumnId>,
}

/// An ephemeral description of something that happened on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    /// Summary in the deployment language.
    pub message: String,
    /// Display name of the connection that caused it.
    pub actor: String,
    /// Optional entity references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NoticeMeta>,
    /// When the server emitted the notice.
    pub at: Timestamp,
}
