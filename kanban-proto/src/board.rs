//! Board data model shared by the server and its clients.
//!
//! A [`Board`] is an ordered list of [`Column`]s, each holding an ordered
//! list of [`TaskId`]s, plus a map from [`TaskId`] to [`Task`]. Column order
//! and the order of ids inside a column define what clients display.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a task created without a usable title.
pub const DEFAULT_TASK_TITLE: &str = "Nova tarefa";

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a fresh, globally unique task identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of a column, assigned when the board is seeded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(String);

impl ColumnId {
    /// Wraps an existing identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ColumnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of work shown as a card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Immutable identifier generated at creation.
    pub id: TaskId,
    /// Display title, never empty.
    pub title: String,
    /// Free-form description, may be empty.
    #[serde(default)]
    pub description: String,
}

/// A named, ordered bucket of task references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Immutable identifier.
    pub id: ColumnId,
    /// Mutable display title.
    pub title: String,
    /// Display order of the tasks in this column.
    pub task_ids: Vec<TaskId>,
}

impl Column {
    /// Creates an empty column.
    #[must_use]
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: ColumnId::new(id),
            title: title.to_string(),
            task_ids: Vec::new(),
        }
    }

    /// Returns the position of `task_id` in this column, if present.
    #[must_use]
    pub fn position(&self, task_id: &TaskId) -> Option<usize> {
        self.task_ids.iter().position(|id| id == task_id)
    }
}

/// The single shared kanban document.
///
/// This is also the payload of the `board:state` event, so its serialized
/// form is exactly what every client renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Columns in display order.
    pub columns: Vec<Column>,
    /// All live tasks keyed by id.
    pub tasks: BTreeMap<TaskId, Task>,
}

impl Board {
    /// Creates the board every process starts with: three empty columns.
    #[must_use]
    pub fn seeded() -> Self {
        Self {
            columns: vec![
                Column::new("todo", "A Fazer"),
                Column::new("doing", "Fazendo"),
                Column::new("done", "Concluído"),
            ],
            tasks: BTreeMap::new(),
        }
    }

    /// Looks up a column by id.
    #[must_use]
    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    /// Returns the column currently holding `task_id`, if any.
    #[must_use]
    pub fn column_of(&self, task_id: &TaskId) -> Option<&Column> {
        self.columns.iter().find(|c| c.position(task_id).is_some())
    }

    /// Total number of task references across all columns.
    #[must_use]
    pub fn placed_count(&self) -> usize {
        self.columns.iter().map(|c| c.task_ids.len()).sum()
    }
}
