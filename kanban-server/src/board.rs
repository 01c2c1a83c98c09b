//! Board State Store: the single owner of the canonical board.
//!
//! Every mutation goes through a [`BoardStore`] method. Each method either
//! returns `None` (a referenced task or column does not exist, nothing
//! happened) or a [`Change`] describing what was applied, with the
//! before/after values the notice composer and the mutation log need.
//!
//! Invariants kept by every method:
//! - every id in any column's `task_ids` has an entry in `tasks`;
//! - every task appears in exactly one column, exactly once.

use kanban_proto::board::{Board, ColumnId, DEFAULT_TASK_TITLE, Task, TaskId};
use kanban_proto::event::ToIndex;

/// A mutation that was applied to the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A task was created and appended to a column.
    Created {
        /// The new task.
        task: Task,
        /// Column it was placed in.
        column_id: ColumnId,
    },
    /// A task was moved; `from == to` when the drop left it in place.
    Moved {
        /// Task that moved.
        task_id: TaskId,
        /// Its title, for display.
        title: String,
        /// Column and index before the move.
        from: (ColumnId, usize),
        /// Column and index after the move.
        to: (ColumnId, usize),
        /// Title of the destination column, for display.
        to_column_title: String,
    },
    /// A task's title and/or description was edited.
    Updated {
        /// Task that was edited.
        task_id: TaskId,
        /// Title before the edit.
        old_title: String,
        /// Title after the edit (equal to `old_title` if unchanged).
        new_title: String,
        /// Whether the description was overwritten with a different value.
        description_changed: bool,
    },
    /// A task was removed from the board.
    Deleted {
        /// Removed task id.
        task_id: TaskId,
        /// Its last title.
        title: String,
    },
    /// A column title was edited.
    ColumnRenamed {
        /// Column that was renamed.
        column_id: ColumnId,
        /// Title before.
        old_title: String,
        /// Title after (equal to `old_title` if unchanged).
        new_title: String,
    },
}

impl Change {
    /// Whether the change is visible to users, i.e. the board differs from
    /// before the operation.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        match self {
            Self::Created { .. } | Self::Deleted { .. } => true,
            Self::Moved { from, to, .. } => from != to,
            Self::Updated {
                old_title,
                new_title,
                description_changed,
                ..
            } => old_title != new_title || *description_changed,
            Self::ColumnRenamed {
                old_title,
                new_title,
                ..
            } => old_title != new_title,
        }
    }

    /// Operation name used in logs.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Created { .. } => "create",
            Self::Moved { .. } => "move",
            Self::Updated { .. } => "update",
            Self::Deleted { .. } => "delete",
            Self::ColumnRenamed { .. } => "col-rename",
        }
    }
}

/// Returns the trimmed title if it is non-blank.
fn usable_title(title: Option<&str>) -> Option<&str> {
    title.map(str::trim).filter(|t| !t.is_empty())
}

/// Owns the authoritative board and applies mutations to it.
#[derive(Debug, Clone)]
pub struct BoardStore {
    board: Board,
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardStore {
    /// Creates a store holding the seeded three-column board.
    #[must_use]
    pub fn new() -> Self {
        Self {
            board: Board::seeded(),
        }
    }

    /// Creates a store around an existing board.
    #[must_use]
    pub const fn with_board(board: Board) -> Self {
        Self { board }
    }

    /// Read-only view of the current board.
    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Clones the current board for broadcasting.
    #[must_use]
    pub fn snapshot(&self) -> Board {
        self.board.clone()
    }

    /// Number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.board.tasks.len()
    }

    /// Creates a task.
    ///
    /// The title is trimmed and defaults to [`DEFAULT_TASK_TITLE`]; an
    /// unknown or absent column falls back to the first column. Returns
    /// `None` only when the board has no columns at all.
    pub fn create_task(
        &mut self,
        column_id: Option<&ColumnId>,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Option<Change> {
        let idx = column_id
            .and_then(|cid| self.column_index(cid))
            .unwrap_or(0);
        let column = self.board.columns.get_mut(idx)?;

        let id = TaskId::generate();
        let task = Task {
            id: id.clone(),
            title: usable_title(title).unwrap_or(DEFAULT_TASK_TITLE).to_string(),
            description: description.unwrap_or_default().to_string(),
        };
        column.task_ids.push(id.clone());
        let column_id = column.id.clone();

        self.board.tasks.insert(id, task.clone());
        Some(Change::Created { task, column_id })
    }

    /// Moves a task to `to_index` in `to_column_id`.
    ///
    /// No-op when either column is unknown or the task does not exist. The
    /// id is removed from whichever column currently holds it before being
    /// inserted, so a stale `from_column_id` can never duplicate it.
    pub fn move_task(
        &mut self,
        task_id: &TaskId,
        from_column_id: &ColumnId,
        to_column_id: &ColumnId,
        to_index: ToIndex,
    ) -> Option<Change> {
        self.column_index(from_column_id)?;
        let to_idx = self.column_index(to_column_id)?;
        let title = self.board.tasks.get(task_id)?.title.clone();

        let mut from = None;
        for column in &mut self.board.columns {
            if let Some(pos) = column.position(task_id) {
                from.get_or_insert((column.id.clone(), pos));
                column.task_ids.retain(|id| id != task_id);
            }
        }

        let dest = &mut self.board.columns[to_idx];
        let pos = to_index.clamp(dest.task_ids.len());
        dest.task_ids.insert(pos, task_id.clone());
        let to = (dest.id.clone(), pos);

        Some(Change::Moved {
            task_id: task_id.clone(),
            title,
            from: from.unwrap_or_else(|| to.clone()),
            to,
            to_column_title: dest.title.clone(),
        })
    }

    /// Edits a task.
    ///
    /// A title that is blank after trimming is ignored so an empty in-flight
    /// edit cannot erase it; a provided description is applied verbatim.
    pub fn update_task(
        &mut self,
        task_id: &TaskId,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Option<Change> {
        let task = self.board.tasks.get_mut(task_id)?;
        let old_title = task.title.clone();

        if let Some(title) = usable_title(title) {
            title.clone_into(&mut task.title);
        }
        let mut description_changed = false;
        if let Some(description) = description {
            description_changed = task.description != description;
            description.clone_into(&mut task.description);
        }

        Some(Change::Updated {
            task_id: task_id.clone(),
            old_title,
            new_title: task.title.clone(),
            description_changed,
        })
    }

    /// Deletes a task from the task map and from every column.
    pub fn delete_task(&mut self, task_id: &TaskId) -> Option<Change> {
        let task = self.board.tasks.remove(task_id)?;
        for column in &mut self.board.columns {
            column.task_ids.retain(|id| id != task_id);
        }
        Some(Change::Deleted {
            task_id: task.id,
            title: task.title,
        })
    }

    /// Renames a column; a blank title keeps the previous one.
    pub fn rename_column(&mut self, column_id: &ColumnId, title: Option<&str>) -> Option<Change> {
        let idx = self.column_index(column_id)?;
        let column = &mut self.board.columns[idx];
        let old_title = column.title.clone();
        if let Some(title) = usable_title(title) {
            title.clone_into(&mut column.title);
        }
        Some(Change::ColumnRenamed {
            column_id: column.id.clone(),
            old_title,
            new_title: column.title.clone(),
        })
    }

    /// Verifies the placement invariants, returning a description of the
    /// first violation found.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending task id.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = std::collections::BTreeSet::new();
        for column in &self.board.columns {
            for id in &column.task_ids {
                if !self.board.tasks.contains_key(id) {
                    return Err(format!("column {} references unknown task {id}", column.id));
                }
                if !seen.insert(id) {
                    return Err(format!("task {id} placed more than once"));
                }
            }
        }
        if let Some(orphan) = self.board.tasks.keys().find(|id| !seen.contains(id)) {
            return Err(format!("task {orphan} is not placed in any column"));
        }
        Ok(())
    }

    fn column_index(&self, id: &ColumnId) -> Option<usize> {
        self.board.columns.iter().position(|c| &c.id == id)
    }
}
