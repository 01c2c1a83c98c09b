//! Property-based tests for the board store placement invariants.
//!
//! Uses proptest to verify that for any sequence of create, move, update,
//! delete and rename operations:
//! 1. Every placed task id refers to a live task and appears exactly once.
//! 2. The number of placed ids equals the number of live tasks.
//! 3. Operations on unknown ids leave the board untouched.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use kanban_proto::board::{ColumnId, TaskId};
use kanban_proto::event::ToIndex;
use kanban_server::board::{BoardStore, Change};
use proptest::prelude::*;

const COLUMNS: [&str; 4] = ["todo", "doing", "done", "ghost"];

#[derive(Debug, Clone)]
enum Op {
    Create { column: usize },
    Move { task: usize, from: usize, to: usize, index: ToIndex },
    Update { task: usize, title: String },
    Delete { task: usize },
    Rename { column: usize, title: String },
}

fn arb_index() -> impl Strategy<Value = ToIndex> {
    prop_oneof![
        (-5i64..10).prop_map(ToIndex::At),
        Just(ToIndex::End),
        Just(ToIndex::At(i64::MAX)),
        Just(ToIndex::At(i64::MIN)),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..COLUMNS.len()).prop_map(|column| Op::Create { column }),
        (0usize..16, 0..COLUMNS.len(), 0..COLUMNS.len(), arb_index())
            .prop_map(|(task, from, to, index)| Op::Move { task, from, to, index }),
        (0usize..16, "[ a-z]{0,6}").prop_map(|(task, title)| Op::Update { task, title }),
        (0usize..16).prop_map(|task| Op::Delete { task }),
        (0..COLUMNS.len(), "[ a-z]{0,6}").prop_map(|(column, title)| Op::Rename { column, title }),
    ]
}

/// Picks a previously created id (live or deleted), or an unknown one.
fn pick(ids: &[TaskId], n: usize) -> TaskId {
    if ids.is_empty() || n >= ids.len() * 2 {
        TaskId::new("never-created")
    } else {
        ids[n % ids.len()].clone()
    }
}

fn apply(store: &mut BoardStore, ids: &mut Vec<TaskId>, op: &Op) {
    match op {
        Op::Create { column } => {
            let change = store.create_task(Some(&ColumnId::new(COLUMNS[*column])), Some("t"), None);
            if let Some(Change::Created { task, .. }) = change {
                ids.push(task.id);
            }
        }
        Op::Move { task, from, to, index } => {
            store.move_task(
                &pick(ids, *task),
                &ColumnId::new(COLUMNS[*from]),
                &ColumnId::new(COLUMNS[*to]),
                *index,
            );
        }
        Op::Update { task, title } => {
            store.update_task(&pick(ids, *task), Some(title.as_str()), None);
        }
        Op::Delete { task } => {
            store.delete_task(&pick(ids, *task));
        }
        Op::Rename { column, title } => {
            store.rename_column(&ColumnId::new(COLUMNS[*column]), Some(title.as_str()));
        }
    }
}

proptest! {
    #[test]
    fn placement_invariants_hold_after_every_op(ops in prop::collection::vec(arb_op(), 1..60)) {
        let mut store = BoardStore::new();
        let mut ids = Vec::new();
        for op in &ops {
            apply(&mut store, &mut ids, op);
            prop_assert_eq!(store.check_invariants(), Ok(()));
            prop_assert_eq!(store.board().placed_count(), store.task_count());
        }
    }

    #[test]
    fn titles_are_never_blank(ops in prop::collection::vec(arb_op(), 1..60)) {
        let mut store = BoardStore::new();
        let mut ids = Vec::new();
        for op in &ops {
            apply(&mut store, &mut ids, op);
        }
        for task in store.board().tasks.values() {
            prop_assert!(!task.title.trim().is_empty());
        }
        for column in &store.board().columns {
            prop_assert!(!column.title.trim().is_empty());
        }
    }

    #[test]
    fn moves_preserve_task_count(
        creates in prop::collection::vec(0usize..3, 1..8),
        moves in prop::collection::vec((0usize..8, 0usize..3, 0usize..3, arb_index()), 0..40),
    ) {
        let mut store = BoardStore::new();
        let mut ids = Vec::new();
        for column in creates {
            apply(&mut store, &mut ids, &Op::Create { column });
        }
        let live = store.task_count();
        for (task, from, to, index) in moves {
            apply(&mut store, &mut ids, &Op::Move { task, from, to, index });
            prop_assert_eq!(store.task_count(), live);
            prop_assert_eq!(store.board().placed_count(), live);
        }
    }

    #[test]
    fn unknown_task_operations_are_noops(index in arb_index(), title in "[a-z]{1,6}") {
        let mut store = BoardStore::new();
        let mut ids = Vec::new();
        apply(&mut store, &mut ids, &Op::Create { column: 0 });
        let before = store.snapshot();

        let ghost = TaskId::new("ghost");
        prop_assert!(store.move_task(&ghost, &ColumnId::new("todo"), &ColumnId::new("done"), index).is_none());
        prop_assert!(store.update_task(&ghost, Some(title.as_str()), Some("")).is_none());
        prop_assert!(store.delete_task(&ghost).is_none());
        prop_assert_eq!(store.snapshot(), before);
    }
}
