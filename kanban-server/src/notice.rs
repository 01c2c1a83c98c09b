//! Notification Composer: turns applied board changes and session events
//! into human-readable [`Notice`]s.
//!
//! Composition is pure; the hub decides where the notice goes.

use kanban_proto::notice::{Notice, NoticeKind, NoticeMeta};
use kanban_proto::timestamp::Timestamp;

use crate::board::Change;

/// Builds the notice for an applied change, or `None` when the change is not
/// worth announcing (no-op renames, in-place drops, description-only edits).
#[must_use]
pub fn compose(change: &Change, actor: &str) -> Option<Notice> {
    let (kind, message, meta) = match change {
        Change::Created { task, column_id } => (
            NoticeKind::Create,
            format!("Nova tarefa “{}”", task.title),
            NoticeMeta {
                task_id: Some(task.id.clone()),
                column_id: Some(column_id.clone()),
                ..NoticeMeta::default()
            },
        ),
        Change::Moved {
            task_id,
            title,
            from,
            to,
            to_column_title,
        } => {
            if from == to {
                return None;
            }
            (
                NoticeKind::Move,
                format!("“{title}” movida para {to_column_title}"),
                NoticeMeta {
                    task_id: Some(task_id.clone()),
                    to_column_id: Some(to.0.clone()),
                    ..NoticeMeta::default()
                },
            )
        }
        Change::Updated {
            task_id,
            old_title,
            new_title,
            ..
        } => {
            if old_title == new_title {
                return None;
            }
            (
                NoticeKind::Rename,
                format!("“{old_title}” agora é “{new_title}”"),
                NoticeMeta {
                    task_id: Some(task_id.clone()),
                    ..NoticeMeta::default()
                },
            )
        }
        Change::Deleted { task_id, title } => (
            NoticeKind::Delete,
            format!("Tarefa “{title}” excluída"),
            NoticeMeta {
                task_id: Some(task_id.clone()),
                ..NoticeMeta::default()
            },
        ),
        Change::ColumnRenamed {
            column_id,
            old_title,
            new_title,
        } => {
            if old_title == new_title {
                return None;
            }
            (
                NoticeKind::ColRename,
                format!("Coluna “{old_title}” → “{new_title}”"),
                NoticeMeta {
                    column_id: Some(column_id.clone()),
                    ..NoticeMeta::default()
                },
            )
        }
    };

    Some(Notice {
        kind,
        message,
        actor: actor.to_string(),
        meta: Some(meta),
        at: Timestamp::now(),
    })
}

/// Notice broadcast when a connection joins.
#[must_use]
pub fn joined(actor: &str) -> Notice {
    Notice {
        kind: NoticeKind::Join,
        message: format!("{actor} entrou no board"),
        actor: actor.to_string(),
        meta: None,
        at: Timestamp::now(),
    }
}

/// Notice broadcast when a connection leaves.
#[must_use]
pub fn left(actor: &str) -> Notice {
    Notice {
        kind: NoticeKind::Leave,
        message: format!("{actor} saiu"),
        actor: actor.to_string(),
        meta: None,
        at: Timestamp::now(),
    }
}
