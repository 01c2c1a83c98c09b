//! End-to-end tests for board mutations over WebSocket.
//!
//! Every test starts an in-process server on `127.0.0.1:0` and talks to it
//! with [`BoardClient`]s.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use kanban_client::connection::EVENT_BACKLOG;
use kanban_client::{BoardClient, ClientOptions};
use kanban_proto::board::{Board, ColumnId, TaskId};
use kanban_proto::event::{ServerEvent, ToIndex};
use kanban_proto::notice::{Notice, NoticeKind};
use kanban_server::hub::{Hub, HubHandle};
use kanban_server::server::start_server_with_hub;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const WAIT: Duration = Duration::from_secs(5);

async fn start() -> (String, HubHandle) {
    let hub = Hub::default().spawn();
    let (addr, _handle) = start_server_with_hub("127.0.0.1", 0, hub.clone())
        .await
        .expect("server should start");
    (format!("ws://{addr}/ws"), hub)
}

async fn join(url: &str) -> BoardClient {
    BoardClient::connect(url, ClientOptions::default())
        .await
        .expect("client should connect")
}

/// Waits for the next `board:state`, skipping other events.
async fn next_state(client: &BoardClient) -> Board {
    tokio::time::timeout(WAIT, async {
        loop {
            if let ServerEvent::BoardState(board) = client.next_event().await.unwrap() {
                return board;
            }
        }
    })
    .await
    .expect("timed out waiting for board:state")
}

/// Waits for the next mutation notice, skipping join/leave and other events.
async fn next_change_notice(client: &BoardClient) -> Notice {
    tokio::time::timeout(WAIT, async {
        loop {
            if let ServerEvent::Notice(notice) = client.next_event().await.unwrap() {
                if !matches!(notice.kind, NoticeKind::Join | NoticeKind::Leave) {
                    return notice;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for board:notice")
}

fn todo() -> ColumnId {
    ColumnId::new("todo")
}

fn done() -> ColumnId {
    ColumnId::new("done")
}

async fn create(client: &BoardClient, title: &str) -> TaskId {
    client
        .create_task(Some(todo()), Some(title), Some(""))
        .await
        .unwrap();
    let board = next_state(client).await;
    board
        .tasks
        .values()
        .find(|t| t.title == title)
        .map(|t| t.id.clone())
        .expect("created task should be on the board")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initial_board_matches_server() {
    let (url, hub) = start().await;
    let client = join(&url).await;

    let snap = hub.snapshot().await.unwrap();
    assert_eq!(client.board(), snap.board);
    assert_eq!(client.board(), Board::seeded());
    assert!(client.chat().is_empty());
}

#[tokio::test]
async fn create_task_is_broadcast_with_notice() {
    let (url, hub) = start().await;
    let alice = join(&url).await;
    let bob = join(&url).await;

    alice
        .create_task(Some(todo()), Some("Buy milk"), Some(""))
        .await
        .unwrap();

    let board = next_state(&bob).await;
    assert_eq!(board.tasks.len(), 1);
    let task = board.tasks.values().next().unwrap();
    assert_eq!(task.title, "Buy milk");
    assert_eq!(board.column(&todo()).unwrap().task_ids, vec![task.id.clone()]);

    let notice = next_change_notice(&bob).await;
    assert_eq!(notice.kind, NoticeKind::Create);
    assert!(notice.message.contains("Buy milk"));

    assert_eq!(next_state(&alice).await, board);
    assert_eq!(hub.snapshot().await.unwrap().board, board);
}

#[tokio::test]
async fn blank_create_uses_default_title_in_first_column() {
    let (url, _hub) = start().await;
    let client = join(&url).await;

    client.create_task(None, Some("   "), None).await.unwrap();
    let board = next_state(&client).await;
    let task = board.tasks.values().next().unwrap();
    assert_eq!(task.title, "Nova tarefa");
    assert_eq!(board.columns[0].task_ids, vec![task.id.clone()]);
}

#[tokio::test]
async fn move_within_column_reorders() {
    let (url, _hub) = start().await;
    let client = join(&url).await;
    let a = create(&client, "A").await;
    let b = create(&client, "B").await;

    client
        .move_task(a.clone(), todo(), todo(), ToIndex::At(1))
        .await
        .unwrap();
    let board = next_state(&client).await;
    assert_eq!(board.column(&todo()).unwrap().task_ids, vec![b, a]);
}

#[tokio::test]
async fn move_across_columns_clamps_index_and_notifies() {
    let (url, _hub) = start().await;
    let alice = join(&url).await;
    let bob = join(&url).await;
    let a = create(&alice, "A").await;

    alice
        .move_task(a.clone(), todo(), done(), ToIndex::At(99))
        .await
        .unwrap();

    // Bob saw create state, create notice, then move state and notice.
    next_state(&bob).await;
    assert_eq!(next_change_notice(&bob).await.kind, NoticeKind::Create);
    let board = next_state(&bob).await;
    assert!(board.column(&todo()).unwrap().task_ids.is_empty());
    assert_eq!(board.column(&done()).unwrap().task_ids, vec![a.clone()]);

    let notice = next_change_notice(&bob).await;
    assert_eq!(notice.kind, NoticeKind::Move);
    assert!(notice.message.contains("Concluído"));
    assert_eq!(notice.meta.unwrap().task_id, Some(a));
}

#[tokio::test]
async fn empty_column_rename_sends_no_notice() {
    let (url, _hub) = start().await;
    let alice = join(&url).await;
    let bob = join(&url).await;

    alice.rename_column(todo(), "   ").await.unwrap();
    alice
        .create_task(Some(todo()), Some("after"), None)
        .await
        .unwrap();

    // The first mutation notice Bob sees is the create, not a col-rename.
    assert_eq!(next_change_notice(&bob).await.kind, NoticeKind::Create);
    assert_eq!(bob.board().column(&todo()).unwrap().title, "A Fazer");
}

#[tokio::test]
async fn column_rename_is_broadcast() {
    let (url, _hub) = start().await;
    let client = join(&url).await;

    client.rename_column(done(), "Feito").await.unwrap();
    let board = next_state(&client).await;
    assert_eq!(board.column(&done()).unwrap().title, "Feito");

    let notice = next_change_notice(&client).await;
    assert_eq!(notice.kind, NoticeKind::ColRename);
    assert!(notice.message.contains("Feito"));
}

#[tokio::test]
async fn operations_on_deleted_task_are_noops() {
    let (url, hub) = start().await;
    let client = join(&url).await;
    let a = create(&client, "A").await;

    client.delete_task(a.clone()).await.unwrap();
    let board = next_state(&client).await;
    assert!(board.tasks.is_empty());
    assert_eq!(next_change_notice(&client).await.kind, NoticeKind::Delete);

    client
        .move_task(a.clone(), todo(), done(), ToIndex::End)
        .await
        .unwrap();
    client.delete_task(a).await.unwrap();
    let b = create(&client, "B").await;

    // No state was broadcast for the ignored operations.
    let snap = hub.snapshot().await.unwrap();
    assert_eq!(snap.board.tasks.len(), 1);
    assert!(snap.board.tasks.contains_key(&b));
    assert!(snap.board.column(&done()).unwrap().task_ids.is_empty());
}

#[tokio::test]
async fn late_joiner_sees_current_board() {
    let (url, _hub) = start().await;
    let alice = join(&url).await;
    create(&alice, "one").await;
    create(&alice, "two").await;

    let bob = join(&url).await;
    assert_eq!(bob.board(), alice.board());
    assert_eq!(bob.board().tasks.len(), 2);
}

#[tokio::test]
async fn unread_events_stay_bounded() {
    let (url, _hub) = start().await;
    let writer = join(&url).await;
    let watcher = join(&url).await;

    for i in 0..200 {
        writer
            .create_task(Some(todo()), Some(&format!("t{i}")), None)
            .await
            .unwrap();
    }

    // The watcher only reads the replica, never `next_event`.
    tokio::time::timeout(WAIT, async {
        while watcher.board().tasks.len() < 200 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("watcher replica should catch up");

    assert!(watcher.queued_events().await <= EVENT_BACKLOG);
    assert!(writer.queued_events().await <= EVENT_BACKLOG);

    // Reading still works after the backlog overflowed.
    writer.rename_column(done(), "Feito").await.unwrap();
    loop {
        if let ServerEvent::BoardState(board) = watcher.next_event().await.unwrap() {
            if board.column(&done()).unwrap().title == "Feito" {
                break;
            }
        }
    }
}
