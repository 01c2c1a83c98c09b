//! End-to-end tests for debounced edits and discard-while-typing.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use kanban_client::{BoardClient, ClientOptions, EditField};
use kanban_proto::board::{Board, ColumnId, TaskId};
use kanban_proto::event::ServerEvent;
use kanban_server::hub::{Hub, HubHandle};
use kanban_server::server::start_server_with_hub;

const WAIT: Duration = Duration::from_secs(5);

async fn start() -> (String, HubHandle) {
    let hub = Hub::default().spawn();
    let (addr, _handle) = start_server_with_hub("127.0.0.1", 0, hub.clone())
        .await
        .expect("server should start");
    (format!("ws://{addr}/ws"), hub)
}

async fn join(url: &str, options: ClientOptions) -> BoardClient {
    BoardClient::connect(url, options)
        .await
        .expect("client should connect")
}

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

async fn seed_task(client: &BoardClient, title: &str) -> TaskId {
    client
        .create_task(Some(ColumnId::new("todo")), Some(title), None)
        .await
        .unwrap();
    let board = next_state(client).await;
    board
        .tasks
        .values()
        .find(|t| t.title == title)
        .map(|t| t.id.clone())
        .unwrap()
}

#[tokio::test]
async fn snapshots_are_discarded_while_typing() {
    let (url, hub) = start().await;
    let options = ClientOptions {
        debounce: Duration::from_secs(30),
        settle: Duration::from_millis(200),
        ..ClientOptions::default()
    };
    let alice = join(&url, options).await;
    let bob = join(&url, ClientOptions::default()).await;

    let id = seed_task(&alice, "draft").await;
    next_state(&bob).await;

    alice.edit(&id, EditField::Title, "Draft v2");
    assert!(alice.is_typing());

    // Bob's change arrives while Alice is still typing.
    bob.create_task(None, Some("other"), None).await.unwrap();
    next_state(&alice).await;
    assert_eq!(alice.discarded(), 1);
    assert_eq!(alice.board().tasks[&id].title, "Draft v2");
    assert_eq!(alice.board().tasks.len(), 1);

    // Relay the edit; its own echo lands during the settle delay.
    alice.flush().await.unwrap();
    let echoed = next_state(&bob).await;
    let echoed = if echoed.tasks[&id].title == "Draft v2" {
        echoed
    } else {
        next_state(&bob).await
    };
    assert_eq!(echoed.tasks[&id].title, "Draft v2");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!alice.is_typing());

    bob.create_task(None, Some("third"), None).await.unwrap();
    loop {
        let board = next_state(&alice).await;
        if board.tasks.len() == 3 {
            break;
        }
    }
    assert_eq!(alice.board().tasks.len(), 3);
    assert_eq!(alice.board().tasks[&id].title, "Draft v2");
    assert_eq!(alice.board(), hub.snapshot().await.unwrap().board);
}

#[tokio::test]
async fn rapid_edits_are_coalesced_into_one_update() {
    let (url, hub) = start().await;
    let options = ClientOptions {
        debounce: Duration::from_millis(100),
        settle: Duration::from_millis(50),
        ..ClientOptions::default()
    };
    let alice = join(&url, options).await;
    let bob = join(&url, ClientOptions::default()).await;

    let id = seed_task(&alice, "a").await;
    next_state(&bob).await;

    alice.edit(&id, EditField::Title, "ab");
    alice.edit(&id, EditField::Title, "abc");
    alice.edit(&id, EditField::Description, "notes");

    // Bob's first state after the edits already carries the final values.
    let board = next_state(&bob).await;
    let task = &board.tasks[&id];
    assert_eq!(task.title, "abc");
    assert_eq!(task.description, "notes");
    assert_eq!(hub.snapshot().await.unwrap().board.tasks[&id].title, "abc");
}

#[tokio::test]
async fn blank_title_edit_keeps_server_title() {
    let (url, hub) = start().await;
    let options = ClientOptions {
        debounce: Duration::from_secs(30),
        settle: Duration::from_millis(10),
        ..ClientOptions::default()
    };
    let alice = join(&url, options).await;
    let id = seed_task(&alice, "keep me").await;

    alice.edit(&id, EditField::Title, "   ");
    alice.edit(&id, EditField::Description, "");
    alice.flush().await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    alice.create_task(None, Some("nudge"), None).await.unwrap();
    loop {
        if next_state(&alice).await.tasks.len() == 2 {
            break;
        }
    }
    assert_eq!(alice.board().tasks[&id].title, "keep me");
    assert_eq!(hub.snapshot().await.unwrap().board.tasks[&id].title, "keep me");
}

#[tokio::test]
async fn close_relays_pending_edits() {
    let (url, hub) = start().await;
    let options = ClientOptions {
        debounce: Duration::from_secs(30),
        ..ClientOptions::default()
    };
    let alice = join(&url, options).await;
    let id = seed_task(&alice, "old").await;

    alice.edit(&id, EditField::Title, "new");
    alice.close().await.unwrap();
    assert!(!alice.is_connected());

    tokio::time::timeout(WAIT, async {
        loop {
            let snap = hub.snapshot().await.unwrap();
            if snap.board.tasks[&id].title == "new" {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("pending edit should reach the server before close");
}
