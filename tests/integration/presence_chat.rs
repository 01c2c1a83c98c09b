//! End-to-end tests for presence counting, join/leave notices and chat.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use kanban_client::{BoardClient, ClientOptions};
use kanban_proto::chat::ChatMessage;
use kanban_proto::event::ServerEvent;
use kanban_proto::notice::{Notice, NoticeKind};
use kanban_server::chat::ChatLog;
use kanban_server::hub::{Hub, HubHandle};
use kanban_server::server::start_server_with_hub;

const WAIT: Duration = Duration::from_secs(5);

async fn start_with(chat: ChatLog) -> (String, HubHandle) {
    let hub = Hub::new(chat).spawn();
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

async fn wait_for_presence(client: &BoardClient, expected: usize) {
    tokio::time::timeout(WAIT, async {
        loop {
            if let ServerEvent::PresenceCount { count } = client.next_event().await.unwrap() {
                if count == expected {
                    return;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for presence count");
}

async fn next_notice(client: &BoardClient) -> Notice {
    tokio::time::timeout(WAIT, async {
        loop {
            if let ServerEvent::Notice(notice) = client.next_event().await.unwrap() {
                return notice;
            }
        }
    })
    .await
    .expect("timed out waiting for board:notice")
}

async fn next_chat(client: &BoardClient) -> ChatMessage {
    tokio::time::timeout(WAIT, async {
        loop {
            if let ServerEvent::ChatMessage(message) = client.next_event().await.unwrap() {
                return message;
            }
        }
    })
    .await
    .expect("timed out waiting for chat:message")
}

#[tokio::test]
async fn presence_counts_connections() {
    let (url, hub) = start_with(ChatLog::new()).await;
    let alice = join(&url).await;
    wait_for_presence(&alice, 1).await;

    let bob = join(&url).await;
    wait_for_presence(&alice, 2).await;
    wait_for_presence(&bob, 2).await;
    assert_eq!(hub.snapshot().await.unwrap().connected, 2);

    bob.close().await.unwrap();
    wait_for_presence(&alice, 1).await;
    assert_eq!(alice.presence(), 1);
}

#[tokio::test]
async fn join_and_leave_notices_name_the_actor() {
    let (url, _hub) = start_with(ChatLog::new()).await;
    let alice = join(&url).await;
    assert_eq!(next_notice(&alice).await.kind, NoticeKind::Join); // own join

    let bob = join(&url).await;
    let joined = next_notice(&alice).await;
    assert_eq!(joined.kind, NoticeKind::Join);
    assert!(joined.message.contains(&joined.actor));
    assert!(!joined.actor.is_empty());

    drop(bob);
    let left = next_notice(&alice).await;
    assert_eq!(left.kind, NoticeKind::Leave);
    assert_eq!(left.actor, joined.actor);
}

#[tokio::test]
async fn chat_message_reaches_everyone() {
    let (url, hub) = start_with(ChatLog::new()).await;
    let alice = join(&url).await;
    let bob = join(&url).await;

    alice.send_chat("Ana", "  bom dia  ").await.unwrap();

    let received = next_chat(&bob).await;
    assert_eq!(received.user, "Ana");
    assert_eq!(received.text, "bom dia");
    assert_eq!(next_chat(&alice).await, received);
    assert_eq!(hub.snapshot().await.unwrap().chat, vec![received]);
}

#[tokio::test]
async fn blank_chat_is_ignored_and_blank_user_gets_nickname() {
    let (url, _hub) = start_with(ChatLog::new()).await;
    let client = join(&url).await;

    client.send_chat("Ana", "   ").await.unwrap();
    client.send_chat("", "oi").await.unwrap();

    let message = next_chat(&client).await;
    assert_eq!(message.text, "oi");
    // Nicknames are "<adjective> <animal>".
    assert_eq!(message.user.split(' ').count(), 2);
}

#[tokio::test]
async fn late_joiner_receives_bounded_history() {
    let (url, _hub) = start_with(ChatLog::with_capacity(3)).await;
    let alice = join(&url).await;
    for i in 0..5 {
        alice.send_chat("Ana", &format!("msg {i}")).await.unwrap();
    }
    for _ in 0..5 {
        next_chat(&alice).await;
    }

    let bob = join(&url).await;
    let texts: Vec<String> = bob.chat().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, ["msg 2", "msg 3", "msg 4"]);
}
