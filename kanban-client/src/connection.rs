//! WebSocket client for the board server.
//!
//! [`BoardClient::connect`] performs the handshake, waits for the initial
//! `board:state` and `chat:history`, then spawns two background tasks:
//!
//! - a reader that decodes server frames, feeds them to the shared
//!   [`BoardReplica`] and forwards them to [`BoardClient::next_event`]
//!   through a bounded backlog;
//! - a flusher that sleeps until the debounce deadline and relays pending
//!   field edits as `task:update` events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use kanban_proto::board::{Board, ColumnId, TaskId};
use kanban_proto::chat::ChatMessage;
use kanban_proto::event::{
    self, ClientEvent, CreateTask, DeleteTask, MoveTask, ProtocolError, RenameColumn, SendChat,
    ServerEvent, ToIndex, UpdateTask,
};
use kanban_proto::notice::Notice;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::sync::{BoardReplica, ClientOptions, EditField, Reconcile};

/// Write half of the WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Read half of the WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Events kept for [`BoardClient::next_event`]; older unread ones are
/// dropped. The replica is updated regardless.
pub const EVENT_BACKLOG: usize = 64;

/// Errors returned by [`BoardClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server URL is malformed or not `ws://` / `wss://`.
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    /// The handshake or initial sync did not finish in time.
    #[error("timed out connecting to the board server")]
    Timeout,

    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

/// A live connection to the board server.
pub struct BoardClient {
    ws_sender: Arc<Mutex<WsSender>>,
    replica: Arc<parking_lot::Mutex<BoardReplica>>,
    incoming: Mutex<broadcast::Receiver<ServerEvent>>,
    connected: Arc<AtomicBool>,
    edits: Arc<Notify>,
    reader_handle: tokio::task::JoinHandle<()>,
    flusher_handle: tokio::task::JoinHandle<()>,
}

impl BoardClient {
    /// Connects to `url` (for example `ws://127.0.0.1:3000/ws`) and waits
    /// for the initial board and chat history.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidUrl`] if `url` is not a WebSocket URL.
    /// - [`ClientError::Timeout`] if the handshake or initial sync is slow.
    /// - [`ClientError::WebSocket`] / [`ClientError::Closed`] on transport
    ///   failure during the handshake.
    pub async fn connect(url: &str, options: ClientOptions) -> Result<Self, ClientError> {
        let parsed = url::Url::parse(url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme {:?}",
                parsed.scheme()
            )));
        }

        let (ws_stream, _response) =
            tokio::time::timeout(options.connect_timeout, connect_async(url))
                .await
                .map_err(|_| {
                    tracing::warn!(url, "board server connect timed out");
                    ClientError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url, err = %e, "board server connect failed");
                    ClientError::WebSocket(Box::new(e))
                })?;

        let (ws_sender, mut ws_reader) = ws_stream.split();

        let replica = tokio::time::timeout(
            options.connect_timeout,
            initial_sync(&mut ws_reader, &options),
        )
        .await
        .map_err(|_| {
            tracing::warn!(url, "initial board sync timed out");
            ClientError::Timeout
        })??;
        tracing::info!(
            url,
            tasks = replica.board().tasks.len(),
            chat = replica.chat().len(),
            "synced with board server"
        );

        let ws_sender = Arc::new(Mutex::new(ws_sender));
        let replica = Arc::new(parking_lot::Mutex::new(replica));
        let connected = Arc::new(AtomicBool::new(true));
        let edits = Arc::new(Notify::new());
        let (tx, rx) = broadcast::channel(EVENT_BACKLOG);

        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&replica),
            tx,
            Arc::clone(&connected),
        ));
        let flusher_handle = tokio::spawn(flush_loop(
            Arc::clone(&ws_sender),
            Arc::clone(&replica),
            Arc::clone(&edits),
            Arc::clone(&connected),
        ));

        Ok(Self {
            ws_sender,
            replica,
            incoming: Mutex::new(rx),
            connected,
            edits,
            reader_handle,
            flusher_handle,
        })
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Copy of the local board.
    #[must_use]
    pub fn board(&self) -> Board {
        self.replica.lock().board().clone()
    }

    /// Last known number of connected clients.
    #[must_use]
    pub fn presence(&self) -> usize {
        self.replica.lock().presence()
    }

    /// Chat messages, oldest first.
    #[must_use]
    pub fn chat(&self) -> Vec<ChatMessage> {
        self.replica.lock().chat()
    }

    /// Recent notices, oldest first.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.replica.lock().notices()
    }

    /// Whether incoming snapshots are currently being discarded.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.replica.lock().is_typing(Instant::now())
    }

    /// Number of snapshots discarded while typing.
    #[must_use]
    pub fn discarded(&self) -> usize {
        self.replica.lock().discarded()
    }

    /// Waits for the next server event after the initial sync.
    ///
    /// By the time an event is returned it has already been applied to the
    /// local replica. At most [`EVENT_BACKLOG`] unread events are kept; if
    /// the caller falls further behind, the oldest are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] once the connection has ended and all
    /// retained events have been consumed.
    pub async fn next_event(&self) -> Result<ServerEvent, ClientError> {
        let mut rx = self.incoming.lock().await;
        loop {
            match rx.recv().await {
                Ok(ev) => return Ok(ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event backlog overflowed");
                }
                Err(RecvError::Closed) => return Err(ClientError::Closed),
            }
        }
    }

    /// Number of received events not yet returned by
    /// [`next_event`](Self::next_event).
    pub async fn queued_events(&self) -> usize {
        self.incoming.lock().await.len()
    }

    /// Asks the server to create a task.
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn create_task(
        &self,
        column_id: Option<ColumnId>,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), ClientError> {
        self.send(&ClientEvent::CreateTask(CreateTask {
            column_id,
            title: title.map(str::to_string),
            description: description.map(str::to_string),
        }))
        .await
    }

    /// Asks the server to move a task.
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn move_task(
        &self,
        task_id: TaskId,
        from_column_id: ColumnId,
        to_column_id: ColumnId,
        to_index: ToIndex,
    ) -> Result<(), ClientError> {
        self.send(&ClientEvent::MoveTask(MoveTask {
            task_id,
            from_column_id,
            to_column_id,
            to_index,
        }))
        .await
    }

    /// Asks the server to delete a task.
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn delete_task(&self, task_id: TaskId) -> Result<(), ClientError> {
        self.send(&ClientEvent::DeleteTask(DeleteTask { task_id }))
            .await
    }

    /// Asks the server to rename a column.
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn rename_column(&self, column_id: ColumnId, title: &str) -> Result<(), ClientError> {
        self.send(&ClientEvent::RenameColumn(RenameColumn {
            column_id,
            title: Some(title.to_string()),
        }))
        .await
    }

    /// Posts a chat message. A blank `user` lets the server pick the
    /// connection's nickname.
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn send_chat(&self, user: &str, text: &str) -> Result<(), ClientError> {
        self.send(&ClientEvent::Chat(SendChat {
            user: user.to_string(),
            text: text.to_string(),
        }))
        .await
    }

    /// Records an inline edit of a task field.
    ///
    /// Sets the typing flag and schedules a debounced `task:update`.
    pub fn edit(&self, task_id: &TaskId, field: EditField, value: &str) {
        self.replica
            .lock()
            .edit(task_id, field, value, Instant::now());
        self.edits.notify_one();
    }

    /// Sends all pending field edits now instead of waiting for the
    /// debounce period.
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn flush(&self) -> Result<(), ClientError> {
        let due = self.replica.lock().flush(Instant::now());
        for update in due {
            self.send(&ClientEvent::UpdateTask(update)).await?;
        }
        Ok(())
    }

    /// Relays pending field edits, sends a close frame and stops the
    /// background tasks.
    ///
    /// # Errors
    ///
    /// Returns the first error from relaying pending edits or from sending
    /// the close frame. The connection is shut down either way.
    pub async fn close(&self) -> Result<(), ClientError> {
        let flushed = if self.is_connected() {
            self.flush().await
        } else {
            Ok(())
        };
        self.connected.store(false, Ordering::Relaxed);
        self.flusher_handle.abort();
        let closed = self.ws_sender.lock().await.close().await;
        self.reader_handle.abort();
        flushed?;
        closed.map_err(|e| ClientError::WebSocket(Box::new(e)))
    }

    async fn send(&self, event: &ClientEvent) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::Closed);
        }
        send_event(&self.ws_sender, event).await.inspect_err(|_| {
            self.connected.store(false, Ordering::Relaxed);
        })
    }
}

impl Drop for BoardClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.flusher_handle.abort();
    }
}

async fn send_event(sender: &Mutex<WsSender>, event: &ClientEvent) -> Result<(), ClientError> {
    let text = event::encode_client(event)?;
    tracing::debug!(event = event.name(), "sending");
    sender
        .lock()
        .await
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| {
            tracing::warn!(err = %e, "board send failed");
            ClientError::WebSocket(Box::new(e))
        })
}

/// Reads frames until both `board:state` and `chat:history` have arrived.
async fn initial_sync(
    ws_reader: &mut WsReader,
    options: &ClientOptions,
) -> Result<BoardReplica, ClientError> {
    let mut replica: Option<BoardReplica> = None;
    let mut pending = Vec::new();
    let mut have_history = false;

    while replica.is_none() || !have_history {
        let text = match ws_reader.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ClientError::WebSocket(Box::new(e))),
        };
        match event::decode_server(text.as_str())? {
            ServerEvent::BoardState(board) if replica.is_none() => {
                replica = Some(BoardReplica::new(board, options));
            }
            ev @ ServerEvent::ChatHistory { .. } => {
                have_history = true;
                pending.push(ev);
            }
            other => pending.push(other),
        }
    }

    let mut replica = replica.ok_or(ClientError::Closed)?;
    let now = Instant::now();
    for ev in pending {
        replica.apply_event(ev, now);
    }
    Ok(replica)
}

/// Background task that applies server events to the replica.
///
/// Malformed frames are logged and skipped. Sets `connected` to `false` when
/// the socket closes.
async fn reader_loop(
    mut ws_reader: WsReader,
    replica: Arc<parking_lot::Mutex<BoardReplica>>,
    tx: broadcast::Sender<ServerEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match event::decode_server(text.as_str()) {
                Ok(ev) => {
                    let outcome = replica.lock().apply_event(ev.clone(), Instant::now());
                    if outcome == Some(Reconcile::Discarded) {
                        tracing::debug!("board state discarded while typing");
                    }
                    // Fails only once the client is gone.
                    let _ = tx.send(ev);
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed server frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("board server closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "board WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("board reader task exiting");
}

/// Background task that relays debounced field edits.
async fn flush_loop(
    ws_sender: Arc<Mutex<WsSender>>,
    replica: Arc<parking_lot::Mutex<BoardReplica>>,
    edits: Arc<Notify>,
    connected: Arc<AtomicBool>,
) {
    while connected.load(Ordering::Relaxed) {
        let deadline = replica.lock().next_flush();
        match deadline {
            None => edits.notified().await,
            Some(deadline) => {
                tokio::select! {
                    () = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                    () = edits.notified() => continue,
                }
            }
        }

        let due: Vec<UpdateTask> = replica.lock().poll(Instant::now());
        for update in due {
            tracing::debug!(task_id = %update.task_id, "relaying debounced edit");
            if send_event(&ws_sender, &ClientEvent::UpdateTask(update))
                .await
                .is_err()
            {
                connected.store(false, Ordering::Relaxed);
                return;
            }
        }
    }
}
