//! The board hub: single owner of all shared state.
//!
//! One tokio task owns the [`BoardStore`], the [`ChatLog`], the
//! [`Presence`] counter and the registry of live connections. Socket
//! handlers talk to it through a [`HubHandle`], and every [`HubCommand`]
//! is handled to completion (validate, mutate, broadcast) before the next
//! one starts. Mutations therefore never interleave and the board needs no
//! lock.
//!
//! Broadcasts are full snapshots: after every accepted mutation each
//! connection receives the entire board, followed by a notice when the
//! change is user-visible. Outboxes are bounded; a connection whose queue
//! is full is dropped as lagging and announced as a leave.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use axum::extract::ws::{Message, Utf8Bytes};
use kanban_proto::board::Board;
use kanban_proto::chat::ChatMessage;
use kanban_proto::event::{self, ClientEvent, ServerEvent};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::board::{BoardStore, Change};
use crate::chat::ChatLog;
use crate::notice;
use crate::session::{ConnectionId, Presence, Session};

/// Frames a connection may have queued before it is dropped as lagging.
pub const OUTBOX_CAPACITY: usize = 256;

/// Sender half of a connection's outbound frame queue.
pub type Outbox = mpsc::Sender<Message>;

/// The hub task has stopped and can no longer accept commands.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
#[error("board hub has shut down")]
pub struct HubClosed;

/// Point-in-time copy of the hub's shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Current board.
    pub board: Board,
    /// Chat log, oldest first.
    pub chat: Vec<ChatMessage>,
    /// Connected session count.
    pub connected: usize,
}

/// Commands processed by the hub, one at a time.
#[derive(Debug)]
pub enum HubCommand {
    /// A socket finished its handshake.
    Connect {
        /// New connection id.
        id: ConnectionId,
        /// Where frames for this connection go.
        outbox: Outbox,
    },
    /// A decoded event arrived from a connection.
    Event {
        /// Originating connection.
        id: ConnectionId,
        /// The event.
        event: ClientEvent,
    },
    /// A socket closed.
    Disconnect {
        /// Closed connection.
        id: ConnectionId,
    },
    /// Request a copy of the shared state.
    Snapshot {
        /// Reply channel.
        reply: oneshot::Sender<HubSnapshot>,
    },
    /// Panics inside the handler.
    #[cfg(test)]
    Fault,
}

/// Cloneable handle used by socket handlers to reach the hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Registers a connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub task has stopped.
    pub fn connect(&self, id: ConnectionId, outbox: Outbox) -> Result<(), HubClosed> {
        self.send(HubCommand::Connect { id, outbox })
    }

    /// Forwards a client event.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub task has stopped.
    pub fn event(&self, id: ConnectionId, event: ClientEvent) -> Result<(), HubClosed> {
        self.send(HubCommand::Event { id, event })
    }

    /// Unregisters a connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub task has stopped.
    pub fn disconnect(&self, id: ConnectionId) -> Result<(), HubClosed> {
        self.send(HubCommand::Disconnect { id })
    }

    /// Fetches a copy of the board, chat log and presence count.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub task has stopped.
    pub async fn snapshot(&self) -> Result<HubSnapshot, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot { reply })?;
        rx.await.map_err(|_| HubClosed)
    }

    fn send(&self, cmd: HubCommand) -> Result<(), HubClosed> {
        self.tx.send(cmd).map_err(|_| HubClosed)
    }
}

struct Connection {
    session: Session,
    outbox: Outbox,
}

/// Owner of the board, chat log, presence and connection registry.
pub struct Hub {
    store: BoardStore,
    chat: ChatLog,
    presence: Presence,
    connections: HashMap<ConnectionId, Connection>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(ChatLog::new())
    }
}

impl Hub {
    /// Creates a hub with a seeded board and the given chat log.
    #[must_use]
    pub fn new(chat: ChatLog) -> Self {
        Self {
            store: BoardStore::new(),
            chat,
            presence: Presence::new(),
            connections: HashMap::new(),
        }
    }

    /// Spawns the hub on the current tokio runtime and returns its handle.
    ///
    /// The task runs until every [`HubHandle`] has been dropped.
    #[must_use]
    pub fn spawn(self) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        HubHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        while let Some(cmd) = rx.recv().await {
            // A fault in one handler must not take the shared board down.
            if std::panic::catch_unwind(AssertUnwindSafe(|| self.handle(cmd))).is_err() {
                tracing::error!("hub command handler panicked; continuing");
            }
        }
        tracing::info!("board hub stopped");
    }

    /// Handles one command to completion.
    pub fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { id, outbox } => self.on_connect(id, outbox),
            HubCommand::Event { id, event } => self.on_event(&id, event),
            HubCommand::Disconnect { id } => self.on_disconnect(&id),
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            #[cfg(test)]
            HubCommand::Fault => panic!("injected handler fault"),
        }
    }

    /// Copies the shared state.
    #[must_use]
    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            board: self.store.snapshot(),
            chat: self.chat.history(),
            connected: self.presence.count(),
        }
    }

    fn on_connect(&mut self, id: ConnectionId, outbox: Outbox) {
        let mut session = Session::new(id.clone());
        if let Err(e) = session.connect() {
            tracing::warn!(conn = %id, error = %e, "rejecting connection");
            return;
        }
        let actor = session.nickname().to_string();

        // The newcomer sees the current state before any broadcast.
        send(&outbox, &ServerEvent::BoardState(self.store.snapshot()));
        send(
            &outbox,
            &ServerEvent::ChatHistory {
                messages: self.chat.history(),
            },
        );

        if let Some(old) = self.connections.insert(id.clone(), Connection { session, outbox }) {
            tracing::warn!(conn = %id, actor = %old.session.nickname(), "replaced duplicate connection id");
            self.presence.leave();
        }
        let count = self.presence.join();
        tracing::info!(conn = %id, actor = %actor, connected = count, "client joined");

        self.broadcast(&ServerEvent::PresenceCount { count });
        self.broadcast(&ServerEvent::Notice(notice::joined(&actor)));
    }

    fn on_disconnect(&mut self, id: &ConnectionId) {
        let Some(mut conn) = self.connections.remove(id) else {
            tracing::debug!(conn = %id, "disconnect for unknown connection");
            return;
        };
        if let Err(e) = conn.session.disconnect() {
            tracing::warn!(conn = %id, error = %e, "unexpected session state on disconnect");
        }
        let actor = conn.session.nickname().to_string();
        let count = self.presence.leave();
        tracing::info!(conn = %id, actor = %actor, connected = count, "client left");

        self.broadcast(&ServerEvent::PresenceCount { count });
        self.broadcast(&ServerEvent::Notice(notice::left(&actor)));
    }

    fn on_event(&mut self, id: &ConnectionId, event: ClientEvent) {
        let Some(actor) = self
            .connections
            .get(id)
            .filter(|c| c.session.is_connected())
            .map(|c| c.session.nickname().to_string())
        else {
            tracing::warn!(conn = %id, event = event.name(), "event from unregistered connection");
            return;
        };

        let op = event.name();
        let change = match event {
            ClientEvent::Chat(chat) => {
                match self.chat.append(&chat.user, &chat.text, &actor) {
                    Some(message) => {
                        tracing::info!(actor = %actor, op, message_id = %message.id, user = %message.user, "chat message");
                        self.broadcast(&ServerEvent::ChatMessage(message));
                    }
                    None => tracing::debug!(actor = %actor, op, "blank chat message ignored"),
                }
                return;
            }
            ClientEvent::CreateTask(c) => self.store.create_task(
                c.column_id.as_ref(),
                c.title.as_deref(),
                c.description.as_deref(),
            ),
            ClientEvent::MoveTask(m) => self.store.move_task(
                &m.task_id,
                &m.from_column_id,
                &m.to_column_id,
                m.to_index,
            ),
            ClientEvent::UpdateTask(u) => {
                self.store
                    .update_task(&u.task_id, u.title.as_deref(), u.description.as_deref())
            }
            ClientEvent::DeleteTask(d) => self.store.delete_task(&d.task_id),
            ClientEvent::RenameColumn(r) => {
                self.store.rename_column(&r.column_id, r.title.as_deref())
            }
        };

        let Some(change) = change else {
            tracing::debug!(actor = %actor, op, "referenced task or column not found; ignored");
            return;
        };
        log_change(&actor, &change);
        debug_assert!(self.store.check_invariants().is_ok());

        let board = self.store.snapshot();
        self.broadcast(&ServerEvent::BoardState(board));
        if let Some(notice) = notice::compose(&change, &actor) {
            self.broadcast(&ServerEvent::Notice(notice));
        }
    }

    /// Sends one event to every registered connection, dropping the ones
    /// whose outbox is full.
    fn broadcast(&mut self, event: &ServerEvent) {
        let Some(frame) = encode(event) else {
            return;
        };
        let mut lagging = Vec::new();
        for (id, conn) in &self.connections {
            match conn.outbox.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => lagging.push(id.clone()),
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(conn = %id, "outbox closed; awaiting disconnect");
                }
            }
        }
        for id in lagging {
            tracing::warn!(conn = %id, "outbox full; dropping lagging connection");
            self.on_disconnect(&id);
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match event::encode_server(event) {
        Ok(text) => Some(Message::Text(Utf8Bytes::from(text))),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode server event");
            None
        }
    }
}

fn send(outbox: &Outbox, event: &ServerEvent) {
    if let Some(frame) = encode(event) {
        let _ = outbox.try_send(frame);
    }
}

/// Records an accepted mutation with its actor, entity and before/after values.
fn log_change(actor: &str, change: &Change) {
    let op = change.op();
    match change {
        Change::Created { task, column_id } => tracing::info!(
            actor, op, task_id = %task.id, column_id = %column_id, title = %task.title,
            "task created"
        ),
        Change::Moved { task_id, from, to, .. } => tracing::info!(
            actor, op, task_id = %task_id,
            from_column = %from.0, from_index = from.1,
            to_column = %to.0, to_index = to.1,
            "task moved"
        ),
        Change::Updated {
            task_id,
            old_title,
            new_title,
            description_changed,
        } => tracing::info!(
            actor, op, task_id = %task_id,
            old_title = %old_title, new_title = %new_title, description_changed,
            "task updated"
        ),
        Change::Deleted { task_id, title } => tracing::info!(
            actor, op, task_id = %task_id, title = %title,
            "task deleted"
        ),
        Change::ColumnRenamed {
            column_id,
            old_title,
            new_title,
        } => tracing::info!(
            actor, op, column_id = %column_id,
            old_title = %old_title, new_title = %new_title,
            "column renamed"
        ),
    }
}
