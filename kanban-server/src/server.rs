//! WebSocket front end: accepts connections and pipes frames to the hub.
//!
//! Each upgraded socket is split into a reader and a writer task. The
//! writer drains the connection's outbox (filled by the hub); the reader
//! decodes JSON text frames into [`kanban_proto::event::ClientEvent`]s and
//! forwards them to the hub. Malformed frames are logged and dropped without
//! closing the connection.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use kanban_proto::event;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::chat::ChatLog;
use crate::hub::{Hub, HubHandle, OUTBOX_CAPACITY};
use crate::session::ConnectionId;

/// Errors that can occur while starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Neither the preferred address nor the ephemeral fallback could be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was attempted.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Other listener I/O failure.
    #[error("listener I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Register with the hub, which pushes the board and chat history and
///    announces the join.
/// 2. Forward decoded events to the hub until either side closes.
/// 3. Unregister, which announces the leave.
pub async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let id = ConnectionId::generate();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOX_CAPACITY);

    if hub.connect(id.clone(), tx).is_err() {
        tracing::error!(conn = %id, "hub unavailable, dropping connection");
        return;
    }
    tracing::debug!(conn = %id, "connection registered");

    let writer_id = id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn = %writer_id, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_id = id.clone();
    let reader_hub = hub.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => match event::decode_client(text.as_str()) {
                    Ok(ev) => {
                        if reader_hub.event(reader_id.clone(), ev).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(conn = %reader_id, error = %e, "dropping malformed frame");
                    }
                },
                Message::Close(_) => {
                    tracing::debug!(conn = %reader_id, "received close frame");
                    break;
                }
                _ => {
                    // Binary, ping and pong frames carry no events.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let _ = hub.disconnect(id.clone());
    tracing::debug!(conn = %id, "connection closed");
}

/// Binds `host:port`, falling back to an OS-assigned port on the same host
/// when the preferred port is already in use.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if binding fails for any other reason, or
/// if the fallback bind fails as well.
pub async fn bind_with_fallback(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && port != 0 => {
            tracing::warn!(host, port, "port in use, falling back to an ephemeral port");
            TcpListener::bind((host, 0))
                .await
                .map_err(|source| ServerError::Bind {
                    addr: format!("{host}:0"),
                    source,
                })
        }
        Err(source) => Err(ServerError::Bind {
            addr: format!("{host}:{port}"),
            source,
        }),
    }
}

/// Builds the axum router serving `/ws` and `/health`.
pub fn router(hub: HubHandle) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .route("/health", axum::routing::get(health))
        .with_state(hub)
}

/// Starts a server with a fresh board and default chat log.
///
/// # Errors
///
/// See [`bind_with_fallback`].
pub async fn start_server(
    host: &str,
    port: u16,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), ServerError> {
    let hub = Hub::new(ChatLog::new()).spawn();
    start_server_with_hub(host, port, hub).await
}

/// Starts a server in front of an already spawned hub and returns the bound
/// address and the serve task handle.
///
/// # Errors
///
/// See [`bind_with_fallback`].
pub async fn start_server_with_hub(
    host: &str,
    port: u16,
    hub: HubHandle,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), ServerError> {
    let listener = bind_with_fallback(host, port).await?;
    let bound_addr = listener.local_addr()?;
    let app = router(hub);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "board server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<HubHandle>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn health() -> &'static str {
    "ok"
}
