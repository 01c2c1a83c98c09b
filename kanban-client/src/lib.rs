//! Client side of the collaborative kanban board.
//!
//! [`sync`] holds the reconciliation rules (typing flag, debounced edits,
//! discard-while-typing). [`connection`] drives them over a WebSocket.

pub mod connection;
pub mod sync;

pub use connection::{BoardClient, ClientError};
pub use sync::{BoardReplica, ClientOptions, EditField, Reconcile};
