//! Real-time collaborative kanban board server.
//!
//! Exposes the board store, hub and WebSocket server for use in tests and
//! embedding. A single hub task owns the board and chat log; every client
//! mutation is applied there and answered with a full-state broadcast.

pub mod board;
pub mod chat;
pub mod config;
pub mod hub;
pub mod notice;
pub mod server;
pub mod session;
