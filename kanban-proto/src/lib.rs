//! Shared board model and wire protocol for the collaborative kanban board.

pub mod board;
pub mod chat;
pub mod event;
pub mod notice;
pub mod timestamp;
