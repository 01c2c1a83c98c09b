//! Connection sessions and presence.
//!
//! Each WebSocket connection gets a [`Session`] holding its random
//! [`ConnectionId`], a cosmetic nickname derived from that id, and its
//! lifecycle state. [`Presence`] counts the sessions that are connected.

use uuid::Uuid;

const ADJECTIVES: [&str; 10] = [
    "Ágil",
    "Bravo",
    "Calmo",
    "Denso",
    "Épico",
    "Forte",
    "Guerreiro",
    "Hábil",
    "Íntegro",
    "Justo",
];

const ANIMALS: [&str; 10] = [
    "Lobo", "Tigre", "Falcão", "Onça", "Raposa", "Coruja", "Puma", "Tubarão", "Águia", "Lontra",
];

/// Unique identifier of one live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a new random connection id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps an existing id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the display nickname for a connection.
///
/// The first two characters of the id pick an adjective and an animal, so
/// the same id always yields the same name. Different ids may collide.
#[must_use]
pub fn nickname(id: &ConnectionId) -> String {
    let mut chars = id.as_str().chars().map(u32::from);
    let a = chars.next().unwrap_or(0) as usize % ADJECTIVES.len();
    let b = chars.next().unwrap_or(0) as usize % ANIMALS.len();
    format!("{} {}", ADJECTIVES[a], ANIMALS[b])
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket accepted, handshake not finished.
    Connecting,
    /// Receiving and applying events.
    Connected,
    /// Closed; terminal.
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Errors raised by illegal session transitions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// The requested transition is not allowed from the current state.
    #[error("cannot move connection from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: ConnectionState,
        /// Requested state.
        to: ConnectionState,
    },
}

/// Per-connection actor identity and lifecycle.
#[derive(Debug, Clone)]
pub struct Session {
    id: ConnectionId,
    nickname: String,
    state: ConnectionState,
}

impl Session {
    /// Creates a session in the `Connecting` state.
    #[must_use]
    pub fn new(id: ConnectionId) -> Self {
        let nickname = nickname(&id);
        Self {
            id,
            nickname,
            state: ConnectionState::Connecting,
        }
    }

    /// The connection id.
    #[must_use]
    pub const fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// The cosmetic display name used as actor in notices and logs.
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether mutation events from this session should be applied.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// `Connecting -> Connected`, on handshake completion.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] from any other state.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        self.transition(ConnectionState::Connecting, ConnectionState::Connected)
    }

    /// `Connected -> Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] from any other state.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        self.transition(ConnectionState::Connected, ConnectionState::Disconnected)
    }

    fn transition(
        &mut self,
        expected: ConnectionState,
        to: ConnectionState,
    ) -> Result<(), SessionError> {
        if self.state != expected {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Process-wide count of connected sessions.
#[derive(Debug, Default)]
pub struct Presence {
    count: usize,
}

impl Presence {
    /// Creates a counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { count: 0 }
    }

    /// Records a join, returning the new count.
    pub const fn join(&mut self) -> usize {
        self.count += 1;
        self.count
    }

    /// Records a leave, returning the new count.
    pub const fn leave(&mut self) -> usize {
        self.count = self.count.saturating_sub(1);
        self.count
    }

    /// Current count.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }
}
