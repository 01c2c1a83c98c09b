//! Client-side reconciliation for the board sync protocol.
//!
//! The server rebroadcasts the whole board after every accepted mutation,
//! including the ones this client sent. While the user is typing into a
//! task field those snapshots would overwrite the text being edited, so the
//! client keeps a [`TypingFlag`] and discards incoming `board:state` events
//! while it is set. Field edits go through a [`Debouncer`] and are relayed
//! as a single `task:update` once the user pauses.
//!
//! Everything here is a pure state machine driven by explicit `now`
//! instants; the network side lives in [`crate::connection`].

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use kanban_proto::board::{Board, TaskId};
use kanban_proto::chat::{ChatMessage, DEFAULT_CHAT_CAPACITY};
use kanban_proto::event::{ServerEvent, UpdateTask};
use kanban_proto::notice::Notice;

/// Quiet period before pending field edits are relayed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// How long the typing flag stays set after the last relay.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(300);

/// Timeout for the WebSocket handshake and initial sync.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of recent notices kept for display.
const NOTICE_BACKLOG: usize = 20;

/// Tunables for a board client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Quiet period before field edits are relayed.
    pub debounce: Duration,
    /// Delay after a relay before incoming snapshots are applied again.
    pub settle: Duration,
    /// Handshake and initial sync timeout.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            settle: DEFAULT_SETTLE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypingState {
    Idle,
    Editing,
    Settling { until: Instant },
}

/// Client-local flag that suppresses incoming snapshots during an edit.
///
/// Set by [`mark_typing`](Self::mark_typing) on the first keystroke, and
/// cleared `settle` after the pending edit has been
/// [`relayed`](Self::relayed).
#[derive(Debug, Clone)]
pub struct TypingFlag {
    settle: Duration,
    state: TypingState,
}

impl TypingFlag {
    /// Creates a cleared flag.
    #[must_use]
    pub const fn new(settle: Duration) -> Self {
        Self {
            settle,
            state: TypingState::Idle,
        }
    }

    /// The user started (or continued) editing.
    pub const fn mark_typing(&mut self) {
        self.state = TypingState::Editing;
    }

    /// The pending edit was sent at `now`; start the settle countdown.
    pub fn relayed(&mut self, now: Instant) {
        if self.state == TypingState::Editing {
            self.state = TypingState::Settling {
                until: now + self.settle,
            };
        }
    }

    /// Whether incoming snapshots should be discarded at `now`.
    #[must_use]
    pub fn is_typing(&self, now: Instant) -> bool {
        match self.state {
            TypingState::Idle => false,
            TypingState::Editing => true,
            TypingState::Settling { until } => now < until,
        }
    }
}

/// A field of a task that can be edited inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    /// The task title.
    Title,
    /// The task description.
    Description,
}

#[derive(Debug, Default)]
struct PendingEdit {
    title: Option<String>,
    description: Option<String>,
}

/// Coalesces field edits and releases them after a quiet period.
///
/// Every new edit pushes the deadline back. Edits to the same field of the
/// same task overwrite each other, so only the latest value is sent.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: BTreeMap<TaskId, PendingEdit>,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Creates an empty debouncer.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: BTreeMap::new(),
            deadline: None,
        }
    }

    /// Records an edit made at `now`.
    pub fn push(&mut self, task_id: TaskId, field: EditField, value: String, now: Instant) {
        let entry = self.pending.entry(task_id).or_default();
        match field {
            EditField::Title => entry.title = Some(value),
            EditField::Description => entry.description = Some(value),
        }
        self.deadline = Some(now + self.delay);
    }

    /// When the pending edits become due, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether there is anything waiting to be sent.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Takes the pending edits if the quiet period has elapsed at `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<UpdateTask> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.take_all(),
            _ => Vec::new(),
        }
    }

    /// Takes every pending edit regardless of the deadline.
    pub fn take_all(&mut self) -> Vec<UpdateTask> {
        self.deadline = None;
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(task_id, edit)| UpdateTask {
                task_id,
                title: edit.title,
                description: edit.description,
            })
            .collect()
    }
}

/// Outcome of offering a snapshot to the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// The snapshot replaced the local board.
    Applied,
    /// The snapshot was dropped because the user is typing.
    Discarded,
}

/// The client's view of the shared board, chat and presence.
#[derive(Debug)]
pub struct BoardReplica {
    board: Board,
    typing: TypingFlag,
    debouncer: Debouncer,
    presence: usize,
    chat: VecDeque<ChatMessage>,
    notices: VecDeque<Notice>,
    discarded: usize,
}

impl BoardReplica {
    /// Creates a replica starting from `board`.
    #[must_use]
    pub fn new(board: Board, options: &ClientOptions) -> Self {
        Self {
            board,
            typing: TypingFlag::new(options.settle),
            debouncer: Debouncer::new(options.debounce),
            presence: 0,
            chat: VecDeque::new(),
            notices: VecDeque::new(),
            discarded: 0,
        }
    }

    /// The current local board.
    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Last known number of connected clients.
    #[must_use]
    pub const fn presence(&self) -> usize {
        self.presence
    }

    /// Chat messages, oldest first.
    #[must_use]
    pub fn chat(&self) -> Vec<ChatMessage> {
        self.chat.iter().cloned().collect()
    }

    /// Most recent notices, oldest first.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.iter().cloned().collect()
    }

    /// Number of snapshots dropped while typing.
    #[must_use]
    pub const fn discarded(&self) -> usize {
        self.discarded
    }

    /// Whether the typing flag is set at `now`.
    #[must_use]
    pub fn is_typing(&self, now: Instant) -> bool {
        self.typing.is_typing(now)
    }

    /// When pending edits become due, if any.
    #[must_use]
    pub const fn next_flush(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Offers a full board snapshot received at `now`.
    pub fn apply_state(&mut self, board: Board, now: Instant) -> Reconcile {
        if self.typing.is_typing(now) {
            self.discarded += 1;
            tracing::trace!(discarded = self.discarded, "discarding board state while typing");
            return Reconcile::Discarded;
        }
        self.board = board;
        Reconcile::Applied
    }

    /// Applies any server event. Returns the reconcile outcome for
    /// `board:state`, `None` for everything else.
    pub fn apply_event(&mut self, event: ServerEvent, now: Instant) -> Option<Reconcile> {
        match event {
            ServerEvent::BoardState(board) => return Some(self.apply_state(board, now)),
            ServerEvent::Notice(notice) => {
                self.notices.push_back(notice);
                while self.notices.len() > NOTICE_BACKLOG {
                    self.notices.pop_front();
                }
            }
            ServerEvent::PresenceCount { count } => self.presence = count,
            ServerEvent::ChatHistory { messages } => self.chat = messages.into(),
            ServerEvent::ChatMessage(message) => {
                self.chat.push_back(message);
                while self.chat.len() > DEFAULT_CHAT_CAPACITY {
                    self.chat.pop_front();
                }
            }
        }
        None
    }

    /// Records a keystroke batch on a task field.
    ///
    /// The local board shows the new value immediately; the edit is relayed
    /// once the debounce period passes without further edits.
    pub fn edit(&mut self, task_id: &TaskId, field: EditField, value: &str, now: Instant) {
        self.typing.mark_typing();
        if let Some(task) = self.board.tasks.get_mut(task_id) {
            match field {
                EditField::Title => task.title = value.to_string(),
                EditField::Description => task.description = value.to_string(),
            }
        }
        self.debouncer
            .push(task_id.clone(), field, value.to_string(), now);
    }

    /// Returns the edits that are due at `now`, starting the settle
    /// countdown when anything is released.
    pub fn poll(&mut self, now: Instant) -> Vec<UpdateTask> {
        let due = self.debouncer.take_due(now);
        if !due.is_empty() {
            self.typing.relayed(now);
        }
        due
    }

    /// Releases every pending edit immediately.
    pub fn flush(&mut self, now: Instant) -> Vec<UpdateTask> {
        let due = self.debouncer.take_all();
        if !due.is_empty() {
            self.typing.relayed(now);
        }
        due
    }
}
