//! Coordinator states, lifecycle events and internal commands.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::SyncError;
use crate::model::ConnectionState;
use crate::snapshot::Snapshot;
use crate::store::StoreSnapshot;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was called, or the server closed with the clean stop code.
    Requested,
    /// The credential was missing or rejected.
    Auth { message: String },
    /// The reconnect budget ran out.
    RetriesExhausted { attempts: u32 },
}

impl StopReason {
    /// Whether subscribers should show a permanent "disconnected" indicator.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Requested)
    }
}

/// Coordinator lifecycle: `Idle → Starting → Connected ⇄ Reconnecting → Stopped`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CoordinatorState {
    #[default]
    Idle,
    Starting,
    Connected,
    Reconnecting {
        attempt: u32,
    },
    Stopped {
        reason: StopReason,
    },
}

impl CoordinatorState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Stopped { reason } => match reason {
                StopReason::Requested => write!(f, "stopped"),
                StopReason::Auth { message } => write!(f, "stopped: auth failed ({message})"),
                StopReason::RetriesExhausted { attempts } => {
                    write!(f, "stopped: gave up after {attempts} reconnect attempts")
                }
            },
        }
    }
}

/// Combined status published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionStatus {
    pub state: CoordinatorState,
    pub connection: ConnectionState,
}

impl SessionStatus {
    /// Auth failure or exhausted reconnect budget.
    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(&self.state, CoordinatorState::Stopped { reason } if reason.is_error())
    }
}

/// REST confirmation that follows an optimistic store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    MarkRead { id: String },
    MarkAllRead,
    Remove { id: String },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkRead { id } => write!(f, "mark_read({id})"),
            Self::MarkAllRead => write!(f, "mark_all_read"),
            Self::Remove { id } => write!(f, "remove({id})"),
        }
    }
}

/// Lifecycle events broadcast by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    StateChanged(CoordinatorState),
    ConnectionChanged(ConnectionState),
    ReconnectScheduled { attempt: u32, delay: Duration },
    Resynced { count: usize, unread_count: usize },
    SyncFailed { operation: String, error: String },
    FrameDropped { reason: String },
}

/// Commands sent from handles to the session task.
#[derive(Debug)]
pub(crate) enum Command {
    Mutate(Mutation),
    Refresh,
    View(oneshot::Sender<StoreSnapshot>),
}

/// Results of background work, delivered back to the session task.
#[derive(Debug)]
pub(crate) enum Completion {
    Snapshot {
        result: Result<Snapshot, SyncError>,
    },
    Confirmed {
        mutation: Mutation,
        result: Result<(), SyncError>,
    },
}
