//! Push-channel transport.
//!
//! A [`Transport`] knows nothing about notifications: it opens one duplex
//! connection per [`Transport::open`] call and reports lifecycle and raw text
//! frames as [`TransportEvent`]s. Parsing and retry policy live elsewhere.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use url::Url;

use crate::error::TransportError;

pub mod websocket;

pub use websocket::{WebSocketConfig, WebSocketTransport};

/// Close code used for an explicit, clean teardown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the peer closed without a status.
pub const NO_STATUS: u16 = 1005;
/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

const EVENT_BUFFER: usize = 256;
const COMMAND_BUFFER: usize = 32;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle and data events emitted by a connection, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Close { code: u16, was_clean: bool },
    Error(String),
}

/// Requests from the owner to the connection driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Send(String),
    Close { code: u16, reason: String },
}

/// Opens push-channel connections.
pub trait Transport: Send + Sync {
    /// Start exactly one physical connection attempt. The outcome arrives as
    /// `Open`, or `Error`/`Close`, on the returned connection.
    fn open(&self, url: &Url) -> TransportConnection;
}

/// Owner side of one connection.
///
/// Dropping it releases the connection: the driver sees its command channel
/// close and shuts the socket down.
#[derive(Debug)]
pub struct TransportConnection {
    id: u64,
    commands: mpsc::Sender<TransportCommand>,
    events: mpsc::Receiver<TransportEvent>,
    closed: bool,
}

/// Driver side of one connection: feeds events, consumes commands.
#[derive(Debug)]
pub struct TransportPeer {
    pub events: mpsc::Sender<TransportEvent>,
    pub commands: mpsc::Receiver<TransportCommand>,
}

impl TransportConnection {
    /// Create a connected owner/driver pair.
    pub fn pair() -> (TransportConnection, TransportPeer) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let conn = TransportConnection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            commands: command_tx,
            events: event_rx,
            closed: false,
        };
        let peer = TransportPeer {
            events: event_tx,
            commands: command_rx,
        };
        (conn, peer)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Queue a text frame for sending.
    pub fn send(&self, payload: impl Into<String>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.commands
            .try_send(TransportCommand::Send(payload.into()))
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    /// Ask the driver to close with `code`. Idempotent.
    pub fn close(&mut self, code: u16, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.commands.try_send(TransportCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next event, or `None` once the driver is gone.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

impl TransportPeer {
    /// Report an event to the owner. Returns false if the owner is gone.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

/// Render a URL for logs without its query string (which carries the token).
pub fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_query(None);
    redacted.to_string()
}
