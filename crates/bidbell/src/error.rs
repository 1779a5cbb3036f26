//! Error types for notification delivery.
//!
//! Errors are grouped by how the coordinator reacts to them:
//! transport and protocol failures are recovered internally, sync failures
//! trigger a corrective snapshot, and auth failures end the session.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Connect/send/close failures on the push channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Connection already closed")]
    Closed,
}

/// A frame that could not be turned into a server message.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    MalformedJson(#[source] serde_json::Error),

    #[error("Frame has no `type` discriminator")]
    MissingType,

    #[error("Invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures of the request/response API (snapshot or mutation confirmation).
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unauthorized: HTTP {0}")]
    Unauthorized(u16),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request rejected by server: {0}")]
    Rejected(String),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid endpoint: {0}")]
    Endpoint(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl SyncError {
    /// Whether this failure means the credential is no longer accepted.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Auth(_))
    }
}

/// Missing or rejected credentials. Fatal for the current session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No auth token available")]
    MissingToken,

    #[error("Auth token rejected: {0}")]
    Rejected(String),
}

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Delivery session already running")]
    AlreadyRunning,

    #[error("Delivery session not running")]
    NotRunning,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
