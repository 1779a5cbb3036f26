//! Wire protocol of the push channel and the router that dispatches it.
//!
//! Frames are UTF-8 JSON objects with a mandatory `type` field:
//!
//! ```json
//! { "type": "connection_confirmed" }
//! { "type": "notification", "notification": { ... } }
//! { "type": "notification_read", "notificationId": "..." }
//! { "type": "unread_count", "count": 3 }
//! ```
//!
//! Unknown kinds are ignored so the server can add message types without
//! breaking older clients. Malformed frames are dropped, never fatal.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::model::Notification;
use crate::store::NotificationStore;

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    ConnectionConfirmed,
    Notification(Notification),
    NotificationRead { notification_id: String },
    UnreadCount(i64),
    Unknown { kind: String },
}

#[derive(Deserialize)]
struct NotificationPayload {
    notification: Notification,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationReadPayload {
    notification_id: String,
}

#[derive(Deserialize)]
struct UnreadCountPayload {
    count: i64,
}

impl ServerMessage {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw).map_err(ProtocolError::MalformedJson)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        let payload_err = |source| ProtocolError::InvalidPayload {
            kind: kind.clone(),
            source,
        };

        let message = match kind.as_str() {
            "connection_confirmed" => Self::ConnectionConfirmed,
            "notification" => {
                let p: NotificationPayload =
                    serde_json::from_value(value).map_err(payload_err)?;
                Self::Notification(p.notification)
            }
            "notification_read" => {
                let p: NotificationReadPayload =
                    serde_json::from_value(value).map_err(payload_err)?;
                Self::NotificationRead {
                    notification_id: p.notification_id,
                }
            }
            "unread_count" => {
                let p: UnreadCountPayload = serde_json::from_value(value).map_err(payload_err)?;
                Self::UnreadCount(p.count)
            }
            _ => Self::Unknown { kind },
        };
        Ok(message)
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::ConnectionConfirmed => "connection_confirmed",
            Self::Notification(_) => "notification",
            Self::NotificationRead { .. } => "notification_read",
            Self::UnreadCount(_) => "unread_count",
            Self::Unknown { kind } => kind,
        }
    }
}

/// Receiver of routed messages.
pub trait MessageHandler {
    /// The server accepted the connection. Informational for the store.
    fn connection_confirmed(&mut self);

    fn notification(&mut self, notification: Notification);

    fn notification_read(&mut self, notification_id: &str);

    fn unread_count(&mut self, count: i64);
}

impl MessageHandler for NotificationStore {
    fn connection_confirmed(&mut self) {}

    fn notification(&mut self, notification: Notification) {
        self.add_or_update(notification);
    }

    fn notification_read(&mut self, notification_id: &str) {
        self.mark_read(notification_id);
    }

    fn unread_count(&mut self, count: i64) {
        self.set_authoritative_unread_count(count);
    }
}

/// Result of routing one frame.
#[derive(Debug)]
pub enum RouteOutcome {
    /// Handed to the handler.
    Dispatched(&'static str),
    /// Valid frame of a kind this client does not handle.
    Ignored(String),
    /// Frame could not be parsed and was dropped.
    Dropped(ProtocolError),
}

/// Parses inbound frames and dispatches them to a [`MessageHandler`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageRouter;

impl MessageRouter {
    pub fn new() -> Self {
        Self
    }

    /// Route one raw frame. Never fails: bad frames are logged and dropped.
    pub fn route<H: MessageHandler + ?Sized>(&self, raw: &str, handler: &mut H) -> RouteOutcome {
        let message = match ServerMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, len = raw.len(), "Dropping unparseable frame");
                return RouteOutcome::Dropped(e);
            }
        };

        match message {
            ServerMessage::ConnectionConfirmed => {
                debug!("Connection confirmed by server");
                handler.connection_confirmed();
                RouteOutcome::Dispatched("connection_confirmed")
            }
            ServerMessage::Notification(notification) => {
                debug!(id = %notification.id, kind = %notification.kind, "Notification pushed");
                handler.notification(notification);
                RouteOutcome::Dispatched("notification")
            }
            ServerMessage::NotificationRead { notification_id } => {
                debug!(id = %notification_id, "Notification read elsewhere");
                handler.notification_read(&notification_id);
                RouteOutcome::Dispatched("notification_read")
            }
            ServerMessage::UnreadCount(count) => {
                debug!(count, "Authoritative unread count");
                handler.unread_count(count);
                RouteOutcome::Dispatched("unread_count")
            }
            ServerMessage::Unknown { kind } => {
                debug!(kind = %kind, "Ignoring unknown message type");
                RouteOutcome::Ignored(kind)
            }
        }
    }
}
