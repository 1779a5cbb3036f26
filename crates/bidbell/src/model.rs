//! Notification data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of auction event a notification describes.
///
/// The set is open-ended: kinds this client does not know are kept verbatim
/// in [`NotificationType::Other`] instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    BidPlaced,
    BidOutbid,
    AuctionWon,
    AuctionEnded,
    AuctionStarting,
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::BidPlaced => "BID_PLACED",
            Self::BidOutbid => "BID_OUTBID",
            Self::AuctionWon => "AUCTION_WON",
            Self::AuctionEnded => "AUCTION_ENDED",
            Self::AuctionStarting => "AUCTION_STARTING",
            Self::Other(kind) => kind,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl Default for NotificationType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for NotificationType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "BID_PLACED" => Self::BidPlaced,
            "BID_OUTBID" => Self::BidOutbid,
            "AUCTION_WON" => Self::AuctionWon,
            "AUCTION_ENDED" => Self::AuctionEnded,
            "AUCTION_STARTING" => Self::AuctionStarting,
            _ => Self::Other(value),
        }
    }
}

impl From<NotificationType> for String {
    fn from(value: NotificationType) -> Self {
        match value {
            NotificationType::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event delivered to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server-assigned unique id
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    /// Opaque navigation payload (e.g. auction id and title)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entity: Option<serde_json::Value>,
    /// Falls back to arrival time when the server omits it
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Notification {
    /// Create an unread notification stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            related_entity: None,
            created_at: Utc::now(),
            is_read: false,
        }
    }

    pub fn with_read(mut self, is_read: bool) -> Self {
        self.is_read = is_read;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_related_entity(mut self, entity: serde_json::Value) -> Self {
        self.related_entity = Some(entity);
        self
    }
}

/// State of the push channel as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Reconnecting {
        attempt: u32,
    },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}
