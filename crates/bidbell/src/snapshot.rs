//! Authoritative snapshot loading.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::model::Notification;

/// A point-in-time read of the user's notifications.
///
/// `notifications` is sorted by the server, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub unread_count: i64,
}

/// Pulls a snapshot through an authenticated request/response API.
#[async_trait]
pub trait SnapshotLoader: Send + Sync {
    /// Fetch up to `limit` notifications plus the total unread count.
    async fn fetch(&self, limit: u32) -> Result<Snapshot, SyncError>;
}
