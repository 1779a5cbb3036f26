//! REST client for snapshots and mutation confirmations.
//!
//! Endpoints (all bearer-authenticated), relative to the API base URL:
//! - `GET /notifications?limit=N` → `{ success, data: { notifications, unreadCount } }`
//! - `PUT /notifications/{id}/read` → `{ success }`
//! - `PUT /notifications/read-all` → `{ success }`
//! - `DELETE /notifications/{id}` → `{ success }`

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::auth::AuthProvider;
use crate::error::SyncError;
use crate::snapshot::{Snapshot, SnapshotLoader};
use crate::tls::install_rustls_provider;

/// Server confirmation of optimistic local mutations.
#[async_trait]
pub trait NotificationActions: Send + Sync {
    async fn mark_read(&self, id: &str) -> Result<(), SyncError>;

    async fn mark_all_read(&self) -> Result<(), SyncError>;

    async fn delete(&self, id: &str) -> Result<(), SyncError>;
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

/// reqwest-backed implementation of [`SnapshotLoader`] and [`NotificationActions`].
pub struct RestClient {
    base_url: Url,
    client: Client,
    auth: Arc<dyn AuthProvider>,
}

impl RestClient {
    pub fn new(
        base_url: Url,
        auth: Arc<dyn AuthProvider>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        install_rustls_provider();

        let mut builder = Client::builder();
        if timeout > Duration::ZERO {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            base_url,
            client,
            auth,
        })
    }

    /// Build `base/segments...`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Endpoint(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
    ) -> Result<ApiEnvelope<T>, SyncError> {
        let token = self.auth.token().await?;
        debug!(%method, path = url.path(), "API request");

        let response = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "API request failed");
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let envelope: ApiEnvelope<T> = serde_json::from_slice(&bytes)?;
        if !envelope.success {
            return Err(SyncError::Rejected(
                envelope
                    .message
                    .clone()
                    .unwrap_or_else(|| "success=false".to_string()),
            ));
        }
        Ok(envelope)
    }

    async fn confirm(&self, method: Method, segments: &[&str]) -> Result<(), SyncError> {
        let url = self.endpoint(segments)?;
        self.request::<serde_json::Value>(method, url).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotLoader for RestClient {
    async fn fetch(&self, limit: u32) -> Result<Snapshot, SyncError> {
        let mut url = self.endpoint(&["notifications"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        let envelope = self.request::<Snapshot>(Method::GET, url).await?;
        let snapshot = envelope
            .data
            .ok_or_else(|| SyncError::Rejected("response has no data".to_string()))?;
        debug!(
            count = snapshot.notifications.len(),
            unread = snapshot.unread_count,
            "Fetched snapshot"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl NotificationActions for RestClient {
    async fn mark_read(&self, id: &str) -> Result<(), SyncError> {
        self.confirm(Method::PUT, &["notifications", id, "read"])
            .await
    }

    async fn mark_all_read(&self) -> Result<(), SyncError> {
        self.confirm(Method::PUT, &["notifications", "read-all"])
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), SyncError> {
        self.confirm(Method::DELETE, &["notifications", id]).await
    }
}
