//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};
use crate::policy::ReconnectPolicy;
use crate::transport::WebSocketConfig;

/// Close codes the server uses to reject a credential.
pub const DEFAULT_AUTH_CLOSE_CODES: [u16; 2] = [1008, 4001];

/// Settings for one delivery client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Push endpoint (`ws://` or `wss://`); the token is appended as `?token=`
    pub ws_url: String,
    /// REST base URL; `/notifications...` paths are joined onto it
    pub api_url: String,
    /// Page size for snapshot fetches
    pub snapshot_limit: u32,
    pub reconnect: ReconnectPolicy,
    /// Keep-alive ping interval (0 disables)
    pub ping_interval_secs: u64,
    pub connect_timeout_secs: u64,
    /// REST request timeout (0 disables)
    pub request_timeout_secs: u64,
    /// Reload a snapshot after reconnecting to cover missed events
    pub resync_on_reconnect: bool,
    pub auth_close_codes: Vec<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:3000/ws".to_string(),
            api_url: "http://localhost:3000/api".to_string(),
            snapshot_limit: 20,
            reconnect: ReconnectPolicy::default(),
            ping_interval_secs: 30,
            connect_timeout_secs: 15,
            request_timeout_secs: 10,
            resync_on_reconnect: true,
            auth_close_codes: DEFAULT_AUTH_CLOSE_CODES.to_vec(),
        }
    }
}

impl ClientConfig {
    /// Check that the configuration can start a session.
    pub fn validate(&self) -> Result<()> {
        self.socket_url()?;
        self.rest_url()?;

        if self.snapshot_limit == 0 {
            return Err(Error::config("snapshot_limit must be greater than 0"));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(Error::config("reconnect.max_attempts must be greater than 0"));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(Error::config("reconnect.base_delay_ms must be greater than 0"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::config("connect_timeout_secs must be greater than 0"));
        }
        Ok(())
    }

    pub fn socket_url(&self) -> Result<Url> {
        let url = parse_url("ws_url", &self.ws_url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::config(format!(
                "ws_url must use ws:// or wss://, got {other}://"
            ))),
        }
    }

    pub fn rest_url(&self) -> Result<Url> {
        let url = parse_url("api_url", &self.api_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::config(format!(
                "api_url must use http:// or https://, got {other}://"
            ))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn websocket(&self) -> WebSocketConfig {
        WebSocketConfig {
            ping_interval: (self.ping_interval_secs > 0)
                .then(|| Duration::from_secs(self.ping_interval_secs)),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::config(format!("{field} is empty")));
    }
    Url::parse(value).map_err(|e| Error::config(format!("invalid {field} '{value}': {e}")))
}
