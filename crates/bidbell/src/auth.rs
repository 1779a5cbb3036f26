//! Bearer credential supply.
//!
//! The auth collaborator only has to hand out the current token on demand;
//! login and logout map to starting and stopping the delivery coordinator.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::AuthError;

/// Source of the bearer token used by the socket and the REST API.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn token(&self) -> Result<String, AuthError>;
}

/// A token fixed at construction, or swapped in place on re-login.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: RwLock<Option<String>>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            token: RwLock::new((!token.trim().is_empty()).then_some(token)),
        }
    }

    /// A provider with no token; every request fails with `MissingToken`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, AuthError> {
        self.token.read().clone().ok_or(AuthError::MissingToken)
    }
}
