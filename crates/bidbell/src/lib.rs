//! Real-time notification delivery with local state reconciliation.
//!
//! A [`DeliveryCoordinator`] loads an authoritative snapshot over REST, opens
//! a push connection, routes every inbound frame into a [`NotificationStore`]
//! and reconnects with linear backoff when the connection drops. UI layers
//! observe the store through [`DeliveryCoordinator::subscribe`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use bidbell::{ClientConfig, DeliveryCoordinator, StaticTokenProvider};
//!
//! # async fn run() -> bidbell::Result<()> {
//! let config = ClientConfig::default();
//! let auth = Arc::new(StaticTokenProvider::new("token"));
//! let coordinator = DeliveryCoordinator::from_config(&config, auth)?;
//!
//! let _subscription = coordinator.subscribe(|change, view| {
//!     println!("{change:?}: {} unread", view.unread_count);
//! });
//! coordinator.start()?;
//! # coordinator.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod policy;
pub mod protocol;
pub mod rest;
pub mod snapshot;
pub mod store;
pub mod tls;
pub mod transport;

pub use auth::{AuthProvider, StaticTokenProvider};
pub use config::ClientConfig;
pub use coordinator::{
    Collaborators, CoordinatorState, DeliveryCoordinator, DeliveryEvent, Mutation, SessionStatus,
    StopReason,
};
pub use error::{AuthError, Error, ProtocolError, Result, SyncError, TransportError};
pub use model::{ConnectionState, Notification, NotificationType};
pub use policy::ReconnectPolicy;
pub use protocol::{MessageHandler, MessageRouter, RouteOutcome, ServerMessage};
pub use rest::{NotificationActions, RestClient};
pub use snapshot::{Snapshot, SnapshotLoader};
pub use store::{NotificationStore, StoreChange, StoreSnapshot, StoreView, Subscription};
pub use transport::{Transport, TransportConnection, TransportEvent, TransportPeer};
