//! Delivery coordinator.
//!
//! [`DeliveryCoordinator`] is the long-lived service object. `start` spawns a
//! session task that owns the store and the transport; every other call is
//! forwarded to that task over a command channel. State changes are
//! published on a `watch` channel, lifecycle events on a `broadcast` channel,
//! and store changes to subscribers registered with
//! [`DeliveryCoordinator::subscribe`].

mod events;
mod runner;

pub use events::{CoordinatorState, DeliveryEvent, Mutation, SessionStatus, StopReason};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::auth::AuthProvider;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::model::ConnectionState;
use crate::policy::ReconnectPolicy;
use crate::rest::{NotificationActions, RestClient};
use crate::snapshot::SnapshotLoader;
use crate::store::{ListenerRegistry, StoreChange, StoreSnapshot, StoreView, Subscription};
use crate::transport::{Transport, WebSocketTransport};
use events::Command;
use runner::{RunnerParams, SessionRunner};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// External collaborators injected into the coordinator.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub snapshots: Arc<dyn SnapshotLoader>,
    pub actions: Arc<dyn NotificationActions>,
    pub auth: Arc<dyn AuthProvider>,
}

impl Collaborators {
    /// WebSocket transport plus one REST client serving both snapshots and
    /// mutation confirmations.
    pub fn from_config(config: &ClientConfig, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let rest = Arc::new(RestClient::new(
            config.rest_url()?,
            Arc::clone(&auth),
            config.request_timeout(),
        )?);

        Ok(Self {
            transport: Arc::new(WebSocketTransport::new(config.websocket())),
            snapshots: rest.clone(),
            actions: rest,
            auth,
        })
    }
}

/// Session settings derived from [`ClientConfig`].
#[derive(Debug)]
pub(crate) struct SessionSettings {
    pub ws_url: Url,
    pub snapshot_limit: u32,
    pub policy: ReconnectPolicy,
    pub resync_on_reconnect: bool,
    pub auth_close_codes: Vec<u16>,
}

impl SessionSettings {
    fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ws_url: config.socket_url()?,
            snapshot_limit: config.snapshot_limit,
            policy: config.reconnect,
            resync_on_reconnect: config.resync_on_reconnect,
            auth_close_codes: config.auth_close_codes.clone(),
        })
    }

    /// Push URL carrying `token`, replacing any token already in the query.
    pub fn socket_url(&self, token: &str) -> Url {
        let mut url = self.ws_url.clone();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "token")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs)
            .append_pair("token", token);
        url
    }
}

struct ActiveSession {
    generation: u64,
    command_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Orchestrates snapshot loading, the push connection and the store.
///
/// Share it behind an `Arc`; all methods take `&self`.
pub struct DeliveryCoordinator {
    settings: Arc<SessionSettings>,
    collaborators: Collaborators,
    listeners: Arc<ListenerRegistry>,
    status_tx: watch::Sender<SessionStatus>,
    event_tx: broadcast::Sender<DeliveryEvent>,
    session: Mutex<Option<ActiveSession>>,
    generation: AtomicU64,
}

impl DeliveryCoordinator {
    pub fn new(config: &ClientConfig, collaborators: Collaborators) -> Result<Self> {
        let settings = SessionSettings::from_config(config)?;
        let (status_tx, _) = watch::channel(SessionStatus::default());
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        Ok(Self {
            settings: Arc::new(settings),
            collaborators,
            listeners: ListenerRegistry::new(),
            status_tx,
            event_tx,
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    /// Build a coordinator with the WebSocket transport and REST client.
    pub fn from_config(config: &ClientConfig, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let collaborators = Collaborators::from_config(config, auth)?;
        Self::new(config, collaborators)
    }

    /// Start a session: initial snapshot, then the push connection.
    ///
    /// Fails with [`Error::AlreadyRunning`] while a session is live. A session
    /// that has stopped on its own may be started again.
    pub fn start(&self) -> Result<()> {
        let mut session = self.session.lock();
        if let Some(active) = session.as_ref()
            && !active.task.is_finished()
        {
            return Err(Error::AlreadyRunning);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = CancellationToken::new();

        self.status_tx.send_replace(SessionStatus {
            state: CoordinatorState::Starting,
            connection: ConnectionState::Disconnected,
        });
        let _ = self
            .event_tx
            .send(DeliveryEvent::StateChanged(CoordinatorState::Starting));

        let runner = SessionRunner::new(RunnerParams {
            generation,
            settings: Arc::clone(&self.settings),
            collaborators: self.collaborators.clone(),
            listeners: Arc::clone(&self.listeners),
            status_tx: self.status_tx.clone(),
            event_tx: self.event_tx.clone(),
            command_rx,
            cancel: cancel.clone(),
        });

        info!(generation, "Starting delivery session");
        let task = tokio::spawn(runner.run());

        *session = Some(ActiveSession {
            generation,
            command_tx,
            cancel,
            task,
        });
        Ok(())
    }

    /// Tear down the session. Safe to call in any state, any number of times.
    pub async fn stop(&self) {
        let active = self.session.lock().take();

        if let Some(active) = active {
            info!(generation = active.generation, "Stopping delivery session");
            active.cancel.cancel();
            if let Err(e) = active.task.await {
                warn!(error = %e, "Delivery session task failed");
            }
        }

        let changed = self.status_tx.send_if_modified(|status| {
            if status.state.is_stopped() {
                return false;
            }
            *status = SessionStatus {
                state: CoordinatorState::Stopped {
                    reason: StopReason::Requested,
                },
                connection: ConnectionState::Disconnected,
            };
            true
        });
        if changed {
            let _ = self.event_tx.send(DeliveryEvent::StateChanged(
                self.status_tx.borrow().state.clone(),
            ));
        }
    }

    /// Whether a session task is alive.
    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    /// Optimistically mark one notification read, then confirm with the server.
    pub async fn mark_read(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::Mutate(Mutation::MarkRead { id: id.into() }))
            .await
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.send(Command::Mutate(Mutation::MarkAllRead)).await
    }

    /// Optimistically remove one notification, then delete it on the server.
    pub async fn remove(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::Mutate(Mutation::Remove { id: id.into() }))
            .await
    }

    /// Reload the snapshot now.
    pub async fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh).await
    }

    /// Copy of the current list and unread count.
    pub async fn view(&self) -> Result<StoreSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::View(reply_tx)).await?;
        reply_rx.await.map_err(|_| Error::NotRunning)
    }

    /// Observe store changes. Subscriptions survive restarts.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StoreChange, &StoreView<'_>) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.event_tx.subscribe()
    }

    async fn send(&self, command: Command) -> Result<()> {
        let command_tx = self
            .session
            .lock()
            .as_ref()
            .map(|active| active.command_tx.clone())
            .ok_or(Error::NotRunning)?;
        command_tx.send(command).await.map_err(|_| Error::NotRunning)
    }
}

impl Drop for DeliveryCoordinator {
    fn drop(&mut self) {
        if let Some(active) = self.session.get_mut().take() {
            active.cancel.cancel();
        }
    }
}
