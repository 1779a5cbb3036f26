//! Session task for one delivery session.
//!
//! The runner owns the store, the live transport connection and the pending
//! reconnect timer. Only this task touches them.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{
    Command, Completion, CoordinatorState, DeliveryEvent, Mutation, SessionStatus, StopReason,
};
use super::{Collaborators, SessionSettings};
use crate::error::SyncError;
use crate::model::{ConnectionState, Notification};
use crate::protocol::{MessageHandler, MessageRouter, RouteOutcome};
use crate::snapshot::Snapshot;
use crate::store::{ListenerRegistry, NotificationStore};
use crate::transport::{NORMAL_CLOSURE, TransportConnection, TransportEvent, redact};

/// Whether the session loop keeps running.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Parameters for creating a session runner.
pub(crate) struct RunnerParams {
    pub generation: u64,
    pub settings: Arc<SessionSettings>,
    pub collaborators: Collaborators,
    pub listeners: Arc<ListenerRegistry>,
    pub status_tx: watch::Sender<SessionStatus>,
    pub event_tx: broadcast::Sender<DeliveryEvent>,
    pub command_rx: mpsc::Receiver<Command>,
    pub cancel: CancellationToken,
}

pub(crate) struct SessionRunner {
    generation: u64,
    settings: Arc<SessionSettings>,
    collaborators: Collaborators,

    store: NotificationStore,
    router: MessageRouter,

    // At most one of each at any time.
    conn: Option<TransportConnection>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,

    /// Consecutive failed connections since the last successful open
    attempt: u32,
    /// Events may have been missed since the last open
    gap: bool,
    resync_in_flight: bool,
    resync_queued: bool,

    status: SessionStatus,
    status_tx: watch::Sender<SessionStatus>,
    event_tx: broadcast::Sender<DeliveryEvent>,

    command_rx: mpsc::Receiver<Command>,
    // Owned by this session, so results never outlive it.
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    cancel: CancellationToken,
}

impl SessionRunner {
    pub fn new(params: RunnerParams) -> Self {
        let RunnerParams {
            generation,
            settings,
            collaborators,
            listeners,
            status_tx,
            event_tx,
            command_rx,
            cancel,
        } = params;
        let (completion_tx, completion_rx) = mpsc::channel(32);
        let status = status_tx.borrow().clone();

        Self {
            generation,
            settings,
            collaborators,
            store: NotificationStore::with_listeners(listeners),
            router: MessageRouter::new(),
            conn: None,
            reconnect_timer: None,
            attempt: 0,
            gap: false,
            resync_in_flight: false,
            resync_queued: false,
            status,
            status_tx,
            event_tx,
            command_rx,
            completion_tx,
            completion_rx,
            cancel,
        }
    }

    /// Run the session until stopped, cancelled or out of retries.
    pub async fn run(mut self) {
        self.set_state(CoordinatorState::Starting);

        // Initial fill, so the UI has data even if the socket is slow.
        let loader = Arc::clone(&self.collaborators.snapshots);
        let limit = self.settings.snapshot_limit;
        let initial = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.stop(StopReason::Requested);
                return;
            }
            result = loader.fetch(limit) => result,
        };
        match initial {
            Ok(snapshot) => self.apply_snapshot(snapshot),
            Err(e) => {
                warn!(error = %e, "Initial snapshot failed; connecting anyway");
                self.emit(DeliveryEvent::SyncFailed {
                    operation: "snapshot".to_string(),
                    error: e.to_string(),
                });
            }
        }

        if self.open().await == Flow::Stop {
            return;
        }

        loop {
            let flow = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => self.stop(StopReason::Requested),

                cmd = self.command_rx.recv() => self.handle_command(cmd),

                Some(done) = self.completion_rx.recv() => self.handle_completion(done),

                event = next_transport_event(&mut self.conn) => self.handle_transport_event(event),

                _ = wait_reconnect(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.open().await
                }
            };

            if flow == Flow::Stop {
                break;
            }
        }
        debug!(generation = self.generation, "Delivery session finished");
    }

    fn handle_command(&mut self, cmd: Option<Command>) -> Flow {
        match cmd {
            Some(Command::Mutate(mutation)) => {
                self.apply_mutation(&mutation);
                self.spawn_confirmation(mutation);
                Flow::Continue
            }
            Some(Command::Refresh) => {
                self.request_resync();
                Flow::Continue
            }
            Some(Command::View(reply)) => {
                let _ = reply.send(self.store.snapshot());
                Flow::Continue
            }
            // Every handle is gone.
            None => self.stop(StopReason::Requested),
        }
    }

    fn apply_mutation(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::MarkRead { id } => {
                self.store.mark_read(id);
            }
            Mutation::MarkAllRead => self.store.mark_all_read(),
            Mutation::Remove { id } => {
                self.store.remove(id);
            }
        }
    }

    fn spawn_confirmation(&self, mutation: Mutation) {
        let actions = Arc::clone(&self.collaborators.actions);
        let completion_tx = self.completion_tx.clone();

        tokio::spawn(async move {
            let result = match &mutation {
                Mutation::MarkRead { id } => actions.mark_read(id).await,
                Mutation::MarkAllRead => actions.mark_all_read().await,
                Mutation::Remove { id } => actions.delete(id).await,
            };
            // Fails once the session is gone; the result is discarded then.
            let _ = completion_tx
                .send(Completion::Confirmed { mutation, result })
                .await;
        });
    }

    /// Load a fresh snapshot unless one is already on its way.
    fn request_resync(&mut self) {
        if self.resync_in_flight {
            self.resync_queued = true;
            return;
        }
        self.resync_in_flight = true;

        let loader = Arc::clone(&self.collaborators.snapshots);
        let completion_tx = self.completion_tx.clone();
        let limit = self.settings.snapshot_limit;

        tokio::spawn(async move {
            let result = loader.fetch(limit).await;
            let _ = completion_tx
                .send(Completion::Snapshot { result })
                .await;
        });
    }

    fn handle_completion(&mut self, completion: Completion) -> Flow {
        match completion {
            Completion::Snapshot { result } => {
                self.resync_in_flight = false;

                match result {
                    Ok(snapshot) => self.apply_snapshot(snapshot),
                    Err(e) if e.is_auth() => return self.stop_for_auth(&e),
                    Err(e) => {
                        warn!(error = %e, "Resync failed");
                        self.emit(DeliveryEvent::SyncFailed {
                            operation: "snapshot".to_string(),
                            error: e.to_string(),
                        });
                    }
                }

                if self.resync_queued {
                    self.resync_queued = false;
                    self.request_resync();
                }
                Flow::Continue
            }
            Completion::Confirmed { mutation, result } => {
                match result {
                    Ok(()) => {
                        debug!(%mutation, "Server confirmed mutation");
                        Flow::Continue
                    }
                    Err(e) if e.is_auth() => self.stop_for_auth(&e),
                    Err(e) => {
                        warn!(%mutation, error = %e, "Server rejected mutation; resyncing");
                        self.emit(DeliveryEvent::SyncFailed {
                            operation: mutation.to_string(),
                            error: e.to_string(),
                        });
                        self.request_resync();
                        Flow::Continue
                    }
                }
            }
        }
    }

    fn handle_transport_event(&mut self, event: Option<TransportEvent>) -> Flow {
        match event {
            Some(TransportEvent::Open) => {
                let resync = self.gap && self.settings.resync_on_reconnect;
                info!(attempt = self.attempt, "Push connection open");
                self.gap = false;
                self.attempt = 0;
                self.set_connection(ConnectionState::Open);
                self.set_state(CoordinatorState::Connected);
                if resync {
                    self.request_resync();
                }
                Flow::Continue
            }
            Some(TransportEvent::Message(raw)) => {
                let router = self.router;
                if let RouteOutcome::Dropped(e) = router.route(&raw, &mut *self) {
                    self.emit(DeliveryEvent::FrameDropped {
                        reason: e.to_string(),
                    });
                }
                Flow::Continue
            }
            Some(TransportEvent::Error(error)) => {
                warn!(%error, "Push connection error");
                // Release it now; its trailing close event is not needed.
                self.conn = None;
                self.connection_lost()
            }
            Some(TransportEvent::Close { code, was_clean }) => {
                self.conn = None;
                if was_clean && code == NORMAL_CLOSURE {
                    info!(code, "Push connection closed cleanly");
                    self.stop(StopReason::Requested)
                } else if self.settings.auth_close_codes.contains(&code) {
                    warn!(code, "Push connection rejected credentials");
                    self.stop(StopReason::Auth {
                        message: format!("connection closed with code {code}"),
                    })
                } else {
                    warn!(code, was_clean, "Push connection closed");
                    self.connection_lost()
                }
            }
            None => {
                warn!("Push connection driver went away");
                self.conn = None;
                self.connection_lost()
            }
        }
    }

    /// Schedule the next reconnect, or give up once the budget is spent.
    fn connection_lost(&mut self) -> Flow {
        self.gap = true;
        self.attempt += 1;
        let policy = self.settings.policy;
        if !policy.should_retry(self.attempt) {
            warn!(attempts = self.attempt, "Reconnect attempts exhausted");
            return self.stop(StopReason::RetriesExhausted {
                attempts: self.attempt,
            });
        }

        let delay = policy.next_delay(self.attempt);
        info!(attempt = self.attempt, ?delay, "Scheduling reconnect");
        self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
        self.set_connection(ConnectionState::Reconnecting {
            attempt: self.attempt,
        });
        self.set_state(CoordinatorState::Reconnecting {
            attempt: self.attempt,
        });
        self.emit(DeliveryEvent::ReconnectScheduled {
            attempt: self.attempt,
            delay,
        });
        Flow::Continue
    }

    /// Open a fresh connection with a current token.
    async fn open(&mut self) -> Flow {
        self.reconnect_timer = None;

        let auth = Arc::clone(&self.collaborators.auth);
        let token = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.stop(StopReason::Requested),
            token = auth.token() => token,
        };
        let token = match token {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "No usable auth token");
                return self.stop(StopReason::Auth {
                    message: e.to_string(),
                });
            }
        };

        if let Some(mut old) = self.conn.take() {
            old.close(NORMAL_CLOSURE, "superseded");
        }

        let url = self.settings.socket_url(&token);
        info!(attempt = self.attempt, url = %redact(&url), "Opening push connection");
        self.conn = Some(self.collaborators.transport.open(&url));
        self.set_connection(if self.attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting {
                attempt: self.attempt,
            }
        });
        Flow::Continue
    }

    fn stop_for_auth(&mut self, error: &SyncError) -> Flow {
        warn!(error = %error, "Credential rejected by API");
        self.stop(StopReason::Auth {
            message: error.to_string(),
        })
    }

    /// Tear down: cancel the timer, close the connection, publish `Stopped`.
    fn stop(&mut self, reason: StopReason) -> Flow {
        self.reconnect_timer = None;
        if let Some(mut conn) = self.conn.take() {
            conn.close(NORMAL_CLOSURE, "client stop");
        }
        info!(?reason, "Stopping delivery session");
        self.set_connection(ConnectionState::Disconnected);
        self.set_state(CoordinatorState::Stopped { reason });
        Flow::Stop
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.store
            .load_snapshot(snapshot.notifications, snapshot.unread_count);
        self.emit(DeliveryEvent::Resynced {
            count: self.store.len(),
            unread_count: self.store.unread_count(),
        });
    }

    fn set_state(&mut self, state: CoordinatorState) {
        if self.status.state == state {
            return;
        }
        debug!(from = %self.status.state, to = %state, "Coordinator state changed");
        self.status.state = state.clone();
        self.status_tx.send_replace(self.status.clone());
        self.emit(DeliveryEvent::StateChanged(state));
    }

    fn set_connection(&mut self, connection: ConnectionState) {
        if self.status.connection == connection {
            return;
        }
        self.status.connection = connection;
        self.status_tx.send_replace(self.status.clone());
        self.emit(DeliveryEvent::ConnectionChanged(connection));
    }

    fn emit(&self, event: DeliveryEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

impl MessageHandler for SessionRunner {
    fn connection_confirmed(&mut self) {
        self.attempt = 0;
        self.set_connection(ConnectionState::Open);
        self.set_state(CoordinatorState::Connected);
    }

    fn notification(&mut self, notification: Notification) {
        self.store.add_or_update(notification);
    }

    fn notification_read(&mut self, notification_id: &str) {
        self.store.mark_read(notification_id);
    }

    fn unread_count(&mut self, count: i64) {
        self.store.set_authoritative_unread_count(count);
    }
}

async fn next_transport_event(conn: &mut Option<TransportConnection>) -> Option<TransportEvent> {
    match conn {
        Some(conn) => conn.next_event().await,
        None => pending().await,
    }
}

async fn wait_reconnect(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
