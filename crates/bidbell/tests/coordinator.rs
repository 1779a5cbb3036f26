//! Coordinator behaviour against an in-memory transport on a paused clock.

use async_trait::async_trait;
use bidbell::{
    AuthError, AuthProvider, ClientConfig, Collaborators, CoordinatorState, DeliveryCoordinator,
    DeliveryEvent, Error, Notification, NotificationActions, NotificationType, ReconnectPolicy,
    Snapshot, SnapshotLoader, StaticTokenProvider, StopReason, StoreChange, Subscription,
    SyncError, Transport, TransportConnection, TransportEvent, TransportPeer,
};
use mockall::mock;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore, broadcast, mpsc};
use url::Url;

mock! {
    pub Actions {}

    #[async_trait]
    impl NotificationActions for Actions {
        async fn mark_read(&self, id: &str) -> Result<(), SyncError>;
        async fn mark_all_read(&self) -> Result<(), SyncError>;
        async fn delete(&self, id: &str) -> Result<(), SyncError>;
    }
}

mock! {
    pub Auth {}

    #[async_trait]
    impl AuthProvider for Auth {
        async fn token(&self) -> Result<String, AuthError>;
    }
}

/// Records every `open` and hands the driver side to the test.
#[derive(Default)]
struct ScriptedTransport {
    opened: Mutex<Vec<Url>>,
    peers: Mutex<VecDeque<TransportPeer>>,
    notify: Notify,
}

impl ScriptedTransport {
    fn opens(&self) -> usize {
        self.opened.lock().len()
    }

    fn last_url(&self) -> Option<Url> {
        self.opened.lock().last().cloned()
    }

    async fn next_peer(&self) -> TransportPeer {
        loop {
            if let Some(peer) = self.peers.lock().pop_front() {
                return peer;
            }
            self.notify.notified().await;
        }
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, url: &Url) -> TransportConnection {
        let (conn, peer) = TransportConnection::pair();
        self.opened.lock().push(url.clone());
        self.peers.lock().push_back(peer);
        self.notify.notify_one();
        conn
    }
}

/// Serves queued results, then empty snapshots.
#[derive(Default)]
struct FakeSnapshots {
    responses: Mutex<VecDeque<Result<Snapshot, SyncError>>>,
    calls: AtomicUsize,
}

impl FakeSnapshots {
    fn with(responses: Vec<Result<Snapshot, SyncError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotLoader for FakeSnapshots {
    async fn fetch(&self, _limit: u32) -> Result<Snapshot, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Snapshot::default()))
    }
}

struct Harness {
    coordinator: DeliveryCoordinator,
    transport: Arc<ScriptedTransport>,
    snapshots: Arc<FakeSnapshots>,
}

fn config(max_attempts: u32) -> ClientConfig {
    ClientConfig {
        ws_url: "wss://push.test/ws".to_string(),
        reconnect: ReconnectPolicy {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts,
        },
        ..Default::default()
    }
}

fn accepting_actions() -> MockActions {
    let mut actions = MockActions::new();
    actions.expect_mark_read().returning(|_| Ok(()));
    actions.expect_mark_all_read().returning(|| Ok(()));
    actions.expect_delete().returning(|_| Ok(()));
    actions
}

fn harness_with(
    config: ClientConfig,
    snapshots: Arc<FakeSnapshots>,
    actions: impl NotificationActions + 'static,
    auth: impl AuthProvider + 'static,
) -> Harness {
    let transport = Arc::new(ScriptedTransport::default());
    let coordinator = DeliveryCoordinator::new(
        &config,
        Collaborators {
            transport: transport.clone(),
            snapshots: snapshots.clone(),
            actions: Arc::new(actions),
            auth: Arc::new(auth),
        },
    )
    .unwrap();

    Harness {
        coordinator,
        transport,
        snapshots,
    }
}

fn harness(snapshots: Vec<Result<Snapshot, SyncError>>) -> Harness {
    harness_with(
        config(5),
        FakeSnapshots::with(snapshots),
        accepting_actions(),
        StaticTokenProvider::new("secret"),
    )
}

fn unread(id: &str) -> Notification {
    Notification::new(id, NotificationType::BidPlaced, "New bid", "Someone bid on your item")
}

fn snapshot(items: Vec<Notification>, unread_count: i64) -> Result<Snapshot, SyncError> {
    Ok(Snapshot {
        notifications: items,
        unread_count,
    })
}

fn push(id: &str) -> TransportEvent {
    TransportEvent::Message(
        json!({
            "type": "notification",
            "notification": {
                "id": id,
                "type": "BID_OUTBID",
                "title": "Outbid",
                "message": "You have been outbid",
                "isRead": false
            }
        })
        .to_string(),
    )
}

fn frame(value: serde_json::Value) -> TransportEvent {
    TransportEvent::Message(value.to_string())
}

type ChangeLog = mpsc::UnboundedReceiver<(StoreChange, Vec<String>, usize)>;

fn record_changes(coordinator: &DeliveryCoordinator) -> (Subscription, ChangeLog) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = coordinator.subscribe(move |change, view| {
        let ids = view.items.iter().map(|n| n.id.clone()).collect();
        let _ = tx.send((change.clone(), ids, view.unread_count));
    });
    (subscription, rx)
}

async fn wait_for_state(
    coordinator: &DeliveryCoordinator,
    predicate: impl Fn(&CoordinatorState) -> bool,
) -> CoordinatorState {
    let mut status = coordinator.watch_status();
    status
        .wait_for(|s| predicate(&s.state))
        .await
        .unwrap()
        .state
        .clone()
}

async fn next_reconnect(events: &mut broadcast::Receiver<DeliveryEvent>) -> (u32, Duration) {
    loop {
        if let DeliveryEvent::ReconnectScheduled { attempt, delay } = events.recv().await.unwrap() {
            return (attempt, delay);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_then_push_reconciliation() {
    let h = harness(vec![snapshot(vec![unread("1")], 1)]);
    let (_subscription, mut changes) = record_changes(&h.coordinator);

    h.coordinator.start().unwrap();
    assert_eq!(
        changes.recv().await.unwrap(),
        (StoreChange::SnapshotLoaded { count: 1 }, vec!["1".into()], 1)
    );

    let peer = h.transport.next_peer().await;
    assert_eq!(
        h.transport.last_url().unwrap().as_str(),
        "wss://push.test/ws?token=secret"
    );
    peer.emit(TransportEvent::Open).await;
    peer.emit(frame(json!({ "type": "connection_confirmed" }))).await;
    wait_for_state(&h.coordinator, |s| *s == CoordinatorState::Connected).await;

    peer.emit(push("2")).await;
    assert_eq!(
        changes.recv().await.unwrap(),
        (
            StoreChange::Added { id: "2".into() },
            vec!["2".into(), "1".into()],
            2
        )
    );

    peer.emit(frame(json!({ "type": "notification_read", "notificationId": "2" })))
        .await;
    let (change, _, count) = changes.recv().await.unwrap();
    assert_eq!(change, StoreChange::MarkedRead { id: "2".into() });
    assert_eq!(count, 1);

    peer.emit(frame(json!({ "type": "unread_count", "count": 5 })))
        .await;
    let (change, _, count) = changes.recv().await.unwrap();
    assert_eq!(change, StoreChange::UnreadCountSet { count: 5 });
    assert_eq!(count, 5);

    let view = h.coordinator.view().await.unwrap();
    assert_eq!(view.unread_count, 5);
    assert_eq!(view.items.len(), 2);

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_push_does_not_double_count() {
    let h = harness(vec![]);
    let (_subscription, mut changes) = record_changes(&h.coordinator);
    h.coordinator.start().unwrap();
    changes.recv().await.unwrap();

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Open).await;
    peer.emit(push("7")).await;
    peer.emit(push("7")).await;

    assert_eq!(changes.recv().await.unwrap().0, StoreChange::Added { id: "7".into() });
    let (change, ids, count) = changes.recv().await.unwrap();
    assert_eq!(change, StoreChange::Updated { id: "7".into() });
    assert_eq!(ids, vec!["7".to_string()]);
    assert_eq!(count, 1);

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_initial_snapshot_failure_is_not_fatal() {
    let h = harness(vec![Err(SyncError::Status {
        status: 503,
        body: String::new(),
    })]);
    let mut events = h.coordinator.events();
    h.coordinator.start().unwrap();

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Open).await;
    wait_for_state(&h.coordinator, |s| *s == CoordinatorState::Connected).await;

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let DeliveryEvent::SyncFailed { operation, .. } = event {
            assert_eq!(operation, "snapshot");
            saw_failure = true;
        }
    }
    assert!(saw_failure);

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_attempts_are_bounded() {
    let h = harness(vec![]);
    let mut events = h.coordinator.events();
    h.coordinator.start().unwrap();

    let mut delays = Vec::new();
    for attempt in 1..=5u32 {
        let peer = h.transport.next_peer().await;
        peer.emit(TransportEvent::Error("connection refused".into()))
            .await;
        if attempt < 5 {
            delays.push(next_reconnect(&mut events).await);
        }
    }

    assert_eq!(
        delays,
        vec![
            (1, Duration::from_secs(1)),
            (2, Duration::from_secs(2)),
            (3, Duration::from_secs(3)),
            (4, Duration::from_secs(4)),
        ]
    );

    let state = wait_for_state(&h.coordinator, CoordinatorState::is_stopped).await;
    assert_eq!(
        state,
        CoordinatorState::Stopped {
            reason: StopReason::RetriesExhausted { attempts: 5 }
        }
    );
    assert!(h.coordinator.status().is_permanently_disconnected());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.transport.opens(), 5);
    assert!(!h.coordinator.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_attempts() {
    let h = harness(vec![]);
    let mut events = h.coordinator.events();
    h.coordinator.start().unwrap();

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Close {
        code: 1006,
        was_clean: false,
    })
    .await;
    assert_eq!(next_reconnect(&mut events).await.0, 1);

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Close {
        code: 1006,
        was_clean: false,
    })
    .await;
    assert_eq!(next_reconnect(&mut events).await.0, 2);

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Open).await;
    peer.emit(TransportEvent::Close {
        code: 1011,
        was_clean: true,
    })
    .await;
    assert_eq!(
        next_reconnect(&mut events).await,
        (1, Duration::from_secs(1))
    );

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_reconnect() {
    let h = harness(vec![]);
    h.coordinator.start().unwrap();

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Error("reset by peer".into())).await;
    wait_for_state(&h.coordinator, |s| {
        matches!(s, CoordinatorState::Reconnecting { attempt: 1 })
    })
    .await;

    h.coordinator.stop().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.transport.opens(), 1);
    assert_eq!(
        h.coordinator.status().state,
        CoordinatorState::Stopped {
            reason: StopReason::Requested
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_connection_with_normal_code() {
    let h = harness(vec![]);
    h.coordinator.start().unwrap();

    let mut peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Open).await;
    wait_for_state(&h.coordinator, |s| *s == CoordinatorState::Connected).await;

    h.coordinator.stop().await;
    assert!(matches!(
        peer.commands.recv().await,
        Some(bidbell::transport::TransportCommand::Close { code: 1000, .. })
    ));

    // Idempotent.
    h.coordinator.stop().await;
    assert!(!h.coordinator.status().is_permanently_disconnected());
}

#[tokio::test(start_paused = true)]
async fn test_clean_close_stops_without_reconnect() {
    let h = harness(vec![]);
    h.coordinator.start().unwrap();

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Open).await;
    peer.emit(TransportEvent::Close {
        code: 1000,
        was_clean: true,
    })
    .await;

    let state = wait_for_state(&h.coordinator, CoordinatorState::is_stopped).await;
    assert_eq!(
        state,
        CoordinatorState::Stopped {
            reason: StopReason::Requested
        }
    );
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auth_close_code_is_fatal() {
    let h = harness(vec![]);
    h.coordinator.start().unwrap();

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Close {
        code: 4001,
        was_clean: true,
    })
    .await;

    let state = wait_for_state(&h.coordinator, CoordinatorState::is_stopped).await;
    assert!(matches!(
        state,
        CoordinatorState::Stopped {
            reason: StopReason::Auth { .. }
        }
    ));
    assert!(h.coordinator.status().is_permanently_disconnected());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_token_never_opens() {
    let h = harness_with(
        config(5),
        FakeSnapshots::with(vec![]),
        accepting_actions(),
        StaticTokenProvider::empty(),
    );
    h.coordinator.start().unwrap();

    let state = wait_for_state(&h.coordinator, CoordinatorState::is_stopped).await;
    assert_eq!(
        state,
        CoordinatorState::Stopped {
            reason: StopReason::Auth {
                message: AuthError::MissingToken.to_string()
            }
        }
    );
    assert_eq!(h.transport.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_token_rejected_on_reconnect() {
    let mut auth = MockAuth::new();
    auth.expect_token()
        .times(1)
        .returning(|| Ok("first".to_string()));
    auth.expect_token()
        .returning(|| Err(AuthError::Rejected("expired".to_string())));

    let h = harness_with(
        config(5),
        FakeSnapshots::with(vec![]),
        accepting_actions(),
        auth,
    );
    h.coordinator.start().unwrap();

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Error("dropped".into())).await;

    let state = wait_for_state(&h.coordinator, CoordinatorState::is_stopped).await;
    assert!(matches!(
        state,
        CoordinatorState::Stopped {
            reason: StopReason::Auth { .. }
        }
    ));
    assert_eq!(h.transport.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resync_after_reconnect() {
    let h = harness(vec![
        snapshot(vec![unread("1")], 1),
        snapshot(vec![unread("2"), unread("1")], 2),
    ]);
    let mut events = h.coordinator.events();
    h.coordinator.start().unwrap();

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Open).await;
    peer.emit(TransportEvent::Close {
        code: 1006,
        was_clean: false,
    })
    .await;

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Open).await;

    loop {
        if let DeliveryEvent::Resynced {
            count,
            unread_count,
        } = events.recv().await.unwrap()
            && count == 2
        {
            assert_eq!(unread_count, 2);
            break;
        }
    }
    assert_eq!(h.snapshots.calls(), 2);

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_confirmation_triggers_resync() {
    let mut actions = MockActions::new();
    actions
        .expect_mark_read()
        .withf(|id| id == "1")
        .times(1)
        .returning(|_| {
            Err(SyncError::Status {
                status: 500,
                body: "boom".into(),
            })
        });

    let h = harness_with(
        config(5),
        FakeSnapshots::with(vec![
            snapshot(vec![unread("1")], 1),
            snapshot(vec![unread("1")], 1),
        ]),
        actions,
        StaticTokenProvider::new("secret"),
    );
    let (_subscription, mut changes) = record_changes(&h.coordinator);
    h.coordinator.start().unwrap();
    changes.recv().await.unwrap();

    h.coordinator.mark_read("1").await.unwrap();
    assert_eq!(
        changes.recv().await.unwrap(),
        (StoreChange::MarkedRead { id: "1".into() }, vec!["1".into()], 0)
    );

    // Corrective snapshot restores the server's view.
    assert_eq!(
        changes.recv().await.unwrap(),
        (StoreChange::SnapshotLoaded { count: 1 }, vec!["1".into()], 1)
    );
    assert_eq!(h.snapshots.calls(), 2);

    h.coordinator.stop().await;
}

/// Holds every confirmation until released, then fails it.
#[derive(Clone)]
struct GatedActions {
    gate: Arc<Semaphore>,
    finished: Arc<AtomicUsize>,
}

impl Default for GatedActions {
    fn default() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            finished: Arc::default(),
        }
    }
}

impl GatedActions {
    async fn fail_after_gate(&self) -> Result<(), SyncError> {
        let _permit = self.gate.acquire().await.unwrap();
        self.finished.fetch_add(1, Ordering::SeqCst);
        Err(SyncError::Status {
            status: 500,
            body: "late".into(),
        })
    }
}

#[async_trait]
impl NotificationActions for GatedActions {
    async fn mark_read(&self, _id: &str) -> Result<(), SyncError> {
        self.fail_after_gate().await
    }

    async fn mark_all_read(&self) -> Result<(), SyncError> {
        self.fail_after_gate().await
    }

    async fn delete(&self, _id: &str) -> Result<(), SyncError> {
        self.fail_after_gate().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_from_stopped_session_is_ignored() {
    let actions = GatedActions::default();
    let h = harness_with(
        config(5),
        FakeSnapshots::with(vec![
            snapshot(vec![unread("1")], 1),
            snapshot(vec![unread("1")], 1),
        ]),
        actions.clone(),
        StaticTokenProvider::new("secret"),
    );
    let mut events = h.coordinator.events();
    let (_subscription, mut changes) = record_changes(&h.coordinator);

    h.coordinator.start().unwrap();
    changes.recv().await.unwrap();
    h.coordinator.mark_read("1").await.unwrap();
    assert_eq!(
        changes.recv().await.unwrap().0,
        StoreChange::MarkedRead { id: "1".into() }
    );
    h.coordinator.stop().await;

    h.coordinator.start().unwrap();
    assert_eq!(
        changes.recv().await.unwrap(),
        (StoreChange::SnapshotLoaded { count: 1 }, vec!["1".into()], 1)
    );
    assert_eq!(h.snapshots.calls(), 2);

    // The first session's confirmation fails only now.
    actions.gate.add_permits(1);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(actions.finished.load(Ordering::SeqCst), 1);

    assert_eq!(h.snapshots.calls(), 2);
    assert!(changes.try_recv().is_err());
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, DeliveryEvent::SyncFailed { .. }),
            "unexpected {event:?}"
        );
    }
    assert_eq!(h.coordinator.view().await.unwrap().unread_count, 1);

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_confirmation_stops_session() {
    let mut actions = MockActions::new();
    actions
        .expect_delete()
        .returning(|_| Err(SyncError::Unauthorized(401)));

    let h = harness_with(
        config(5),
        FakeSnapshots::with(vec![snapshot(vec![unread("1")], 1)]),
        actions,
        StaticTokenProvider::new("secret"),
    );
    h.coordinator.start().unwrap();
    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Open).await;

    h.coordinator.remove("1").await.unwrap();

    let state = wait_for_state(&h.coordinator, CoordinatorState::is_stopped).await;
    assert!(matches!(
        state,
        CoordinatorState::Stopped {
            reason: StopReason::Auth { .. }
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_mark_all_read_is_optimistic() {
    let h = harness(vec![snapshot(vec![unread("1"), unread("2")], 2)]);
    let (_subscription, mut changes) = record_changes(&h.coordinator);
    h.coordinator.start().unwrap();
    changes.recv().await.unwrap();

    h.coordinator.mark_all_read().await.unwrap();
    let (change, _, count) = changes.recv().await.unwrap();
    assert_eq!(change, StoreChange::MarkedAllRead);
    assert_eq!(count, 0);

    let view = h.coordinator.view().await.unwrap();
    assert!(view.items.iter().all(|n| n.is_read));

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_is_dropped() {
    let h = harness(vec![]);
    let mut events = h.coordinator.events();
    let (_subscription, mut changes) = record_changes(&h.coordinator);
    h.coordinator.start().unwrap();
    changes.recv().await.unwrap();

    let peer = h.transport.next_peer().await;
    peer.emit(TransportEvent::Open).await;
    peer.emit(TransportEvent::Message("{not json".into())).await;
    peer.emit(frame(json!({ "type": "auction_extended", "auctionId": "a" })))
        .await;
    peer.emit(push("3")).await;

    assert_eq!(changes.recv().await.unwrap().0, StoreChange::Added { id: "3".into() });
    loop {
        if let DeliveryEvent::FrameDropped { .. } = events.recv().await.unwrap() {
            break;
        }
    }
    assert_eq!(h.coordinator.status().state, CoordinatorState::Connected);
    assert_eq!(h.transport.opens(), 1);

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_guards() {
    let h = harness(vec![]);
    assert!(matches!(
        h.coordinator.mark_read("1").await,
        Err(Error::NotRunning)
    ));

    h.coordinator.start().unwrap();
    assert!(matches!(h.coordinator.start(), Err(Error::AlreadyRunning)));

    h.coordinator.stop().await;
    assert!(matches!(h.coordinator.refresh().await, Err(Error::NotRunning)));

    // A stopped coordinator can start a fresh session.
    h.coordinator.start().unwrap();
    h.transport.next_peer().await;
    assert!(h.coordinator.is_running());
    h.coordinator.stop().await;
    assert_eq!(h.transport.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_stops_callbacks() {
    let h = harness(vec![]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let subscription = h.coordinator.subscribe(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (_log, mut changes) = record_changes(&h.coordinator);

    h.coordinator.start().unwrap();
    changes.recv().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    h.coordinator.refresh().await.unwrap();
    changes.recv().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    h.coordinator.stop().await;
}
