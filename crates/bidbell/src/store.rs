//! Authoritative in-memory notification state.
//!
//! The store keeps the ordered list (most recent first) and the unread
//! counter. Every mutation is idempotent and tolerant of duplicate or
//! out-of-order delivery. Observers registered through
//! [`NotificationStore::subscribe`] are called synchronously after each
//! mutation that changed state.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::model::Notification;

/// What a mutation did to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StoreChange {
    SnapshotLoaded { count: usize },
    Added { id: String },
    Updated { id: String },
    MarkedRead { id: String },
    MarkedAllRead,
    Removed { id: String },
    UnreadCountSet { count: usize },
}

/// Borrowed view handed to observers.
#[derive(Debug, Clone, Copy)]
pub struct StoreView<'a> {
    pub items: &'a [Notification],
    pub unread_count: usize,
}

impl StoreView<'_> {
    pub fn to_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            items: self.items.to_vec(),
            unread_count: self.unread_count,
        }
    }
}

/// Owned copy of the store contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub items: Vec<Notification>,
    pub unread_count: usize,
}

type Listener = Arc<dyn Fn(&StoreChange, &StoreView<'_>) + Send + Sync>;

/// Observers of a store. Shared so subscriptions can outlive a single store
/// instance and be dropped from any thread.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an observer. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&StoreChange, &StoreView<'_>) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    fn notify(&self, change: &StoreChange, view: &StoreView<'_>) {
        // Snapshot under the lock, call outside it: a callback may unsubscribe.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(change, view);
        }
    }
}

/// Handle returned by `subscribe`; unregisters the observer on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

/// Ordered notification list plus unread counter.
///
/// Single writer: only the delivery coordinator mutates it.
pub struct NotificationStore {
    items: Vec<Notification>,
    unread_count: usize,
    listeners: Arc<ListenerRegistry>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::with_listeners(ListenerRegistry::new())
    }

    /// Create an empty store that notifies an existing registry.
    pub fn with_listeners(listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            items: Vec::new(),
            unread_count: 0,
            listeners,
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StoreChange, &StoreView<'_>) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    /// Unread items actually held locally (may differ from `unread_count`
    /// after an authoritative overwrite, since the local list is a window).
    pub fn local_unread(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn view(&self) -> StoreView<'_> {
        StoreView {
            items: &self.items,
            unread_count: self.unread_count,
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.view().to_snapshot()
    }

    /// Replace the whole state with server data, trusting its order.
    ///
    /// Duplicate ids in the input keep their first occurrence.
    pub fn load_snapshot(&mut self, list: Vec<Notification>, unread_count: i64) {
        let mut items: Vec<Notification> = Vec::with_capacity(list.len());
        for n in list {
            if !items.iter().any(|existing| existing.id == n.id) {
                items.push(n);
            }
        }
        self.items = items;
        self.unread_count = clamp_count(unread_count);
        trace!(
            count = self.items.len(),
            unread = self.unread_count,
            "Loaded snapshot"
        );
        self.emit(StoreChange::SnapshotLoaded {
            count: self.items.len(),
        });
    }

    /// Insert a pushed notification at the head, or replace a known one in place.
    pub fn add_or_update(&mut self, notification: Notification) {
        let id = notification.id.clone();
        match self.items.iter().position(|n| n.id == notification.id) {
            Some(index) => {
                let was_unread = !self.items[index].is_read;
                let is_unread = !notification.is_read;
                match (was_unread, is_unread) {
                    (true, false) => self.decrement_unread(),
                    (false, true) => self.unread_count += 1,
                    _ => {}
                }
                self.items[index] = notification;
                self.emit(StoreChange::Updated { id });
            }
            None => {
                if !notification.is_read {
                    self.unread_count += 1;
                }
                self.items.insert(0, notification);
                self.emit(StoreChange::Added { id });
            }
        }
    }

    /// Mark one item read. Returns false (and notifies nobody) when the id is
    /// unknown or already read.
    pub fn mark_read(&mut self, id: &str) -> bool {
        let Some(item) = self.items.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if item.is_read {
            return false;
        }
        item.is_read = true;
        self.decrement_unread();
        self.emit(StoreChange::MarkedRead { id: id.to_string() });
        true
    }

    /// Optimistically mark everything read and zero the counter.
    pub fn mark_all_read(&mut self) {
        for item in &mut self.items {
            item.is_read = true;
        }
        self.unread_count = 0;
        self.emit(StoreChange::MarkedAllRead);
    }

    /// Remove an item locally. Returns false when the id is unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.items.iter().position(|n| n.id == id) else {
            return false;
        };
        let removed = self.items.remove(index);
        if !removed.is_read {
            self.decrement_unread();
        }
        self.emit(StoreChange::Removed { id: id.to_string() });
        true
    }

    /// Overwrite the counter with the server's value, clamped to zero.
    pub fn set_authoritative_unread_count(&mut self, count: i64) {
        self.unread_count = clamp_count(count);
        self.emit(StoreChange::UnreadCountSet {
            count: self.unread_count,
        });
    }

    fn decrement_unread(&mut self) {
        self.unread_count = self.unread_count.saturating_sub(1);
    }

    fn emit(&self, change: StoreChange) {
        let view = StoreView {
            items: &self.items,
            unread_count: self.unread_count,
        };
        self.listeners.notify(&change, &view);
    }
}

fn clamp_count(count: i64) -> usize {
    usize::try_from(count.max(0)).unwrap_or(usize::MAX)
}
