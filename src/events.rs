//! Typed event subscriptions.
//!
//! Hosts subscribe to the events of a [`SessionBrowser`](crate::host::SessionBrowser)
//! or [`PayloadMonitor`](crate::host::PayloadMonitor) by kind. Handlers run
//! synchronously, on the thread that ticks the client, in subscription order.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// An event that can be broadcast.
pub trait Event {
    /// Discriminant used to route the event to its subscribers.
    type Kind: Copy + Eq + Hash + Send + 'static;

    /// The event's kind.
    fn kind(&self) -> Self::Kind;
}

/// Identifies a subscription, for [`EventBroadcaster::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A subscription table keyed by event kind.
///
/// # Examples
///
/// ```
/// use ims_orchestration::events::{Event, EventBroadcaster};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// enum Kind { Ping }
///
/// struct Ping;
///
/// impl Event for Ping {
///     type Kind = Kind;
///     fn kind(&self) -> Kind { Kind::Ping }
/// }
///
/// let broadcaster = EventBroadcaster::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// broadcaster.subscribe(Kind::Ping, move |_: &Ping| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// assert_eq!(broadcaster.broadcast(&Ping), 1);
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct EventBroadcaster<E: Event> {
    handlers: Mutex<HashMap<E::Kind, Vec<(SubscriptionId, Handler<E>)>>>,
    next_id: AtomicU64,
}

impl<E: Event> Default for EventBroadcaster<E> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E: Event> std::fmt::Debug for EventBroadcaster<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriptions", &self.subscriptions())
            .finish()
    }
}

impl<E: Event> EventBroadcaster<E> {
    /// Creates a broadcaster without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `handler` for every subsequent event of `kind`.
    pub fn subscribe<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscription. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        for subscribers in handlers.values_mut() {
            if let Some(position) = subscribers.iter().position(|(sub, _)| *sub == id) {
                subscribers.remove(position);
                return true;
            }
        }
        false
    }

    /// Removes every subscription.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of live subscriptions across all kinds.
    pub fn subscriptions(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Calls every subscriber of the event's kind and returns how many ran.
    ///
    /// Handlers run without the table locked, so they may subscribe or
    /// unsubscribe; such changes apply from the next broadcast.
    pub fn broadcast(&self, event: &E) -> usize {
        let subscribers: Vec<Handler<E>> = self
            .lock()
            .get(&event.kind())
            .map(|subs| subs.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        for handler in &subscribers {
            handler(event);
        }
        subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<E::Kind, Vec<(SubscriptionId, Handler<E>)>>> {
        self.handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
