// Multi-subscriber event fan-out

//! Event bus
//!
//! A synchronous publish/subscribe primitive for one event type. Subscribers
//! are closures that carry their own context; they are invoked on the
//! publishing thread, one after another, in registration order.
//!
//! # Concurrency
//!
//! Publication iterates over a snapshot of the subscriber list taken under a
//! short read lock, so subscribing or unsubscribing (including from inside a
//! callback) never disturbs a delivery in progress. Each subscription tracks
//! the threads currently running its callback; [`EventBus::unsubscribe`]
//! waits for those deliveries to finish before returning, so the caller may
//! release whatever the callback borrows as soon as it returns.
//!
//! Called from inside a callback, [`EventBus::unsubscribe`] only marks the
//! subscription removed and returns without waiting. Two callbacks on
//! different threads may therefore remove each other without deadlocking.

use parking_lot::{Condvar, Mutex, RwLock};
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type Handler<E> = Box<dyn Fn(&E) + Send + Sync>;

thread_local! {
    /// Number of callbacks currently running on this thread
    static DELIVERY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as inside a callback until dropped
struct DeliveryScope;

impl DeliveryScope {
    fn enter() -> Self {
        DELIVERY_DEPTH.with(|depth| depth.set(depth.get() + 1));
        DeliveryScope
    }

    fn active() -> bool {
        DELIVERY_DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        DELIVERY_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[derive(Default)]
struct DeliveryState {
    removed: bool,
    in_flight: Vec<ThreadId>,
}

struct Subscription<E> {
    id: SubscriptionId,
    handler: Handler<E>,
    state: Mutex<DeliveryState>,
    drained: Condvar,
}

impl<E> Subscription<E> {
    /// Run the handler unless the subscription has been removed.
    fn deliver(&self, event: &E, bus_name: &str) {
        let me = thread::current().id();
        {
            let mut state = self.state.lock();
            if state.removed {
                return;
            }
            state.in_flight.push(me);
        }

        let outcome = {
            let _scope = DeliveryScope::enter();
            panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(event)))
        };
        if outcome.is_err() {
            log::error!("{}: subscriber {} panicked, skipping it", bus_name, self.id);
        }

        let mut state = self.state.lock();
        if let Some(pos) = state.in_flight.iter().position(|t| *t == me) {
            state.in_flight.swap_remove(pos);
        }
        if state.in_flight.is_empty() {
            self.drained.notify_all();
        }
    }

    /// Mark removed and wait until no other thread is inside the handler.
    ///
    /// Never waits when called from inside a callback.
    fn retire(&self) {
        let mut state = self.state.lock();
        state.removed = true;
        if DeliveryScope::active() {
            return;
        }
        while !state.in_flight.is_empty() {
            self.drained.wait(&mut state);
        }
    }
}

/// Publish/subscribe hub for events of type `E`
pub struct EventBus<E> {
    name: &'static str,
    subscribers: RwLock<Vec<Arc<Subscription<E>>>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    /// Create an empty bus. `name` only appears in log output.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler
    ///
    /// The handler runs on whichever thread publishes and should return
    /// quickly. Anything it needs (the subscriber's context) is captured by
    /// the closure.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Arc::new(Subscription {
            id,
            handler: Box::new(handler),
            state: Mutex::new(DeliveryState::default()),
            drained: Condvar::new(),
        });
        self.subscribers.write().push(subscription);
        log::debug!("{}: subscription {} added", self.name, id);
        id
    }

    /// Register a handler together with an explicit context value
    ///
    /// The context is owned by the subscription and handed to every
    /// invocation of `handler`.
    pub fn subscribe_with_context<C, F>(&self, context: C, handler: F) -> SubscriptionId
    where
        C: Send + Sync + 'static,
        F: Fn(&E, &C) + Send + Sync + 'static,
    {
        self.subscribe(move |event| handler(event, &context))
    }

    /// Remove a subscription
    ///
    /// Returns `false` if the handle was unknown or already removed. The
    /// handler is not called again once this returns. Outside a callback it
    /// also waits until the handler is no longer running on any thread.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subscribers = self.subscribers.write();
            subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|pos| subscribers.remove(pos))
        };

        match removed {
            Some(subscription) => {
                subscription.retire();
                log::debug!("{}: subscription {} removed", self.name, id);
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every current subscriber, in registration order
    ///
    /// Subscribers added during this call are not reached by it; subscribers
    /// removed during it are skipped if their turn has not come yet. A
    /// panicking handler is logged and does not stop delivery to the rest.
    pub fn publish(&self, event: &E)
    where
        E: fmt::Debug,
    {
        let snapshot: Vec<Arc<Subscription<E>>> = self.subscribers.read().clone();
        log::debug!(
            "{}: publishing {:?} to {} subscriber(s)",
            self.name,
            event,
            snapshot.len()
        );

        for subscription in &snapshot {
            subscription.deliver(event, self.name);
        }
    }

    /// Number of registered subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
