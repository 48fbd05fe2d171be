//! Synchronization primitives bridging asynchronous dispatch to callers.
//!
//! - [`Observable`]: a single value that notifies subscribers only when it
//!   actually changes.
//! - [`BlockingValue`]: a one-shot handoff slot with a bounded wait, used
//!   to turn "a value will be dispatched later" into "read one value now".

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::subscribers::{SubscriptionId, Subscribers};

/// Change-gated observable value
pub struct Observable<T> {
    value: Mutex<T>,
    subscribers: Subscribers<T>,
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    /// Create an observable holding `initial`
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            subscribers: Subscribers::new(),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    /// Store a value, notifying subscribers if it differs from the current one
    ///
    /// Returns true if subscribers were notified.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.value.lock();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }
        self.subscribers.dispatch(value);
        true
    }

    /// Re-dispatch the current value unconditionally
    pub fn notify(&self) {
        let value = self.get();
        self.subscribers.dispatch(value);
    }

    /// Subscribe to changes
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    /// Remove a subscription
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

impl<T: Clone + PartialEq + Send + Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// One-shot blocking handoff slot
///
/// A producer calls [`set_value`](Self::set_value) from any thread; a
/// consumer waits at most `timeout` for it. A timed-out wait returns `None`
/// and leaves the slot reusable.
pub struct BlockingValue<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T: Clone> BlockingValue<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Fill the slot and wake every waiter
    pub fn set_value(&self, value: T) {
        *self.slot.lock() = Some(value);
        self.ready.notify_all();
    }

    /// Wait for a value and take it, leaving the slot empty
    pub fn get_value(&self, timeout: Duration) -> Option<T> {
        self.wait(timeout, true)
    }

    /// Wait for a value and return a copy, leaving it in the slot
    pub fn get_value_no_clear(&self, timeout: Duration) -> Option<T> {
        self.wait(timeout, false)
    }

    /// Empty the slot
    pub fn clear(&self) {
        self.slot.lock().take();
    }

    fn wait(&self, timeout: Duration, take: bool) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.is_none() {
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        if take {
            slot.take()
        } else {
            slot.clone()
        }
    }
}

impl<T: Clone> Default for BlockingValue<T> {
    fn default() -> Self {
        Self::new()
    }
}
