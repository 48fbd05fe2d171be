//! Single-channel subscriber list.
//!
//! The building block of every dispatcher in the crate: a device link's
//! inbound frame publication, an observable value, and each named channel
//! of the [`EventBus`](super::EventBus).

use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::types::SharedCallback;

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let full = self.0.simple().to_string();
        write!(f, "Sub({})", full.get(..8).unwrap_or(&full))
    }
}

struct Inner<T> {
    persistent: Vec<(SubscriptionId, SharedCallback<T>)>,
    once: Vec<(SubscriptionId, SharedCallback<T>)>,
}

/// Ordered list of handlers for one stream of values.
///
/// Persistent handlers run on every dispatch in subscription order, then
/// one-shot handlers run once and are dropped. Handlers are invoked on the
/// dispatching thread after the internal lock is released, so a handler may
/// itself subscribe, unsubscribe or dispatch.
pub struct Subscribers<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + Send + 'static> Subscribers<T> {
    /// Create an empty subscriber list
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                persistent: Vec::new(),
                once: Vec::new(),
            }),
        }
    }

    /// Add a handler that runs on every dispatch
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.inner.lock().persistent.push((id, Arc::new(handler)));
        id
    }

    /// Add a handler that runs on the next dispatch only
    pub fn subscribe_once<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.inner.lock().once.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler of either kind
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.persistent.len() + inner.once.len();
        inner.persistent.retain(|(sub, _)| *sub != id);
        inner.once.retain(|(sub, _)| *sub != id);
        before != inner.persistent.len() + inner.once.len()
    }

    /// Deliver a value to every handler
    pub fn dispatch(&self, value: T) {
        let (persistent, once) = {
            let mut inner = self.inner.lock();
            let persistent: Vec<SharedCallback<T>> = inner
                .persistent
                .iter()
                .map(|(_, handler)| handler.clone())
                .collect();
            (persistent, std::mem::take(&mut inner.once))
        };

        for handler in persistent {
            handler(value.clone());
        }
        for (_, handler) in once {
            handler(value.clone());
        }
    }

    /// Drop every handler
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.persistent.clear();
        inner.once.clear();
    }

    /// Number of pending handlers, one-shot handlers included
    pub fn count(&self) -> usize {
        let inner = self.inner.lock();
        inner.persistent.len() + inner.once.len()
    }
}

impl<T: Clone + Send + 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Subscribers")
            .field("persistent", &inner.persistent.len())
            .field("once", &inner.once.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_dispatch_reaches_all_in_order() {
        let subs = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let a = seen.clone();
        subs.subscribe(move |v: i32| a.lock().push(("a", v)));
        let b = seen.clone();
        subs.subscribe(move |v: i32| b.lock().push(("b", v)));

        subs.dispatch(5);
        assert_eq!(*seen.lock(), vec![("a", 5), ("b", 5)]);
    }

    #[test]
    fn test_subscribe_once_is_consumed() {
        let subs = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        subs.subscribe_once(move |v: i32| s.lock().push(v));
        assert_eq!(subs.count(), 1);

        subs.dispatch(1);
        assert_eq!(subs.count(), 0);
        subs.dispatch(2);
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn test_unsubscribe_both_kinds() {
        let subs: Subscribers<i32> = Subscribers::new();
        let persistent = subs.subscribe(|_| {});
        let once = subs.subscribe_once(|_| {});
        assert_eq!(subs.count(), 2);

        assert!(subs.unsubscribe(persistent));
        assert!(subs.unsubscribe(once));
        assert_eq!(subs.count(), 0);

        // Double unsubscribe should return false
        assert!(!subs.unsubscribe(persistent));
    }

    #[test]
    fn test_clear() {
        let subs: Subscribers<i32> = Subscribers::new();
        subs.subscribe(|_| {});
        subs.subscribe(|_| {});
        subs.subscribe_once(|_| {});
        assert_eq!(subs.count(), 3);

        subs.clear();
        assert_eq!(subs.count(), 0);
    }

    #[test]
    fn test_handler_may_resubscribe() {
        let subs: Arc<Subscribers<i32>> = Arc::new(Subscribers::new());
        let inner = subs.clone();
        subs.subscribe_once(move |_| {
            inner.subscribe(|_| {});
        });

        subs.dispatch(0);
        assert_eq!(subs.count(), 1);
    }

    #[test]
    fn test_subscription_id_display() {
        let id = SubscriptionId::new();
        let text = id.to_string();
        assert!(text.starts_with("Sub("));
        assert_eq!(text.len(), "Sub(".len() + 8 + 1);
    }
}
