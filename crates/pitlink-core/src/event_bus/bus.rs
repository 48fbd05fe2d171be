//! Event Bus implementation.
//!
//! A registry of named channels, each with its own subscriber list. Values
//! published on a channel go to the channel's synchronous handlers and to
//! every async receiver obtained from [`EventBus::receiver`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::subscribers::{SubscriptionId, Subscribers};

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the async broadcast receivers.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Named-channel publish/subscribe registry
///
/// Dispatching or subscribing on a channel that was never registered is a
/// soft failure (`false` / `None`), never a panic.
pub struct EventBus<T> {
    /// Registered channels
    channels: RwLock<HashMap<String, Arc<Subscribers<T>>>>,
    /// Broadcast channel sender for async receivers
    sender: broadcast::Sender<(String, T)>,
    /// Configuration
    config: EventBusConfig,
}

impl<T: Clone + Send + Sync + 'static> EventBus<T> {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            channels: RwLock::new(HashMap::new()),
            sender,
            config,
        }
    }

    /// Register a channel
    ///
    /// Returns false if a channel with this name already exists.
    pub fn register_event(&self, name: impl Into<String>) -> bool {
        let name = name.into();
        let mut channels = self.channels.write();
        if channels.contains_key(&name) {
            return false;
        }
        tracing::trace!("Channel {} registered", name);
        channels.insert(name, Arc::new(Subscribers::new()));
        true
    }

    /// Register several channels at once, skipping existing ones
    pub fn register_events<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.register_event(name);
        }
    }

    /// Remove a channel and its subscribers
    pub fn deregister_event(&self, name: &str) -> bool {
        self.channels.write().remove(name).is_some()
    }

    /// Remove every channel
    pub fn deregister_all_events(&self) {
        self.channels.write().clear();
    }

    /// Names of all registered channels, sorted
    pub fn list_events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a channel is registered
    pub fn has_event(&self, name: &str) -> bool {
        self.channels.read().contains_key(name)
    }

    /// Subscribe to a channel with a synchronous handler
    ///
    /// The handler will be called on the dispatching thread, so it should
    /// return quickly. Returns `None` if the channel does not exist.
    pub fn subscribe<F>(&self, name: &str, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = self.channel(name)?.subscribe(handler);
        tracing::debug!("Subscription {} added to {}", id, name);
        Some(id)
    }

    /// Subscribe to the next value on a channel only
    pub fn subscribe_once<F>(&self, name: &str, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Some(self.channel(name)?.subscribe_once(handler))
    }

    /// Unsubscribe from a channel
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let removed = self
            .channel(name)
            .is_some_and(|channel| channel.unsubscribe(id));
        if removed {
            tracing::debug!("Subscription {} removed from {}", id, name);
        }
        removed
    }

    /// Drop every subscriber of a channel, keeping the channel itself
    pub fn clear_event_subscriptions(&self, name: &str) -> bool {
        match self.channel(name) {
            Some(channel) => {
                channel.clear();
                true
            }
            None => false,
        }
    }

    /// Number of subscribers on a channel, `None` if it does not exist
    pub fn subscriber_count(&self, name: &str) -> Option<usize> {
        self.channel(name).map(|channel| channel.count())
    }

    /// Publish a value on a channel
    ///
    /// Returns false if the channel does not exist.
    pub fn dispatch(&self, name: &str, value: T) -> bool {
        let Some(channel) = self.channel(name) else {
            return false;
        };

        channel.dispatch(value.clone());

        // No async receivers is not an error
        if self.sender.receiver_count() > 0 {
            let _ = self.sender.send((name.to_string(), value));
        }
        true
    }

    /// Get a receiver for manual event polling
    ///
    /// Receives `(channel, value)` for every successful dispatch. Useful for
    /// async contexts where values are consumed in a tokio task.
    pub fn receiver(&self) -> broadcast::Receiver<(String, T)> {
        self.sender.subscribe()
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    fn channel(&self, name: &str) -> Option<Arc<Subscribers<T>>> {
        self.channels.read().get(name).cloned()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.channels.read().len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_bus_creation() {
        let bus: EventBus<i32> = EventBus::new();
        assert!(bus.list_events().is_empty());
    }

    #[test]
    fn test_register_event() {
        let bus: EventBus<i32> = EventBus::new();
        assert!(bus.register_event("test-event"));
        assert!(bus.list_events().contains(&"test-event".to_string()));

        // Duplicate registration is refused
        assert!(!bus.register_event("test-event"));
    }

    #[test]
    fn test_register_events_bulk() {
        let bus: EventBus<i32> = EventBus::new();
        bus.register_events(["a", "b", "c"]);
        assert_eq!(bus.list_events(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_deregister() {
        let bus: EventBus<i32> = EventBus::new();
        bus.register_event("removable");
        assert!(bus.deregister_event("removable"));
        assert!(!bus.has_event("removable"));
        assert!(!bus.deregister_event("nope"));

        bus.register_events(["a", "b"]);
        bus.deregister_all_events();
        assert!(bus.list_events().is_empty());
    }

    #[test]
    fn test_dispatch_and_subscribe() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register_event("click");

        let s = seen.clone();
        bus.subscribe("click", move |v: i32| s.lock().push(v))
            .expect("channel exists");
        assert!(bus.dispatch("click", 99));
        assert_eq!(*seen.lock(), vec![99]);
    }

    #[test]
    fn test_missing_channel_is_soft_failure() {
        let bus: EventBus<i32> = EventBus::new();
        assert!(!bus.dispatch("missing", 1));
        assert!(bus.subscribe("missing", |_| {}).is_none());
        assert_eq!(bus.subscriber_count("missing"), None);
        assert!(!bus.clear_event_subscriptions("missing"));
    }

    #[test]
    fn test_subscribe_once() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register_event("once");

        let s = seen.clone();
        bus.subscribe_once("once", move |v: i32| s.lock().push(v));
        bus.dispatch("once", 1);
        bus.dispatch("once", 2);
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.register_event("unsub");

        let c = counter.clone();
        let id = bus
            .subscribe("unsub", move |_: i32| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .expect("channel exists");
        assert!(bus.unsubscribe("unsub", id));
        bus.dispatch("unsub", 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_event_subscriptions_and_count() {
        let bus: EventBus<i32> = EventBus::new();
        bus.register_event("counted");
        assert_eq!(bus.subscriber_count("counted"), Some(0));

        bus.subscribe("counted", |_| {});
        assert_eq!(bus.subscriber_count("counted"), Some(1));

        assert!(bus.clear_event_subscriptions("counted"));
        assert_eq!(bus.subscriber_count("counted"), Some(0));
        assert!(bus.has_event("counted"));
    }

    #[test]
    fn test_channels_are_isolated() {
        let bus = EventBus::new();
        let left = Arc::new(AtomicUsize::new(0));
        let right = Arc::new(AtomicUsize::new(0));
        bus.register_events(["left", "right"]);

        let l = left.clone();
        bus.subscribe("left", move |_: u8| {
            l.fetch_add(1, Ordering::SeqCst);
        });
        let r = right.clone();
        bus.subscribe("right", move |_: u8| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        bus.dispatch("left", 0);
        assert_eq!(left.load(Ordering::SeqCst), 1);
        assert_eq!(right.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        bus.register_event("base-max-angle");
        let mut receiver = bus.receiver();

        bus.dispatch("base-max-angle", 900u32);

        let received = receiver.try_recv();
        assert_eq!(received.ok(), Some(("base-max-angle".to_string(), 900)));
    }
}
