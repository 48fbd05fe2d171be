//! # Link manager
//!
//! Keeps one [`Link`] per device type that has its own endpoint, and
//! resolves which link carries traffic for any device type.
//!
//! Each discovery pass diffs the scanner's result against the active map:
//! - endpoints that appeared get a new link and a `device-connected` event
//! - endpoints that vanished, or whose link died, are stopped and get a
//!   `device-disconnected` event
//! - unchanged endpoints keep their link instance untouched
//!
//! Devices without a link of their own are reached through the first
//! connected hub device type (`base`, then `hub` by default).
//!
//! Lifecycle events are dispatched after a pass has released its lock, so
//! handlers may call back into the manager.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use crossbeam::select;
use parking_lot::{Mutex, RwLock};

use pitlink_core::{EventBus, ThreadSafeRw};
use pitlink_protocol::codec::WHEEL_DEVICE;
use pitlink_protocol::{CommandRegistry, FrameReader};

use crate::communication::{DeviceLink, FrameSink, Link};
use crate::config::LinkSettings;
use crate::discovery::EndpointScanner;

/// Lifecycle channel carrying the device type of a new link
pub const DEVICE_CONNECTED: &str = "device-connected";
/// Lifecycle channel carrying the device type of a removed link
pub const DEVICE_DISCONNECTED: &str = "device-disconnected";

/// Handler for inbound frame bodies, tagged with the device type of the link
pub type InboundHandler = Arc<dyn Fn(&str, Vec<u8>) + Send + Sync>;

/// Creates links for discovered endpoints
pub trait LinkFactory: Send + Sync {
    /// Open a link on `path` for `device`; `None` when the endpoint cannot be opened
    fn open(&self, device: &str, path: &str, reader: FrameReader, sink: FrameSink) -> Option<Arc<dyn Link>>;
}

/// Factory producing serial [`DeviceLink`]s
pub struct SerialLinkFactory {
    settings: LinkSettings,
}

impl SerialLinkFactory {
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }
}

impl LinkFactory for SerialLinkFactory {
    fn open(&self, device: &str, path: &str, reader: FrameReader, sink: FrameSink) -> Option<Arc<dyn Link>> {
        match DeviceLink::open(path, &self.settings, reader, sink) {
            Ok(link) => Some(Arc::new(link)),
            Err(e) => {
                tracing::warn!("Could not open {} link on {}: {}", device, path, e);
                None
            }
        }
    }
}

struct DiscoveryWorker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct LinkManager {
    registry: ThreadSafeRw<Arc<CommandRegistry>>,
    settings: LinkSettings,
    scanner: Arc<dyn EndpointScanner>,
    factory: Arc<dyn LinkFactory>,
    inbound: InboundHandler,
    lifecycle: Arc<EventBus<String>>,
    links: RwLock<HashMap<String, Arc<dyn Link>>>,
    reconcile_lock: Mutex<()>,
    wheel_cycle_armed: Mutex<bool>,
    discovery: Mutex<Option<DiscoveryWorker>>,
}

impl LinkManager {
    pub fn new(
        registry: ThreadSafeRw<Arc<CommandRegistry>>,
        settings: LinkSettings,
        scanner: Arc<dyn EndpointScanner>,
        factory: Arc<dyn LinkFactory>,
        inbound: InboundHandler,
    ) -> Self {
        let lifecycle = Arc::new(EventBus::new());
        lifecycle.register_events([DEVICE_CONNECTED, DEVICE_DISCONNECTED]);

        Self {
            registry,
            settings,
            scanner,
            factory,
            inbound,
            lifecycle,
            links: RwLock::new(HashMap::new()),
            reconcile_lock: Mutex::new(()),
            wheel_cycle_armed: Mutex::new(false),
            discovery: Mutex::new(None),
        }
    }

    /// Bus carrying the link lifecycle channels
    pub fn lifecycle(&self) -> &Arc<EventBus<String>> {
        &self.lifecycle
    }

    /// Run one discovery pass through the scanner
    pub fn scan_once(&self) {
        let discovered = self.scanner.scan();
        self.reconcile(discovered);
    }

    /// Bring the active links in line with `discovered` (`device -> path`)
    pub fn reconcile(&self, discovered: HashMap<String, String>) {
        let events = self.reconcile_locked(discovered);
        self.publish(events);
    }

    fn reconcile_locked(&self, discovered: HashMap<String, String>) -> Vec<(&'static str, String)> {
        let _guard = self.reconcile_lock.lock();
        let mut events = Vec::new();
        let previous: Vec<(String, Arc<dyn Link>)> = self
            .links
            .read()
            .iter()
            .map(|(device, link)| (device.clone(), Arc::clone(link)))
            .collect();

        let mut kept = HashMap::new();
        for (device, link) in previous {
            let same_path = discovered.get(&device).map(String::as_str) == Some(link.path());
            if same_path && link.is_alive() {
                kept.insert(device, link);
                continue;
            }

            if !link.is_alive() {
                tracing::warn!("Link for {} on {} died", device, link.path());
            }
            self.links.write().remove(&device);
            link.stop();
            tracing::info!("Device {} disconnected", device);
            events.push((DEVICE_DISCONNECTED, device));
        }

        let (start, magic) = {
            let registry = self.registry.read();
            (registry.message_start(), registry.magic_value())
        };

        let mut added: Vec<(&String, &String)> = discovered
            .iter()
            .filter(|(device, _)| !kept.contains_key(*device))
            .collect();
        added.sort();

        for (device, path) in added {
            let reader = FrameReader::new(start, magic)
                .with_checksum_verification(self.settings.verify_checksum);
            let sink = self.sink_for(device);
            let Some(link) = self.factory.open(device, path, reader, sink) else {
                // Retried on the next pass
                continue;
            };
            self.links.write().insert(device.clone(), link);
            tracing::info!("Device {} connected on {}", device, path);
            events.push((DEVICE_CONNECTED, device.clone()));
        }
        events
    }

    fn publish(&self, events: Vec<(&'static str, String)>) {
        for (channel, device) in events {
            self.lifecycle.dispatch(channel, device);
        }
    }

    fn sink_for(&self, device: &str) -> FrameSink {
        let inbound = Arc::clone(&self.inbound);
        let device = device.to_string();
        Arc::new(move |body| inbound(&device, body))
    }

    /// Link carrying traffic for `device`
    ///
    /// The device's own link if it has one, otherwise the first connected
    /// hub device type's link.
    pub fn resolve_link(&self, device: &str) -> Option<Arc<dyn Link>> {
        let links = self.links.read();
        std::iter::once(device)
            .chain(self.settings.hub_devices.iter().map(String::as_str))
            .filter_map(|candidate| links.get(candidate))
            .find(|link| link.is_alive())
            .cloned()
    }

    /// Device types that currently own a link, sorted
    pub fn active_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.links.read().keys().cloned().collect();
        devices.sort();
        devices
    }

    /// Whether traffic for `device` has a live link to travel on
    pub fn is_connected(&self, device: &str) -> bool {
        self.resolve_link(device).is_some()
    }

    /// Two-phase wheel address cycling
    ///
    /// `old = true` arms the cycle. A following `old = false` moves the
    /// wheel two addresses down and returns the new address. An unarmed
    /// `old = false` changes nothing and returns 0.
    pub fn cycle_wheel_address(&self, old: bool) -> u8 {
        let mut armed = self.wheel_cycle_armed.lock();
        if old {
            *armed = true;
            return 0;
        }
        if !*armed {
            return 0;
        }
        *armed = false;

        let mut registry = self.registry.write();
        let Some(current) = registry.device_address(WHEEL_DEVICE) else {
            tracing::warn!("Cannot cycle wheel address: wheel has no address");
            return 0;
        };
        let Some(next) = current.checked_sub(2) else {
            tracing::warn!("Cannot cycle wheel address below {}", current);
            return 0;
        };
        *registry = Arc::new(registry.with_device_address(WHEEL_DEVICE, next));
        tracing::info!("Wheel address cycled from {} to {}", current, next);
        next
    }

    /// Start the background discovery loop
    ///
    /// Does nothing in dry-run mode or when already running.
    pub fn start_discovery(self: &Arc<Self>) -> pitlink_core::Result<()> {
        if self.settings.dry_run {
            tracing::info!("Dry run: discovery disabled");
            return Ok(());
        }

        let mut discovery = self.discovery.lock();
        if discovery.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let manager: Weak<Self> = Arc::downgrade(self);
        let interval = Duration::from_millis(self.settings.discovery_interval_ms);

        let handle = thread::Builder::new()
            .name("pitlink-discovery".to_string())
            .spawn(move || loop {
                match manager.upgrade() {
                    Some(manager) => manager.scan_once(),
                    None => break,
                }
                select! {
                    recv(stop_rx) -> _ => break,
                    default(interval) => {}
                }
            })?;

        tracing::info!("Discovery started, interval {:?}", interval);
        *discovery = Some(DiscoveryWorker {
            stop: stop_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the discovery loop, leaving links open
    pub fn stop(&self) {
        let Some(worker) = self.discovery.lock().take() else {
            return;
        };
        drop(worker.stop);
        if worker.handle.thread().id() != thread::current().id() && worker.handle.join().is_err() {
            tracing::error!("Discovery thread panicked");
        }
        tracing::info!("Discovery stopped");
    }

    /// Stop and forget every link
    pub fn stop_all(&self) {
        let mut stopped = Vec::new();
        {
            let _guard = self.reconcile_lock.lock();
            let drained: Vec<(String, Arc<dyn Link>)> = self.links.write().drain().collect();
            for (device, link) in drained {
                link.stop();
                stopped.push(device);
            }
        }
        for device in stopped {
            self.lifecycle.dispatch(DEVICE_DISCONNECTED, device);
        }
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        self.stop();
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitlink_core::Result;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const REGISTRY: &str = r#"
message-start: 126
magic-value: 13
device-ids: { base: 19, wheel: 23, pedals: 25 }
ids-to-names: { 19: base, 23: wheel, 25: pedals }
commands:
  wheel:
    rpm-mode: { id: [16], read: 64, write: 63, bytes: 1, type: int }
"#;

    struct MockLink {
        path: String,
        stops: AtomicUsize,
        alive: AtomicBool,
    }

    impl Link for MockLink {
        fn path(&self) -> &str {
            &self.path
        }

        fn write_bytes(&self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.alive.store(false, Ordering::SeqCst);
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct MockFactory {
        opened: Mutex<Vec<Arc<MockLink>>>,
    }

    impl LinkFactory for MockFactory {
        fn open(&self, _device: &str, path: &str, _reader: FrameReader, _sink: FrameSink) -> Option<Arc<dyn Link>> {
            let link = Arc::new(MockLink {
                path: path.to_string(),
                stops: AtomicUsize::new(0),
                alive: AtomicBool::new(true),
            });
            self.opened.lock().push(Arc::clone(&link));
            Some(link)
        }
    }

    struct NoScanner;

    impl EndpointScanner for NoScanner {
        fn scan(&self) -> HashMap<String, String> {
            HashMap::new()
        }
    }

    fn manager(factory: Arc<MockFactory>) -> LinkManager {
        manager_with(REGISTRY, factory)
    }

    fn manager_with(yaml: &str, factory: Arc<MockFactory>) -> LinkManager {
        let registry = CommandRegistry::from_yaml_str(yaml).unwrap();
        LinkManager::new(
            Arc::new(RwLock::new(Arc::new(registry))),
            LinkSettings::dry_run(),
            Arc::new(NoScanner),
            factory,
            Arc::new(|_: &str, _: Vec<u8>| {}),
        )
    }

    fn discovered(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(d, p)| (d.to_string(), p.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_link_falls_back_to_hub() {
        let factory = Arc::new(MockFactory::default());
        let manager = manager(Arc::clone(&factory));
        assert!(manager.resolve_link("base").is_none());

        manager.reconcile(discovered(&[("base", "/dev/X")]));
        assert_eq!(manager.resolve_link("base").unwrap().path(), "/dev/X");
        assert_eq!(manager.resolve_link("pedals").unwrap().path(), "/dev/X");
        assert!(manager.is_connected("pedals"));
        assert_eq!(manager.active_devices(), vec!["base"]);
    }

    #[test]
    fn test_dead_link_is_replaced() {
        let factory = Arc::new(MockFactory::default());
        let manager = manager(Arc::clone(&factory));
        manager.reconcile(discovered(&[("base", "/dev/X")]));

        let first = Arc::clone(&factory.opened.lock()[0]);
        first.alive.store(false, Ordering::SeqCst);
        assert!(manager.resolve_link("base").is_none());

        manager.reconcile(discovered(&[("base", "/dev/X")]));
        assert_eq!(first.stops.load(Ordering::SeqCst), 1);
        assert_eq!(factory.opened.lock().len(), 2);
        assert!(manager.is_connected("base"));
    }

    #[test]
    fn test_cycle_wheel_address() {
        let manager = manager(Arc::new(MockFactory::default()));
        assert_eq!(manager.cycle_wheel_address(false), 0);
        assert_eq!(manager.registry.read().device_address("wheel"), Some(23));

        assert_eq!(manager.cycle_wheel_address(true), 0);
        assert_eq!(manager.cycle_wheel_address(false), 21);
        let registry = manager.registry.read();
        assert_eq!(registry.device_address("wheel"), Some(21));
        assert_eq!(registry.device_name(21), Some("wheel"));
    }

    #[test]
    fn test_stop_all() {
        let factory = Arc::new(MockFactory::default());
        let manager = manager(Arc::clone(&factory));
        manager.reconcile(discovered(&[("base", "/dev/X"), ("pedals", "/dev/Y")]));
        manager.stop_all();
        assert!(manager.active_devices().is_empty());
        for link in factory.opened.lock().iter() {
            assert_eq!(link.stops.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_cycle_wheel_address_does_not_underflow() {
        let yaml = REGISTRY.replace("wheel: 23", "wheel: 1").replace("23: wheel", "1: wheel");
        let manager = manager_with(&yaml, Arc::new(MockFactory::default()));

        manager.cycle_wheel_address(true);
        assert_eq!(manager.cycle_wheel_address(false), 0);
        assert_eq!(manager.registry.read().device_address("wheel"), Some(1));
        // Disarmed after the refused move
        assert_eq!(manager.cycle_wheel_address(false), 0);
    }

    #[test]
    fn test_lifecycle_handler_may_stop_all_links() {
        let factory = Arc::new(MockFactory::default());
        let manager = Arc::new(manager(Arc::clone(&factory)));
        manager.reconcile(discovered(&[("base", "/dev/X"), ("pedals", "/dev/Y")]));

        let disconnects = Arc::new(AtomicUsize::new(0));
        {
            let weak = Arc::downgrade(&manager);
            let disconnects = Arc::clone(&disconnects);
            manager.lifecycle().subscribe(DEVICE_DISCONNECTED, move |_| {
                disconnects.fetch_add(1, Ordering::SeqCst);
                if let Some(manager) = weak.upgrade() {
                    manager.stop_all();
                }
            });
        }

        let (done_tx, done_rx) = channel::bounded(1);
        {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager.reconcile(discovered(&[("base", "/dev/X")]));
                let _ = done_tx.send(());
            });
        }
        assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());

        // pedals vanished, then the handler tore down base
        assert!(manager.active_devices().is_empty());
        assert_eq!(disconnects.load(Ordering::SeqCst), 2);
        for link in factory.opened.lock().iter() {
            assert_eq!(link.stops.load(Ordering::SeqCst), 1);
        }
    }
}
