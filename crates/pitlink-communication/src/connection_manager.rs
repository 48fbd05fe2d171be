//! # Connection manager
//!
//! The facade external collaborators talk to. It owns the command registry,
//! one event channel per setting and the [`LinkManager`], and turns
//! `set`/`request` calls into frames and inbound frames into dispatches.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let manager = ConnectionManager::open(Path::new("serial.yml"), LinkSettings::default())?;
//! manager.subscribe("base-max-angle", |angle| tracing::info!(%angle));
//! manager.start()?;
//! manager.set("base-max-angle", SettingValue::Int(900))?;
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use pitlink_core::{
    thread_safe_map, thread_safe_rw, BlockingValue, ConnectionError, Error, EventBus, Result,
    SettingError, SubscriptionId, ThreadSafeMap, ThreadSafeRw,
};
use pitlink_protocol::{parse_response, Command, CommandRegistry, CommandSpec, Direction, SettingValue};

use crate::config::LinkSettings;
use crate::discovery::{EndpointScanner, SerialScanner};
use crate::link_manager::{
    InboundHandler, LinkFactory, LinkManager, SerialLinkFactory, DEVICE_CONNECTED,
    DEVICE_DISCONNECTED,
};

/// State shared with link bridge threads and the poll thread
struct Shared {
    registry: ThreadSafeRw<Arc<CommandRegistry>>,
    bus: EventBus<SettingValue>,
    cache: ThreadSafeMap<String, SettingValue>,
    /// One slot per blocked `read_blocking` caller
    pending_reads: ThreadSafeMap<String, Vec<Arc<BlockingValue<SettingValue>>>>,
    links: Arc<LinkManager>,
}

impl Shared {
    fn registry(&self) -> Arc<CommandRegistry> {
        Arc::clone(&*self.registry.read())
    }

    fn handle_inbound(&self, link_device: &str, body: Vec<u8>) {
        let registry = self.registry();
        let Some(decoded) = parse_response(&body, link_device, &registry) else {
            tracing::debug!("Unresolved frame on {} link: {:02x?}", link_device, body);
            return;
        };
        tracing::debug!("{} = {}", decoded.name, decoded.value);

        self.cache
            .lock()
            .insert(decoded.name.clone(), decoded.value.clone());

        let waiting = self
            .pending_reads
            .lock()
            .get(&decoded.name)
            .cloned()
            .unwrap_or_default();
        for slot in waiting {
            slot.set_value(decoded.value.clone());
        }

        self.bus.dispatch(&decoded.name, decoded.value);
    }

    /// Resolve a full name, checking the device has an address
    fn command(&self, name: &str) -> Result<(Arc<CommandRegistry>, String, CommandSpec, u8)> {
        let registry = self.registry();
        let (setting, device) = registry
            .resolve(name)
            .map(|(s, d)| (s.to_string(), d.to_string()))
            .ok_or_else(|| SettingError::UnknownSetting {
                name: name.to_string(),
            })?;
        let spec = registry
            .spec_for(&device, &setting)
            .cloned()
            .ok_or_else(|| SettingError::UnknownSetting {
                name: name.to_string(),
            })?;
        let address = registry
            .device_address(&device)
            .ok_or_else(|| SettingError::DeviceAbsent {
                device: device.clone(),
            })?;
        Ok((registry, device, spec, address))
    }

    fn send(&self, name: &str, direction: Direction, value: Option<&SettingValue>) -> Result<()> {
        let (registry, device, spec, address) = self.command(name)?;

        let allowed = match direction {
            Direction::Read => spec.is_readable(),
            Direction::Write => spec.is_writable(),
        };
        if !allowed {
            tracing::warn!("Rejected {} of {}: no {} group", direction, name, direction);
            let name = name.to_string();
            return Err(match direction {
                Direction::Read => SettingError::NotReadable { name },
                Direction::Write => SettingError::NotWritable { name },
            }
            .into());
        }

        let command = match value {
            Some(value) => Command::with_value(spec, address, value),
            None => Command::new(spec, address),
        };
        let message = command
            .prepare_message(registry.message_start(), direction, registry.magic_value())
            .map_err(|e| Error::other(format!("{}: {}", name, e)))?;

        let Some(link) = self.links.resolve_link(&device) else {
            tracing::debug!("No link for {}, dropping {} of {}", device, direction, name);
            return Err(ConnectionError::NotConnected { device }.into());
        };
        tracing::debug!("{} {} via {}", direction, name, link.path());
        link.write_bytes(&message)
    }
}

struct PollWorker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
    settings: LinkSettings,
    poller: Mutex<Option<PollWorker>>,
}

impl ConnectionManager {
    /// Build a manager over `registry`, registering every setting channel
    pub fn new(
        registry: CommandRegistry,
        settings: LinkSettings,
        scanner: Arc<dyn EndpointScanner>,
        factory: Arc<dyn LinkFactory>,
    ) -> Self {
        let registry: ThreadSafeRw<Arc<CommandRegistry>> = thread_safe_rw(Arc::new(registry));

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            let inbound: InboundHandler = Arc::new(move |device: &str, body: Vec<u8>| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_inbound(device, body);
                }
            });
            let links = Arc::new(LinkManager::new(
                Arc::clone(&registry),
                settings.clone(),
                scanner,
                factory,
                inbound,
            ));

            let bus = EventBus::new();
            bus.register_events(registry.read().setting_channels());

            Shared {
                registry: Arc::clone(&registry),
                bus,
                cache: thread_safe_map(),
                pending_reads: thread_safe_map(),
                links,
            }
        });

        tracing::info!(
            "Connection manager ready with {} setting channels",
            shared.bus.list_events().len()
        );

        Self {
            shared,
            settings,
            poller: Mutex::new(None),
        }
    }

    /// Load the registry from `registry_path` and use real serial discovery
    pub fn open(registry_path: &Path, settings: LinkSettings) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| ConnectionError::InvalidParameters {
                reason: e.to_string(),
            })?;
        let registry = CommandRegistry::load(registry_path).map_err(|e| {
            Error::other(format!(
                "Failed to load registry {}: {}",
                registry_path.display(),
                e
            ))
        })?;
        let scanner = Arc::new(SerialScanner::new(settings.clone()));
        let factory = Arc::new(SerialLinkFactory::new(settings.clone()));
        Ok(Self::new(registry, settings, scanner, factory))
    }

    /// Start discovery and, if configured, polling
    pub fn start(&self) -> Result<()> {
        if self.settings.dry_run {
            tracing::info!("Dry run: not starting discovery or polling");
            return Ok(());
        }
        self.shared.links.start_discovery()?;
        if self.settings.poll_interval_ms > 0 {
            self.start_polling()?;
        }
        Ok(())
    }

    /// Stop background threads, then every link
    pub fn shutdown(&self) {
        if let Some(worker) = self.poller.lock().take() {
            drop(worker.stop);
            if worker.handle.join().is_err() {
                tracing::error!("Poll thread panicked");
            }
        }
        self.shared.links.stop();
        self.shared.links.stop_all();
        tracing::info!("Connection manager shut down");
    }

    fn start_polling(&self) -> Result<()> {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let shared = Arc::downgrade(&self.shared);
        let interval = Duration::from_millis(self.settings.poll_interval_ms);

        let handle = thread::Builder::new()
            .name("pitlink-poll".to_string())
            .spawn(move || loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    default(interval) => {}
                }
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                poll_subscribed(&shared);
            })?;

        *poller = Some(PollWorker {
            stop: stop_tx,
            handle,
        });
        tracing::info!("Polling every {:?}", interval);
        Ok(())
    }

    /// Last value seen for a setting
    pub fn get(&self, name: &str) -> Option<SettingValue> {
        self.shared.cache.lock().get(name).cloned()
    }

    /// Write a setting value to its device
    pub fn set(&self, name: &str, value: SettingValue) -> Result<()> {
        self.shared.send(name, Direction::Write, Some(&value))
    }

    /// Parse `text` per the setting's payload kind and write it
    pub fn set_from_str(&self, name: &str, text: &str) -> Result<()> {
        let (_, _, spec, _) = self.shared.command(name)?;
        let value = SettingValue::parse(spec.payload, text).ok_or_else(|| {
            Error::other(format!(
                "'{}' is not a valid {} value for {}",
                text,
                spec.payload.tag(),
                name
            ))
        })?;
        self.set(name, value)
    }

    /// Ask the device for a setting's current value
    pub fn request(&self, name: &str) -> Result<()> {
        self.shared.send(name, Direction::Read, None)
    }

    /// Request a setting and wait at most `timeout` for the answer
    pub fn read_blocking(&self, name: &str, timeout: Duration) -> Result<SettingValue> {
        let slot = Arc::new(BlockingValue::new());
        self.shared
            .pending_reads
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(Arc::clone(&slot));

        let result = self.request(name).and_then(|()| {
            slot.get_value(timeout).ok_or_else(|| {
                SettingError::Timeout {
                    name: name.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .into()
            })
        });

        let mut pending = self.shared.pending_reads.lock();
        if let Some(waiters) = pending.get_mut(name) {
            waiters.retain(|waiter| !Arc::ptr_eq(waiter, &slot));
            if waiters.is_empty() {
                pending.remove(name);
            }
        }
        result
    }

    /// Subscribe to a setting channel
    pub fn subscribe<F>(&self, name: &str, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(SettingValue) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(name, handler)
    }

    /// Subscribe to the next value on a setting channel only
    pub fn subscribe_once<F>(&self, name: &str, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(SettingValue) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe_once(name, handler)
    }

    /// Subscribe, then replay the cached value if its device is connected
    pub fn subscribe_connected<F>(&self, name: &str, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(SettingValue) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let subscribed = Arc::clone(&handler);
        let id = self.subscribe(name, move |value| subscribed(value))?;

        let registry = self.shared.registry();
        let connected = registry
            .resolve(name)
            .is_some_and(|(_, device)| self.shared.links.is_connected(device));
        if connected {
            if let Some(value) = self.get(name) {
                handler(value);
            }
        }
        Some(id)
    }

    /// Remove a subscription from a setting or lifecycle channel
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(name, id) || self.shared.links.lifecycle().unsubscribe(name, id)
    }

    /// Called with the device type of every new link
    pub fn subscribe_device_connected<F>(&self, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.shared.links.lifecycle().subscribe(DEVICE_CONNECTED, handler)
    }

    /// Called with the device type of every removed link
    pub fn subscribe_device_disconnected<F>(&self, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.shared
            .links
            .lifecycle()
            .subscribe(DEVICE_DISCONNECTED, handler)
    }

    /// Every setting channel plus the lifecycle channels, sorted
    pub fn list_events(&self) -> Vec<String> {
        let mut events = self.shared.bus.list_events();
        events.extend(self.shared.links.lifecycle().list_events());
        events.sort();
        events
    }

    /// Async receiver of `(channel, value)` for every setting dispatch
    pub fn setting_receiver(&self) -> broadcast::Receiver<(String, SettingValue)> {
        self.shared.bus.receiver()
    }

    /// The registry currently in use
    pub fn command_data(&self) -> Arc<CommandRegistry> {
        self.shared.registry()
    }

    pub fn device_address(&self, device: &str) -> Option<u8> {
        self.shared.registry().device_address(device)
    }

    pub fn is_connected(&self, device: &str) -> bool {
        self.shared.links.is_connected(device)
    }

    pub fn link_manager(&self) -> &Arc<LinkManager> {
        &self.shared.links
    }

    /// Forget every cached value
    pub fn invalidate_cache(&self) {
        self.shared.cache.lock().clear();
    }

    /// Replace the registry, re-registering setting channels
    ///
    /// Channels present in both registries keep their subscribers. The
    /// value cache is invalidated. When the frame header bytes change, every
    /// link is closed and the endpoints are scanned again so the new links
    /// frame with the new header.
    pub fn reload(&self, registry: CommandRegistry) {
        let next: HashSet<String> = registry.setting_channels().into_iter().collect();
        let reframe = {
            let mut current = self.shared.registry.write();
            let reframe = current.message_start() != registry.message_start()
                || current.magic_value() != registry.magic_value();
            *current = Arc::new(registry);
            reframe
        };

        for name in self.shared.bus.list_events() {
            if !next.contains(&name) {
                self.shared.bus.deregister_event(&name);
            }
        }
        self.shared.bus.register_events(next);
        self.invalidate_cache();
        tracing::info!(
            "Registry reloaded, {} setting channels",
            self.shared.bus.list_events().len()
        );

        if reframe && !self.shared.links.active_devices().is_empty() {
            tracing::info!("Frame header changed, reopening links");
            self.shared.links.stop_all();
            self.shared.links.scan_once();
        }
    }

    /// Two-phase wheel address cycling, see [`LinkManager::cycle_wheel_address`]
    pub fn cycle_wheel_address(&self, old: bool) -> u8 {
        self.shared.links.cycle_wheel_address(old)
    }

    /// Feed an inbound frame body as if it arrived on `link_device`'s link
    pub fn handle_frame(&self, link_device: &str, body: Vec<u8>) {
        self.shared.handle_inbound(link_device, body);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll_subscribed(shared: &Shared) {
    let registry = shared.registry();
    for name in shared.bus.list_events() {
        if shared.bus.subscriber_count(&name).unwrap_or(0) == 0 {
            continue;
        }
        let readable = registry
            .resolve(&name)
            .and_then(|(setting, device)| registry.spec_for(device, setting))
            .is_some_and(CommandSpec::is_readable);
        if !readable {
            continue;
        }
        if let Err(e) = shared.send(&name, Direction::Read, None) {
            tracing::trace!("Poll of {} skipped: {}", name, e);
        }
    }
}
