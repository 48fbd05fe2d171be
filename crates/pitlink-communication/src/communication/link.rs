//! Device links
//!
//! A [`DeviceLink`] owns one serial endpoint for its lifetime and runs two
//! threads:
//!
//! - `pitlink-io:<path>` performs the blocking reads and writes. Reads use a
//!   short timeout so the thread notices shutdown even when the device has
//!   gone silent.
//! - `pitlink-bridge:<path>` moves outbound buffers from the bounded write
//!   queue to the I/O thread, reassembles inbound bytes into frames and
//!   publishes each frame body to subscribers. It never touches the port.
//!
//! Subscribers run on the bridge thread.
//!
//! On [`Link::stop`] the bridge forwards whatever is still queued and hangs
//! up; the I/O thread writes everything it was handed before exiting. Each
//! of those writes is bounded by the port's own timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender, TryRecvError};
use crossbeam::select;
use parking_lot::Mutex;

use pitlink_core::{ConnectionError, Result, SharedCallback, SubscriptionId, Subscribers};
use pitlink_protocol::FrameReader;

use super::serial::{RealSerialPort, SerialPort};
use crate::config::LinkSettings;

/// Handler receiving inbound frame bodies `[group, address, ids..., payload...]`
pub type FrameSink = SharedCallback<Vec<u8>>;

const READ_BUFFER_SIZE: usize = 256;
const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(250);

/// A physical link as seen by the link manager
pub trait Link: Send + Sync {
    /// Endpoint this link owns
    fn path(&self) -> &str;

    /// Queue bytes for transmission; empty input is a no-op
    fn write_bytes(&self, data: &[u8]) -> Result<()>;

    /// Shut the link down; idempotent
    fn stop(&self);

    /// Whether the I/O loop is still running
    fn is_alive(&self) -> bool;
}

/// Serial link with isolated blocking I/O
pub struct DeviceLink {
    path: String,
    outbound: Sender<Vec<u8>>,
    shutdown: Mutex<Option<Sender<()>>>,
    stopped: AtomicBool,
    alive: Arc<AtomicBool>,
    subscribers: Arc<Subscribers<Vec<u8>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceLink {
    /// Open `path` and start its threads
    pub fn open(path: &str, settings: &LinkSettings, reader: FrameReader, sink: FrameSink) -> Result<Self> {
        let port = RealSerialPort::open(path, settings)?;
        Self::spawn(Box::new(port), settings.write_queue_capacity, reader, sink)
    }

    /// Start the threads for an already open port
    ///
    /// `sink` is subscribed before any byte is read.
    pub fn spawn(
        port: Box<dyn SerialPort>,
        queue_capacity: usize,
        reader: FrameReader,
        sink: FrameSink,
    ) -> Result<Self> {
        let path = port.name();
        let (outbound_tx, outbound_rx) = channel::bounded::<Vec<u8>>(queue_capacity.max(1));
        let (to_io_tx, to_io_rx) = channel::unbounded::<Vec<u8>>();
        let (inbound_tx, inbound_rx) = channel::unbounded::<Vec<u8>>();
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let alive = Arc::new(AtomicBool::new(true));
        let subscribers = Arc::new(Subscribers::new());
        subscribers.subscribe(move |body| sink(body));

        let io = IoLoop {
            port,
            to_io: to_io_rx,
            inbound: inbound_tx,
            alive: Arc::clone(&alive),
        };
        let io_handle = thread::Builder::new()
            .name(format!("pitlink-io:{}", path))
            .spawn(move || io.run())?;

        let bridge = Bridge {
            path: path.clone(),
            outbound: outbound_rx,
            to_io: to_io_tx,
            inbound: inbound_rx,
            shutdown: shutdown_rx,
            reader,
            subscribers: Arc::clone(&subscribers),
            alive: Arc::clone(&alive),
        };
        // A failed spawn drops the bridge and with it the I/O thread's queue,
        // which ends the I/O thread.
        let bridge_handle = thread::Builder::new()
            .name(format!("pitlink-bridge:{}", path))
            .spawn(move || bridge.run())?;

        tracing::info!("Link opened on {}", path);

        Ok(Self {
            path,
            outbound: outbound_tx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            stopped: AtomicBool::new(false),
            alive,
            subscribers,
            threads: Mutex::new(vec![io_handle, bridge_handle]),
        })
    }

    /// Add a handler for inbound frame bodies
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

impl Link for DeviceLink {
    fn path(&self) -> &str {
        &self.path
    }

    fn write_bytes(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if self.stopped.load(Ordering::SeqCst) || !self.is_alive() {
            return Err(ConnectionError::ConnectionLost {
                reason: format!("link {} is closed", self.path),
            }
            .into());
        }

        match self.outbound.send_timeout(data.to_vec(), ENQUEUE_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(ConnectionError::SerialError {
                reason: format!("write queue of {} is full", self.path),
            }
            .into()),
            Err(SendTimeoutError::Disconnected(_)) => Err(ConnectionError::ConnectionLost {
                reason: format!("link {} is closed", self.path),
            }
            .into()),
        }
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Stopping link on {}", self.path);

        // Dropping the sender wakes the bridge's select.
        self.shutdown.lock().take();

        let current = thread::current().id();
        let handles: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Link thread for {} panicked", self.path);
            }
        }
        self.alive.store(false, Ordering::SeqCst);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.stop();
    }
}

struct IoLoop {
    port: Box<dyn SerialPort>,
    to_io: Receiver<Vec<u8>>,
    inbound: Sender<Vec<u8>>,
    alive: Arc<AtomicBool>,
}

impl IoLoop {
    /// Runs until the bridge hangs up; queued writes are flushed first
    fn run(mut self) {
        let name = self.port.name();
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            loop {
                match self.to_io.try_recv() {
                    Ok(data) => {
                        tracing::debug!("{} <- {:02x?}", name, data);
                        if let Err(e) = self.port.write(&data) {
                            tracing::error!("Write to {} failed: {}", name, e);
                            self.alive.store(false, Ordering::SeqCst);
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::debug!("I/O loop for {} exited", name);
                        return;
                    }
                }
            }

            match self.port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    // Ignored once the bridge is flushing
                    let _ = self.inbound.send(buf[..n].to_vec());
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut
                            | std::io::ErrorKind::WouldBlock
                            | std::io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    tracing::error!("Read from {} failed: {}", name, e);
                    self.alive.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}

struct Bridge {
    path: String,
    outbound: Receiver<Vec<u8>>,
    to_io: Sender<Vec<u8>>,
    inbound: Receiver<Vec<u8>>,
    shutdown: Receiver<()>,
    reader: FrameReader,
    subscribers: Arc<Subscribers<Vec<u8>>>,
    alive: Arc<AtomicBool>,
}

impl Bridge {
    fn run(mut self) {
        loop {
            select! {
                recv(self.outbound) -> data => match data {
                    Ok(data) => {
                        if self.to_io.send(data).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(self.inbound) -> chunk => match chunk {
                    Ok(chunk) => {
                        for body in self.reader.push(&chunk) {
                            tracing::debug!("{} -> {:02x?}", self.path, body);
                            self.subscribers.dispatch(body);
                        }
                    }
                    // I/O loop ended on its own: endpoint failure
                    Err(_) => break,
                },
                recv(self.shutdown) -> _ => break,
            }
        }

        let pending: Vec<Vec<u8>> = self.outbound.try_iter().collect();
        if !pending.is_empty() {
            tracing::debug!("Flushing {} queued writes to {}", pending.len(), self.path);
        }
        for data in pending {
            if self.to_io.send(data).is_err() {
                break;
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        tracing::debug!("Bridge for {} exited", self.path);
    }
}
