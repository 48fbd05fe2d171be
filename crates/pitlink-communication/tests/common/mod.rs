//! Mock links and scanners shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pitlink_communication::{EndpointScanner, FrameSink, Link, LinkFactory};
use pitlink_core::{ConnectionError, Result};
use pitlink_protocol::bitwise::{swap_nibbles, toggle_bit};
use pitlink_protocol::FrameReader;

pub const REGISTRY: &str = r#"
message-start: 126
magic-value: 13
device-ids:
  base: 19
  wheel: 23
  pedals: 25
  hub: -1
ids-to-names:
  19: base
  23: wheel
  25: pedals
commands:
  base:
    max-angle: { id: [23], read: 40, write: 41, bytes: 2, type: int }
    firmware: { id: [1], read: 7, write: -1, bytes: 4, type: hex }
  pedals:
    throttle-dir: { id: [1], read: 35, write: 36, bytes: 1, type: int }
  wheel:
    rpm-mode: { id: [16], read: 64, write: 63, bytes: 1, type: int }
  hub:
    port1-power: { id: [2], read: 100, write: -1, bytes: 1, type: int }
"#;

/// Answers read requests as the device would, echoing `reply` as payload
pub type Responder = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

pub struct MockLink {
    pub device: String,
    pub path: String,
    pub written: Mutex<Vec<Vec<u8>>>,
    pub stops: AtomicUsize,
    pub alive: AtomicBool,
    reader: Mutex<FrameReader>,
    sink: FrameSink,
    responder: Option<Responder>,
}

impl MockLink {
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    /// Reassemble raw bytes with the reader this link was opened with
    pub fn decode(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.reader.lock().push(bytes)
    }

    /// Push an inbound frame body through the link's sink
    pub fn deliver(&self, body: Vec<u8>) {
        (self.sink)(body);
    }
}

impl Link for MockLink {
    fn path(&self) -> &str {
        &self.path
    }

    fn write_bytes(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if !self.is_alive() {
            return Err(ConnectionError::ConnectionLost {
                reason: self.path.clone(),
            }
            .into());
        }
        self.written.lock().push(data.to_vec());
        if let Some(body) = self.responder.as_ref().and_then(|respond| respond(data)) {
            self.deliver(body);
        }
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
pub struct MockFactory {
    pub opened: Mutex<Vec<Arc<MockLink>>>,
    pub refuse: Mutex<Vec<String>>,
    responder: Option<Responder>,
}

impl MockFactory {
    pub fn with_responder(responder: Responder) -> Self {
        Self {
            responder: Some(responder),
            ..Self::default()
        }
    }

    pub fn opened_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Most recently opened link for `device`
    pub fn link(&self, device: &str) -> Option<Arc<MockLink>> {
        self.opened
            .lock()
            .iter()
            .rev()
            .find(|link| link.device == device)
            .cloned()
    }
}

impl LinkFactory for MockFactory {
    fn open(
        &self,
        device: &str,
        path: &str,
        reader: FrameReader,
        sink: FrameSink,
    ) -> Option<Arc<dyn Link>> {
        if self.refuse.lock().iter().any(|refused| refused == path) {
            return None;
        }
        let link = Arc::new(MockLink {
            device: device.to_string(),
            path: path.to_string(),
            written: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
            reader: Mutex::new(reader),
            sink,
            responder: self.responder.clone(),
        });
        self.opened.lock().push(Arc::clone(&link));
        Some(link)
    }
}

/// Scanner returning whatever the test last configured
#[derive(Default)]
pub struct FixedScanner {
    pub endpoints: Mutex<HashMap<String, String>>,
}

impl FixedScanner {
    pub fn set(&self, entries: &[(&str, &str)]) {
        *self.endpoints.lock() = endpoints(entries);
    }
}

impl EndpointScanner for FixedScanner {
    fn scan(&self) -> HashMap<String, String> {
        self.endpoints.lock().clone()
    }
}

pub fn endpoints(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(device, path)| (device.to_string(), path.to_string()))
        .collect()
}

/// Build the inbound body a device sends back for an outbound `frame`
///
/// The payload section is replaced by `payload`.
pub fn reply_body(frame: &[u8], id_len: usize, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![toggle_bit(frame[2], 7), swap_nibbles(frame[3])];
    body.extend_from_slice(&frame[4..4 + id_len]);
    body.extend_from_slice(payload);
    body
}
