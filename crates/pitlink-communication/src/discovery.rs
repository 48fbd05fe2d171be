//! Endpoint discovery
//!
//! Maps physical serial ports to the device types they belong to. The link
//! manager runs a scanner on every discovery pass and diffs the result
//! against the links it already holds.

use std::collections::HashMap;

use crate::communication::serial::{list_ports, SerialPortInfo};
use crate::config::LinkSettings;

/// Source of `device type -> endpoint path` assignments
pub trait EndpointScanner: Send + Sync {
    fn scan(&self) -> HashMap<String, String>;
}

/// Scanner over the system's serial ports
pub struct SerialScanner {
    settings: LinkSettings,
}

impl SerialScanner {
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }
}

impl EndpointScanner for SerialScanner {
    fn scan(&self) -> HashMap<String, String> {
        match list_ports() {
            Ok(ports) => assign_ports(&ports, &self.settings),
            Err(e) => {
                tracing::warn!("Port scan failed: {}", e);
                HashMap::new()
            }
        }
    }
}

/// Assign ports to device types; the first port matching a device wins
pub fn assign_ports(ports: &[SerialPortInfo], settings: &LinkSettings) -> HashMap<String, String> {
    let mut found = HashMap::new();
    for port in ports {
        let description = format!(
            "{} {}",
            port.description,
            port.product.as_deref().unwrap_or_default()
        );
        if let Some(device) = settings.match_port(&port.port_name, &description) {
            found
                .entry(device.to_string())
                .or_insert_with(|| port.port_name.clone());
        }
    }
    found
}
