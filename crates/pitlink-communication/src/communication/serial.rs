//! Serial port layer
//!
//! Low-level serial port operations for the peripherals' USB CDC endpoints.
//!
//! Supports:
//! - Port enumeration with USB metadata
//! - Opening a port at the configured baud rate with a short read timeout
//! - Blocking read/write through the [`SerialPort`] trait, so links can be
//!   driven by mock ports in tests

use std::io::{self, Read, Write};
use std::time::Duration;

use pitlink_core::{ConnectionError, Error, Result};

use crate::config::LinkSettings;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Gudsen MOZA R9 Base")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Product name if available
    pub product: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            product: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    fn with_usb_info(mut self, usb: &serialport::UsbPortInfo) -> Self {
        self.vid = Some(usb.vid);
        self.pid = Some(usb.pid);
        self.manufacturer = usb.manufacturer.clone();
        self.product = usb.product.clone();
        self.serial_number = usb.serial_number.clone();
        self
    }
}

/// List candidate serial ports on the system
///
/// Filters to USB serial device names:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::Connection(ConnectionError::SerialError {
            reason: format!("failed to enumerate ports: {}", e),
        })
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_candidate_port(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, port_description(port));
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => info.with_usb_info(usb),
                _ => info,
            }
        })
        .collect())
}

fn is_candidate_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            format!(
                "USB {} {}",
                usb.manufacturer.as_deref().unwrap_or("Device"),
                usb.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Low-level serial port interface
pub trait SerialPort: Send {
    /// Write data to the port
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read data from the port, `TimedOut` when nothing arrived in time
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the port name
    fn name(&self) -> String;
}

/// Real serial port implementation using the serialport crate
pub struct RealSerialPort {
    name: String,
    port: Box<dyn serialport::SerialPort>,
}

impl RealSerialPort {
    /// Open `path` as 8N1 without flow control
    pub fn open(path: &str, settings: &LinkSettings) -> Result<Self> {
        let builder = serialport::new(path, settings.baud_rate)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None);

        match builder.open() {
            Ok(port) => Ok(Self {
                name: path.to_string(),
                port,
            }),
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", path, e);
                let error = match e.kind() {
                    serialport::ErrorKind::NoDevice => ConnectionError::PortNotFound {
                        port: path.to_string(),
                    },
                    _ => ConnectionError::FailedToOpen {
                        port: path.to_string(),
                        reason: e.to_string(),
                    },
                };
                Err(error.into())
            }
        }
    }
}

impl SerialPort for RealSerialPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
