//! # Pitlink Communication
//!
//! Everything between the command registry and the serial ports:
//! - [`communication`]: serial port access and threaded [`DeviceLink`]s
//! - [`discovery`]: mapping ports to device types
//! - [`link_manager`]: reconciling links as endpoints come and go
//! - [`connection_manager`]: the get/set/subscribe facade
//! - [`config`]: link settings loaded from TOML

pub mod communication;
pub mod config;
pub mod connection_manager;
pub mod discovery;
pub mod link_manager;

pub use communication::{
    list_ports, DeviceLink, FrameSink, Link, RealSerialPort, SerialPort, SerialPortInfo,
};
pub use config::{default_config_dir, DiscoveryPattern, LinkSettings, SettingsError, SettingsResult};
pub use connection_manager::ConnectionManager;
pub use discovery::{assign_ports, EndpointScanner, SerialScanner};
pub use link_manager::{
    InboundHandler, LinkFactory, LinkManager, SerialLinkFactory, DEVICE_CONNECTED,
    DEVICE_DISCONNECTED,
};
