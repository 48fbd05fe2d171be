//! Error handling for Pitlink
//!
//! Provides the error types shared by every layer of the stack:
//! - Connection errors (serial endpoints, link availability)
//! - Setting errors (name resolution, read/write direction, timeouts)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents errors related to the physical serial endpoints and the
/// links that own them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// No link currently carries traffic for the device
    #[error("Device not connected: {device}")]
    NotConnected {
        /// The device type that has no usable link.
        device: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Generic connection error
    #[error("Connection error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Setting error type
///
/// Represents rejected setting operations. None of these leave the wire:
/// the operation is refused locally and no frame is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    /// Name does not resolve to a known device type and setting
    #[error("Unknown setting: {name}")]
    UnknownSetting {
        /// The full `{device}-{setting}` name.
        name: String,
    },

    /// Setting has no write group
    #[error("Setting {name} is read-only")]
    NotWritable {
        /// The full setting name.
        name: String,
    },

    /// Setting has no read group
    #[error("Setting {name} is write-only")]
    NotReadable {
        /// The full setting name.
        name: String,
    },

    /// Device type has no address in the registry
    #[error("Device {device} has no address")]
    DeviceAbsent {
        /// The device type.
        device: String,
    },

    /// No value arrived before the deadline
    #[error("Timed out after {timeout_ms}ms waiting for {name}")]
    Timeout {
        /// The full setting name.
        name: String,
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },
}

/// Main error type for Pitlink
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Setting error
    #[error(transparent)]
    Setting(#[from] SettingError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Setting(SettingError::Timeout { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if the operation failed because no link was available
    pub fn is_not_connected(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::NotConnected { .. })
        )
    }

    /// Check if this is a setting error
    pub fn is_setting_error(&self) -> bool {
        matches!(self, Error::Setting(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
