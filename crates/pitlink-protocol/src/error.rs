//! Error types for the protocol crate.
//!
//! This module provides structured error types for registry loading and
//! frame encoding.

use std::io;
use thiserror::Error;

use crate::codec::Direction;

/// Errors that can occur while building a command registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error while reading the configuration document.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration document is not valid YAML for the expected shape.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A command entry is out of range or names an unknown payload type.
    #[error("Invalid command {device}-{setting}: {reason}")]
    InvalidCommand {
        device: String,
        setting: String,
        reason: String,
    },

    /// A device address entry is out of range.
    #[error("Invalid device entry {device}: {reason}")]
    InvalidDevice { device: String, reason: String },

    /// A header field such as the start byte does not fit in a byte.
    #[error("Invalid {field} value {value}")]
    InvalidHeader { field: &'static str, value: i64 },
}

/// Errors that can occur while encoding a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The command cannot travel in the requested direction.
    #[error("Command has no {direction} group")]
    MissingGroup { direction: Direction },

    /// Id and payload bytes do not fit in the single length byte.
    #[error("Frame body of {len} bytes does not fit the length byte")]
    FrameTooLong { len: usize },
}

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::InvalidCommand {
            device: "base".to_string(),
            setting: "max-angle".to_string(),
            reason: "unknown payload type 'word'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid command base-max-angle: unknown payload type 'word'"
        );

        let err = RegistryError::InvalidDevice {
            device: "pedals".to_string(),
            reason: "address 300 does not fit in a byte".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid device entry pedals: address 300 does not fit in a byte"
        );
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::MissingGroup {
            direction: Direction::Write,
        };
        assert_eq!(err.to_string(), "Command has no write group");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: RegistryError = io_err.into();
        assert!(matches!(err, RegistryError::Io(_)));
    }
}
