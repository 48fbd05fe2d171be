//! Link settings
//!
//! Runtime tuning for serial links, discovery and polling, loaded from a
//! TOML file. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! baud_rate = 115200
//! discovery_interval_ms = 2000
//! hub_devices = ["base", "hub"]
//!
//! [[discovery_patterns]]
//! keyword = "pedals"
//! device = "pedals"
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory name under the platform config directory
pub const CONFIG_DIR_NAME: &str = "pitlink";

/// Errors that can occur while loading link settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A setting value is invalid.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Port name keyword mapped to the device type it identifies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPattern {
    pub keyword: String,
    pub device: String,
}

impl DiscoveryPattern {
    pub fn new(keyword: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            device: device.into(),
        }
    }
}

/// Serial link and discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Serial baud rate
    pub baud_rate: u32,
    /// Blocking read timeout; bounds how long shutdown waits on a silent port
    pub read_timeout_ms: u64,
    /// Pause between discovery passes
    pub discovery_interval_ms: u64,
    /// Pause between read-request sweeps, 0 disables polling
    pub poll_interval_ms: u64,
    /// Capacity of each link's outbound queue
    pub write_queue_capacity: usize,
    /// Drop inbound frames whose checksum does not match
    pub verify_checksum: bool,
    /// Device types whose link carries traffic for devices without one, in order
    pub hub_devices: Vec<String>,
    /// Only ports whose description mentions one of these are considered
    pub vendor_keywords: Vec<String>,
    /// First matching keyword decides the device type of a port
    pub discovery_patterns: Vec<DiscoveryPattern>,
    /// Never spawn discovery or poll threads
    pub dry_run: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout_ms: 10,
            discovery_interval_ms: 2000,
            poll_interval_ms: 0,
            write_queue_capacity: 64,
            verify_checksum: true,
            hub_devices: vec!["base".to_string(), "hub".to_string()],
            vendor_keywords: vec!["gudsen".to_string(), "moza".to_string()],
            discovery_patterns: default_discovery_patterns(),
            dry_run: false,
        }
    }
}

fn default_discovery_patterns() -> Vec<DiscoveryPattern> {
    [
        ("base", "base"),
        ("pedals", "pedals"),
        ("hub", "hub"),
        ("handbrake", "handbrake"),
        ("hgp", "hpattern"),
        ("h-pattern", "hpattern"),
        ("sgp", "sequential"),
        ("sequential", "sequential"),
        ("stalk", "stalks"),
        ("dash", "dash"),
        ("wheel", "wheel"),
    ]
    .into_iter()
    .map(|(keyword, device)| DiscoveryPattern::new(keyword, device))
    .collect()
}

impl LinkSettings {
    /// Create settings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with discovery and polling disabled
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    /// Load and validate settings from a TOML file
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No link settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate and write settings as TOML
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> SettingsResult<()> {
        if self.baud_rate == 0 {
            return Err(invalid("baud_rate", "must be > 0"));
        }

        if self.read_timeout_ms == 0 {
            return Err(invalid("read_timeout_ms", "must be > 0"));
        }

        if self.discovery_interval_ms == 0 {
            return Err(invalid("discovery_interval_ms", "must be > 0"));
        }

        if self.write_queue_capacity == 0 {
            return Err(invalid("write_queue_capacity", "must be > 0"));
        }

        if let Some(pattern) = self
            .discovery_patterns
            .iter()
            .find(|p| p.keyword.is_empty() || p.device.is_empty())
        {
            return Err(invalid(
                "discovery_patterns",
                &format!("empty keyword or device in {:?}", pattern),
            ));
        }

        Ok(())
    }

    /// Device type a port belongs to, judged by its name and description
    pub fn match_port(&self, port_name: &str, description: &str) -> Option<&str> {
        let description = description.to_lowercase();
        if !self
            .vendor_keywords
            .iter()
            .any(|vendor| description.contains(&vendor.to_lowercase()))
        {
            return None;
        }

        let haystack = format!("{} {}", port_name.to_lowercase(), description);
        self.discovery_patterns
            .iter()
            .find(|pattern| haystack.contains(&pattern.keyword.to_lowercase()))
            .map(|pattern| pattern.device.as_str())
    }
}

fn invalid(key: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Platform config directory for Pitlink files, e.g. `~/.config/pitlink`
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = LinkSettings::default();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.poll_interval_ms, 0);
        assert_eq!(settings.hub_devices, vec!["base", "hub"]);
        assert!(settings.verify_checksum);
        assert!(!settings.dry_run);
        assert!(settings.validate().is_ok());
        assert!(LinkSettings::dry_run().dry_run);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: LinkSettings = toml::from_str("baud_rate = 9600\ndry_run = true\n").unwrap();
        assert_eq!(settings.baud_rate, 9600);
        assert!(settings.dry_run);
        assert_eq!(settings.write_queue_capacity, 64);
        assert!(!settings.discovery_patterns.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let settings = LinkSettings {
            write_queue_capacity: 0,
            ..LinkSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid setting 'write_queue_capacity': must be > 0"
        );
    }

    #[test]
    fn test_match_port() {
        let settings = LinkSettings::default();
        assert_eq!(
            settings.match_port("/dev/ttyACM0", "USB Gudsen MOZA R9 Base"),
            Some("base")
        );
        assert_eq!(
            settings.match_port("/dev/ttyACM1", "USB Gudsen MOZA SRP Pedals"),
            Some("pedals")
        );
        assert_eq!(
            settings.match_port("/dev/ttyACM2", "USB Gudsen MOZA HGP Shifter"),
            Some("hpattern")
        );
        assert_eq!(settings.match_port("/dev/ttyUSB0", "USB FTDI Pedals"), None);
        assert_eq!(settings.match_port("/dev/ttyACM3", "USB Gudsen Unknown"), None);
    }

    #[test]
    fn test_default_config_dir() {
        if let Some(dir) = default_config_dir() {
            assert!(dir.ends_with(CONFIG_DIR_NAME));
        }
    }
}
