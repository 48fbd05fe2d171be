//! # Command registry
//!
//! The immutable table of every known device's commands and addresses,
//! built once from a YAML document:
//!
//! ```yaml
//! message-start: 126
//! magic-value: 13
//! device-ids: { base: 19, pedals: 25, hub: -1 }
//! ids-to-names: { 19: base, 25: pedals }
//! commands:
//!   base:
//!     max-angle: { id: [23], read: 40, write: 41, bytes: 2, type: int }
//! ```
//!
//! A device address of `-1` marks the device absent from the address space.
//! Its commands still decode but it exposes no setting channels. A group of
//! `-1` marks a command unreadable or unwritable.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{Direction, PayloadKind};
use crate::error::{RegistryError, RegistryResult};

/// Address and group sentinel meaning "absent"
pub const ABSENT: i64 = -1;

/// Raw configuration document, as written on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryDocument {
    pub message_start: i64,
    pub magic_value: i64,
    #[serde(default)]
    pub device_ids: BTreeMap<String, i64>,
    #[serde(default)]
    pub ids_to_names: BTreeMap<i64, String>,
    #[serde(default)]
    pub commands: BTreeMap<String, BTreeMap<String, CommandDocument>>,
}

/// Raw command entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDocument {
    pub id: Vec<i64>,
    pub read: i64,
    pub write: i64,
    pub bytes: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One command of one device type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub ids: Vec<u8>,
    pub read_group: Option<u8>,
    pub write_group: Option<u8>,
    pub payload: PayloadKind,
}

impl CommandSpec {
    /// Group used for `direction`, `None` if the command cannot travel that way
    pub fn group(&self, direction: Direction) -> Option<u8> {
        match direction {
            Direction::Read => self.read_group,
            Direction::Write => self.write_group,
        }
    }

    pub fn is_readable(&self) -> bool {
        self.read_group.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.write_group.is_some()
    }
}

/// Validated, immutable command table
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRegistry {
    message_start: u8,
    magic_value: u8,
    device_ids: BTreeMap<String, Option<u8>>,
    ids_to_names: BTreeMap<u8, String>,
    commands: BTreeMap<String, BTreeMap<String, CommandSpec>>,
    /// Command device types, longest name first, for prefix resolution
    resolve_order: Vec<String>,
}

impl CommandRegistry {
    /// Validate a parsed document
    pub fn from_document(document: RegistryDocument) -> RegistryResult<Self> {
        let message_start = header_byte("message-start", document.message_start)?;
        let magic_value = header_byte("magic-value", document.magic_value)?;

        let mut device_ids = BTreeMap::new();
        for (device, address) in document.device_ids {
            let address = if address == ABSENT {
                None
            } else {
                Some(u8::try_from(address).map_err(|_| RegistryError::InvalidDevice {
                    device: device.clone(),
                    reason: format!("address {} does not fit in a byte", address),
                })?)
            };
            device_ids.insert(device, address);
        }

        let mut ids_to_names = BTreeMap::new();
        for (address, device) in document.ids_to_names {
            let address = u8::try_from(address).map_err(|_| RegistryError::InvalidDevice {
                device: device.clone(),
                reason: format!("reverse address {} does not fit in a byte", address),
            })?;
            ids_to_names.insert(address, device);
        }

        let mut commands = BTreeMap::new();
        for (device, entries) in document.commands {
            let mut specs = BTreeMap::new();
            for (setting, entry) in entries {
                let spec = command_spec(&device, &setting, entry)?;
                specs.insert(setting, spec);
            }
            commands.insert(device, specs);
        }

        let mut resolve_order: Vec<String> = commands.keys().cloned().collect();
        resolve_order.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        tracing::debug!(
            "Loaded command registry: {} device types, {} commands",
            commands.len(),
            commands.values().map(BTreeMap::len).sum::<usize>()
        );

        Ok(Self {
            message_start,
            magic_value,
            device_ids,
            ids_to_names,
            commands,
            resolve_order,
        })
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(text: &str) -> RegistryResult<Self> {
        let document: RegistryDocument = serde_yaml::from_str(text)?;
        Self::from_document(document)
    }

    /// Load and validate a YAML document from disk
    pub fn load(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        tracing::info!("Loading command registry from {}", path.display());
        Self::from_yaml_str(&text)
    }

    pub fn message_start(&self) -> u8 {
        self.message_start
    }

    pub fn magic_value(&self) -> u8 {
        self.magic_value
    }

    /// Address of `device`, `None` when unknown or absent
    pub fn device_address(&self, device: &str) -> Option<u8> {
        self.device_ids.get(device).copied().flatten()
    }

    /// Whether `device` is listed with a real address
    pub fn is_addressable(&self, device: &str) -> bool {
        self.device_address(device).is_some()
    }

    /// Device type answering at `address`
    pub fn device_name(&self, address: u8) -> Option<&str> {
        self.ids_to_names.get(&address).map(String::as_str)
    }

    /// Every device type with commands, in name order
    pub fn device_types(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// The full command table
    pub fn commands(&self) -> &BTreeMap<String, BTreeMap<String, CommandSpec>> {
        &self.commands
    }

    pub fn spec_for(&self, device: &str, setting: &str) -> Option<&CommandSpec> {
        self.commands.get(device)?.get(setting)
    }

    /// Split a full setting name into `(setting, device)`
    ///
    /// Longer device type names are tried first so that `wheel-...` never
    /// shadows a device called `wheel-base`.
    pub fn resolve<'a>(&'a self, full_name: &str) -> Option<(&'a str, &'a str)> {
        self.resolve_order.iter().find_map(|device| {
            let setting = full_name
                .strip_prefix(device.as_str())
                .and_then(|rest| rest.strip_prefix('-'))?;
            let (name, _) = self.commands.get(device)?.get_key_value(setting)?;
            Some((name.as_str(), device.as_str()))
        })
    }

    /// Channel names of every readable or writable setting of addressable devices
    pub fn setting_channels(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter(|(device, _)| self.is_addressable(device))
            .flat_map(|(device, specs)| {
                specs
                    .iter()
                    .filter(|(_, spec)| spec.is_readable() || spec.is_writable())
                    .map(move |(setting, _)| format!("{}-{}", device, setting))
            })
            .collect()
    }

    /// Command of `device` answering on `group` whose ids prefix `data`
    ///
    /// Read groups take precedence; write acknowledgements echo the write
    /// group. The longest matching id prefix wins.
    pub fn find_response_command<'a>(
        &'a self,
        device: &str,
        group: u8,
        data: &[u8],
    ) -> Option<(&'a str, &'a CommandSpec)> {
        let specs = self.commands.get(device)?;
        let best = |direction: Direction| {
            specs
                .iter()
                .filter(|(_, spec)| spec.group(direction) == Some(group))
                .filter(|(_, spec)| data.starts_with(&spec.ids))
                .max_by_key(|(_, spec)| spec.ids.len())
                .map(|(name, spec)| (name.as_str(), spec))
        };
        best(Direction::Read).or_else(|| best(Direction::Write))
    }

    /// Copy of this registry with `device` moved to `address`
    ///
    /// A reverse lookup entry for the device follows it to the new address.
    pub fn with_device_address(&self, device: &str, address: u8) -> Self {
        let mut next = self.clone();
        next.device_ids.insert(device.to_string(), Some(address));

        let had_reverse = next.ids_to_names.values().any(|name| name == device);
        if had_reverse {
            next.ids_to_names.retain(|_, name| name != device);
            next.ids_to_names.insert(address, device.to_string());
        }
        next
    }
}

fn header_byte(field: &'static str, value: i64) -> RegistryResult<u8> {
    u8::try_from(value).map_err(|_| RegistryError::InvalidHeader { field, value })
}

fn command_spec(device: &str, setting: &str, entry: CommandDocument) -> RegistryResult<CommandSpec> {
    let invalid = |reason: String| RegistryError::InvalidCommand {
        device: device.to_string(),
        setting: setting.to_string(),
        reason,
    };

    if entry.id.is_empty() {
        return Err(invalid("empty id".to_string()));
    }
    let ids = entry
        .id
        .iter()
        .map(|id| u8::try_from(*id).map_err(|_| invalid(format!("id byte {} out of range", id))))
        .collect::<RegistryResult<Vec<u8>>>()?;

    let group = |value: i64, label: &str| -> RegistryResult<Option<u8>> {
        if value == ABSENT {
            return Ok(None);
        }
        u8::try_from(value)
            .map(Some)
            .map_err(|_| invalid(format!("{} group {} out of range", label, value)))
    };
    let read_group = group(entry.read, "read")?;
    let write_group = group(entry.write, "write")?;

    let width = usize::try_from(entry.bytes)
        .map_err(|_| invalid(format!("negative payload width {}", entry.bytes)))?;
    let payload = PayloadKind::from_tag(&entry.kind, width)
        .ok_or_else(|| invalid(format!("unknown payload type '{}'", entry.kind)))?;

    Ok(CommandSpec {
        ids,
        read_group,
        write_group,
        payload,
    })
}
