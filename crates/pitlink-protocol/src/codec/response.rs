//! Inbound response decoding.

use std::ops::RangeInclusive;

use super::decode_payload;
use super::SettingValue;
use crate::bitwise::{swap_nibbles, toggle_bit};
use crate::registry::CommandRegistry;

/// Bit of the group byte a device toggles when answering
pub const RESPONSE_GROUP_BIT: u32 = 7;

/// Groups always attributed to the wheel, whichever device answered
pub const WHEEL_TELEMETRY_GROUPS: RangeInclusive<u8> = 63..=66;

/// Group always attributed to the hub
pub const HUB_GROUP: u8 = 100;

pub const WHEEL_DEVICE: &str = "wheel";
pub const HUB_DEVICE: &str = "hub";

/// A response decoded into a named setting value
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSetting {
    /// Channel name, `"{device}-{setting}"`
    pub name: String,
    pub device: String,
    pub setting: String,
    pub value: SettingValue,
}

/// Device type a decoded group is attributed to, given the address owner
pub fn attributed_device(group: u8, address_owner: &str) -> &str {
    if WHEEL_TELEMETRY_GROUPS.contains(&group) {
        WHEEL_DEVICE
    } else if group == HUB_GROUP {
        HUB_DEVICE
    } else {
        address_owner
    }
}

/// Decode a frame body `[group, address, ids..., payload...]`
///
/// Returns `None` when the answering address is unknown, no command of the
/// attributed device matches, or the payload is short. Such frames are
/// dropped, never retried.
pub fn parse_response(
    body: &[u8],
    requesting_device: &str,
    registry: &CommandRegistry,
) -> Option<DecodedSetting> {
    let (&raw_group, rest) = body.split_first()?;
    let (&raw_address, data) = rest.split_first()?;

    let group = toggle_bit(raw_group, RESPONSE_GROUP_BIT);
    let address = swap_nibbles(raw_address);

    let Some(owner) = registry.device_name(address) else {
        tracing::debug!(
            "Dropping response on {} link from unknown address {:#04x}",
            requesting_device,
            address
        );
        return None;
    };
    let device = attributed_device(group, owner);

    let (setting, spec) = registry.find_response_command(device, group, data)?;
    let value = decode_payload(spec.payload, &data[spec.ids.len()..])?;

    Some(DecodedSetting {
        name: format!("{}-{}", device, setting),
        device: device.to_string(),
        setting: setting.to_string(),
        value,
    })
}
