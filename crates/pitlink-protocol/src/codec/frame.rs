//! Outbound frame construction.

use super::{encode_payload, Direction, SettingValue};
use crate::error::{CodecError, CodecResult};
use crate::registry::CommandSpec;

/// Byte sum of `data` plus `magic`, modulo 256
pub fn checksum(data: &[u8], magic: u8) -> u8 {
    data.iter().fold(magic, |acc, byte| acc.wrapping_add(*byte))
}

/// A command addressed to one device, ready to be framed
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    spec: CommandSpec,
    device_address: u8,
    payload: Vec<u8>,
}

impl Command {
    /// Command with an all-zero payload, as sent by read requests
    pub fn new(spec: CommandSpec, device_address: u8) -> Self {
        let payload = spec.payload.zeroed();
        Self {
            spec,
            device_address,
            payload,
        }
    }

    /// Command carrying `value` encoded per the command's payload kind
    pub fn with_value(spec: CommandSpec, device_address: u8, value: &SettingValue) -> Self {
        let payload = encode_payload(spec.payload, value);
        Self {
            spec,
            device_address,
            payload,
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of id and payload bytes, the value of the length byte
    pub fn length(&self) -> usize {
        self.spec.ids.len() + self.payload.len()
    }

    /// Build the complete frame for `direction`
    pub fn prepare_message(&self, start: u8, direction: Direction, magic: u8) -> CodecResult<Vec<u8>> {
        let group = self
            .spec
            .group(direction)
            .ok_or(CodecError::MissingGroup { direction })?;
        let len = self.length();
        let length = u8::try_from(len).map_err(|_| CodecError::FrameTooLong { len })?;

        let mut message = Vec::with_capacity(len + 5);
        message.push(start);
        message.push(length);
        message.push(group);
        message.push(self.device_address);
        message.extend_from_slice(&self.spec.ids);
        message.extend_from_slice(&self.payload);
        message.push(checksum(&message, magic));
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PayloadKind;

    fn ffb_strength() -> CommandSpec {
        CommandSpec {
            ids: vec![0x02, 0x03],
            read_group: Some(11),
            write_group: Some(21),
            payload: PayloadKind::Integer { width: 1 },
        }
    }

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[1, 2, 3], 0), 6);
        assert_eq!(checksum(&[10, 20], 100), 130);
        assert_eq!(checksum(&[200, 200], 0), 144);
        assert_eq!(checksum(b"", 50), 50);
    }

    #[test]
    fn test_read_message_layout() {
        let cmd = Command::new(ffb_strength(), 0x10);
        assert_eq!(cmd.length(), 3);

        let msg = cmd.prepare_message(0xAA, Direction::Read, 0).unwrap();
        assert_eq!(msg.len(), 8);
        assert_eq!(msg[0], 0xAA);
        assert_eq!(msg[1], 3);
        assert_eq!(&msg[2..6], &[11, 0x10, 0x02, 0x03]);
        assert_eq!(msg[6], 0);
        let expected = checksum(&msg[..msg.len() - 1], 0);
        assert_eq!(msg[msg.len() - 1], expected);
    }

    #[test]
    fn test_write_message_uses_write_group() {
        let cmd = Command::with_value(ffb_strength(), 0x10, &SettingValue::Int(80));
        let msg = cmd.prepare_message(0xAA, Direction::Write, 0).unwrap();
        assert_eq!(msg[2], 21);
        assert_eq!(msg[6], 80);
    }

    #[test]
    fn test_magic_value_in_checksum() {
        let cmd = Command::new(ffb_strength(), 0x10);
        let msg = cmd.prepare_message(0xAA, Direction::Read, 42).unwrap();
        let sum: u32 = msg[..msg.len() - 1].iter().map(|b| u32::from(*b)).sum();
        assert_eq!(u32::from(msg[msg.len() - 1]), (sum + 42) % 256);
    }

    #[test]
    fn test_missing_group() {
        let mut spec = ffb_strength();
        spec.write_group = None;
        let cmd = Command::with_value(spec, 0x10, &SettingValue::Int(1));
        assert_eq!(
            cmd.prepare_message(0xAA, Direction::Write, 0),
            Err(CodecError::MissingGroup {
                direction: Direction::Write
            })
        );
    }

    #[test]
    fn test_frame_too_long() {
        let spec = CommandSpec {
            ids: vec![1],
            read_group: Some(1),
            write_group: None,
            payload: PayloadKind::ByteArray { width: 300 },
        };
        let cmd = Command::new(spec, 0x10);
        assert_eq!(
            cmd.prepare_message(0xAA, Direction::Read, 0),
            Err(CodecError::FrameTooLong { len: 301 })
        );
    }
}
