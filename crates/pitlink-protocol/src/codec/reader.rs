//! Inbound stream reassembly.
//!
//! Serial reads split and merge frames arbitrarily. [`FrameReader`] buffers
//! the raw stream and hands back complete frame bodies in receipt order.

use super::checksum;

/// Smallest accepted length byte
pub const MIN_FRAME_LENGTH: u8 = 2;
/// Largest accepted length byte
pub const MAX_FRAME_LENGTH: u8 = 11;

/// Start, length, group, address and checksum bytes around ids+payload
const FRAME_OVERHEAD: usize = 5;

#[derive(Debug, Clone)]
pub struct FrameReader {
    start: u8,
    magic: u8,
    verify_checksum: bool,
    buffer: Vec<u8>,
}

impl FrameReader {
    /// Reader for frames opened by `start`, checksummed with `magic`
    pub fn new(start: u8, magic: u8) -> Self {
        Self {
            start,
            magic,
            verify_checksum: true,
            buffer: Vec::new(),
        }
    }

    /// Enable or disable checksum verification
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Feed a chunk, returning every frame body it completes
    ///
    /// A body is `[group, address, ids..., payload...]`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut bodies = Vec::new();

        loop {
            match self.buffer.iter().position(|b| *b == self.start) {
                Some(0) => {}
                Some(pos) => {
                    tracing::trace!("Skipping {} bytes before frame start", pos);
                    self.buffer.drain(..pos);
                }
                None => {
                    self.buffer.clear();
                    break;
                }
            }

            let Some(&length) = self.buffer.get(1) else {
                break;
            };
            if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&length) {
                tracing::trace!("Rejecting length byte {}", length);
                self.buffer.drain(..1);
                continue;
            }

            let total = usize::from(length) + FRAME_OVERHEAD;
            if self.buffer.len() < total {
                break;
            }

            let (frame, received) = self.buffer[..total].split_at(total - 1);
            if self.verify_checksum {
                let expected = checksum(frame, self.magic);
                if expected != received[0] {
                    tracing::warn!(
                        "Dropping frame with bad checksum {:#04x}, expected {:#04x}",
                        received[0],
                        expected
                    );
                    self.buffer.drain(..1);
                    continue;
                }
            }

            bodies.push(frame[2..].to_vec());
            self.buffer.drain(..total);
        }

        bodies
    }

    /// Bytes buffered towards an incomplete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
