//! # Wire codec
//!
//! Turns registry commands into wire frames and wire frames back into
//! named setting values.
//!
//! ```text
//! [start][length][group][address][ids...][payload...][checksum]
//! ```
//!
//! `length` counts the id and payload bytes. The checksum is the byte sum of
//! everything before it plus the registry's magic value. Devices answer with
//! bit 7 of the group toggled and the address nibbles swapped.

mod frame;
mod payload;
mod reader;
mod response;

use std::fmt;

pub use frame::*;
pub use payload::*;
pub use reader::*;
pub use response::*;

/// Which group of a command a frame travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}
