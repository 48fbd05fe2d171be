//! # Pitlink Protocol
//!
//! Command registry and wire codec for the framed serial protocol spoken by
//! the wheelbase hub and its daisy-linked peripherals.
//!
//! - [`registry`]: the immutable command table loaded from YAML
//! - [`codec`]: payload conversion, frame construction, response decoding
//!   and stream reassembly
//! - [`bitwise`]: the bit helpers the response quirks are expressed with

pub mod bitwise;
pub mod codec;
pub mod error;
pub mod registry;

pub use codec::{
    checksum, decode_payload, encode_payload, parse_response, Command, DecodedSetting, Direction,
    FrameReader, PayloadKind, SettingValue,
};
pub use error::{CodecError, CodecResult, RegistryError, RegistryResult};
pub use registry::{CommandDocument, CommandRegistry, CommandSpec, RegistryDocument};
