//! Payload typing and byte conversion.
//!
//! Encoding never fails: a value that does not fit its payload kind becomes
//! an all-zero payload of the kind's width. Decoding returns `None` when
//! the bytes cannot represent the kind.

use std::fmt;

/// Payload layout of a command, resolved once when the registry loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Big-endian unsigned integer of exactly `width` bytes
    Integer { width: usize },
    /// Big-endian IEEE-754 single precision
    Float,
    /// `width` raw bytes, truncated or zero padded
    ByteArray { width: usize },
    /// Raw bytes surfaced as a lower-case hex string
    Hex { width: usize },
}

impl PayloadKind {
    /// Map a configuration type tag (`int`, `float`, `array`, `hex`) to a kind
    pub fn from_tag(tag: &str, width: usize) -> Option<Self> {
        match tag {
            "int" => Some(Self::Integer { width }),
            "float" => Some(Self::Float),
            "array" => Some(Self::ByteArray { width }),
            "hex" => Some(Self::Hex { width }),
            _ => None,
        }
    }

    /// Configuration type tag of this kind
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Integer { .. } => "int",
            Self::Float => "float",
            Self::ByteArray { .. } => "array",
            Self::Hex { .. } => "hex",
        }
    }

    /// Payload width in bytes
    pub fn width(&self) -> usize {
        match self {
            Self::Float => 4,
            Self::Integer { width } | Self::ByteArray { width } | Self::Hex { width } => *width,
        }
    }

    /// All-zero payload of this kind's width
    pub fn zeroed(&self) -> Vec<u8> {
        vec![0; self.width()]
    }
}

/// A decoded or to-be-encoded setting value
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Int(i64),
    Float(f32),
    Array(Vec<u8>),
    Hex(String),
}

impl SettingValue {
    /// Build an array value, clipping every element into a byte
    pub fn array_clipped<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        Self::Array(
            values
                .into_iter()
                .map(|v| u8::try_from(v.clamp(0, i64::from(u8::MAX))).unwrap_or(u8::MAX))
                .collect(),
        )
    }

    /// Parse user text into the value shape `kind` expects
    ///
    /// Arrays are comma separated numbers. Returns `None` if the text does
    /// not parse.
    pub fn parse(kind: PayloadKind, text: &str) -> Option<Self> {
        let text = text.trim();
        match kind {
            PayloadKind::Integer { .. } => text.parse().ok().map(Self::Int),
            PayloadKind::Float => text.parse().ok().map(Self::Float),
            PayloadKind::ByteArray { .. } => {
                let values: Option<Vec<i64>> = text
                    .split(',')
                    .map(|part| part.trim().parse().ok())
                    .collect();
                values.map(Self::array_clipped)
            }
            PayloadKind::Hex { .. } => Some(Self::Hex(text.to_ascii_lowercase())),
        }
    }

    /// Integer view of the value, if it has one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float view of the value, if it has one
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Array(bytes) => {
                let parts: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Hex(text) => write!(f, "{}", text),
        }
    }
}

/// Encode `value` as the payload bytes of `kind`
pub fn encode_payload(kind: PayloadKind, value: &SettingValue) -> Vec<u8> {
    let encoded = match (kind, value) {
        (PayloadKind::Integer { width }, SettingValue::Int(v)) => encode_integer(*v, width),
        (PayloadKind::Float, SettingValue::Float(v)) => Some(v.to_be_bytes().to_vec()),
        (PayloadKind::Float, SettingValue::Int(v)) => Some((*v as f32).to_be_bytes().to_vec()),
        (PayloadKind::ByteArray { width }, SettingValue::Array(bytes)) => {
            Some(fit_width(bytes.clone(), width))
        }
        (PayloadKind::Hex { width }, SettingValue::Hex(text)) => {
            hex::decode(text.trim()).ok().map(|bytes| fit_width(bytes, width))
        }
        _ => None,
    };

    encoded.unwrap_or_else(|| {
        tracing::warn!(
            "Value {} does not fit a {} payload of {} bytes, sending zeros",
            value,
            kind.tag(),
            kind.width()
        );
        kind.zeroed()
    })
}

/// Decode payload bytes of `kind`
pub fn decode_payload(kind: PayloadKind, data: &[u8]) -> Option<SettingValue> {
    match kind {
        PayloadKind::Integer { width } => {
            let bytes = data.get(..width)?;
            if width > 8 {
                return None;
            }
            let raw = bytes
                .iter()
                .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
            i64::try_from(raw).ok().map(SettingValue::Int)
        }
        PayloadKind::Float => {
            let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
            Some(SettingValue::Float(f32::from_be_bytes(bytes)))
        }
        PayloadKind::ByteArray { width } => Some(SettingValue::Array(
            data.iter().copied().take(width).collect(),
        )),
        PayloadKind::Hex { width } => {
            let end = width.min(data.len());
            Some(SettingValue::Hex(hex::encode(&data[..end])))
        }
    }
}

/// Truncate or zero-pad raw bytes to the payload width
fn fit_width(mut bytes: Vec<u8>, width: usize) -> Vec<u8> {
    bytes.resize(width, 0);
    bytes
}

fn encode_integer(value: i64, width: usize) -> Option<Vec<u8>> {
    let value = u64::try_from(value).ok()?;
    let bytes = value.to_be_bytes();
    if width >= bytes.len() {
        let mut out = vec![0; width - bytes.len()];
        out.extend_from_slice(&bytes);
        return Some(out);
    }

    let (high, low) = bytes.split_at(bytes.len() - width);
    if high.iter().any(|b| *b != 0) {
        return None;
    }
    Some(low.to_vec())
}
