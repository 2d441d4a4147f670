//! Value decoders. Pure functions from raw record bytes to a
//! [`DecodedValue`].

use std::fmt;

use crate::error::DecodeError;
use crate::varint;

/// A decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Bool(bool),
    TriState(TriState),
    UInt8(u8),
    VarInt(u64),
    Text(String),
    /// A varint divided by 100.
    ScaledFraction(f64),
    /// Bytes kept verbatim for a property nobody understands yet.
    OpaqueHex(Vec<u8>),
}

impl DecodedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::TriState(_) => "tri-state",
            Self::UInt8(_) => "uint8",
            Self::VarInt(_) => "varint",
            Self::Text(_) => "text",
            Self::ScaledFraction(_) => "scaled fraction",
            Self::OpaqueHex(_) => "opaque",
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::TriState(t) => write!(f, "{t}"),
            Self::UInt8(n) => write!(f, "{n}"),
            Self::VarInt(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::ScaledFraction(x) => write!(f, "{x:.2}"),
            Self::OpaqueHex(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Off / on / automatic, as used by the light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    Off,
    On,
    Auto,
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::On => f.write_str("on"),
            Self::Auto => f.write_str("auto"),
        }
    }
}

// ── ValueDecoder ─────────────────────────────────────────────────

/// How to decode the value bytes of one property family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDecoder {
    Bool,
    TriState,
    UInt8,
    VarInt,
    /// UTF-8 text starting `offset` bytes into the value. Plain strings carry
    /// a one-byte length prefix; strings nested in a sub-message carry three
    /// bytes (outer length, inner tag, inner length).
    Text { offset: usize },
    ScaledFraction,
    OpaqueHex,
}

impl ValueDecoder {
    pub fn decode(&self, raw: &[u8]) -> Result<DecodedValue, DecodeError> {
        let first = || raw.first().copied().ok_or(DecodeError::Empty);

        match self {
            Self::Bool => match first()? {
                0 => Ok(DecodedValue::Bool(false)),
                1 => Ok(DecodedValue::Bool(true)),
                value => Err(DecodeError::InvalidValue { kind: "bool", value }),
            },
            Self::TriState => match first()? {
                0 => Ok(DecodedValue::TriState(TriState::Off)),
                1 => Ok(DecodedValue::TriState(TriState::On)),
                2 => Ok(DecodedValue::TriState(TriState::Auto)),
                value => Err(DecodeError::InvalidValue {
                    kind: "tri-state",
                    value,
                }),
            },
            Self::UInt8 => Ok(DecodedValue::UInt8(first()?)),
            Self::VarInt => {
                first()?;
                Ok(DecodedValue::VarInt(varint::decode(raw)))
            }
            Self::Text { offset } => {
                let text = raw
                    .get(*offset..)
                    .ok_or(DecodeError::TextTooShort { offset: *offset })?;
                Ok(DecodedValue::Text(String::from_utf8_lossy(text).into_owned()))
            }
            Self::ScaledFraction => {
                first()?;
                Ok(DecodedValue::ScaledFraction(varint::decode(raw) as f64 / 100.0))
            }
            Self::OpaqueHex => Ok(DecodedValue::OpaqueHex(raw.to_vec())),
        }
    }
}
