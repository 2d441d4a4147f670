//! Property codes and the table that gives them meaning.
//!
//! A parsed message is a list of `(code, raw value)` records. The
//! [`PropertyRegistry`] maps each code to a [`ValueDecoder`] that turns the
//! raw bytes into a [`DecodedValue`], and a [`Handler`] that folds the value
//! into the connection's [`DeviceState`](crate::state::DeviceState).

use std::fmt;

mod decode;
mod handler;
mod table;

pub use decode::{DecodedValue, TriState, ValueDecoder};
pub use handler::Handler;
pub use table::{PropertyDescriptor, PropertyRegistry, registry};

/// Record field prefixes that carry a one-byte property code.
pub const SHORT_CODE_PREFIXES: [u8; 2] = [0x70, 0x78];

// ── PropertyCode ─────────────────────────────────────────────────

/// A one or two byte property code, packed into a `u16`.
///
/// One-byte codes occupy the low byte with a zero high byte. Two-byte codes
/// never start with `0x00` on the wire, so the packing is unambiguous.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyCode(u16);

impl PropertyCode {
    pub const fn single(b: u8) -> Self {
        Self(b as u16)
    }

    pub const fn pair(hi: u8, lo: u8) -> Self {
        Self(((hi as u16) << 8) | lo as u16)
    }

    /// Split the leading code off a record's fields.
    ///
    /// Returns the code and its width in bytes, or `None` when the fields are
    /// too short to hold one.
    pub fn split(fields: &[u8]) -> Option<(Self, usize)> {
        let &first = fields.first()?;
        if SHORT_CODE_PREFIXES.contains(&first) {
            Some((Self::single(first), 1))
        } else {
            let &second = fields.get(1)?;
            Some((Self::pair(first, second), 2))
        }
    }

    pub fn is_single(&self) -> bool {
        self.0 <= 0xFF
    }

    /// The code as it appears on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let [hi, lo] = self.0.to_be_bytes();
        if self.is_single() { vec![lo] } else { vec![hi, lo] }
    }
}

impl fmt::Display for PropertyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [hi, lo] = self.0.to_be_bytes();
        if self.is_single() {
            write!(f, "{lo:#04x}")
        } else {
            write!(f, "{hi:#04x}, {lo:#04x}")
        }
    }
}

impl fmt::Debug for PropertyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyCode({self})")
    }
}

// ── Known codes ──────────────────────────────────────────────────

/// Codes with an established meaning, shared by the registry and the
/// command encoder.
pub mod codes {
    use super::PropertyCode;

    pub const FAN_ON: PropertyCode = PropertyCode::pair(0xd8, 0x02);
    pub const FAN_DIRECTION: PropertyCode = PropertyCode::pair(0xe0, 0x02);
    pub const FAN_SPEED: PropertyCode = PropertyCode::pair(0xf0, 0x02);
    pub const FAN_SPEED_REMEMBERED: PropertyCode = PropertyCode::pair(0xf8, 0x02);
    pub const WHOOSH: PropertyCode = PropertyCode::pair(0x88, 0x03);

    pub const TEMPERATURE: PropertyCode = PropertyCode::pair(0xb8, 0x03);
    pub const HUMIDITY: PropertyCode = PropertyCode::pair(0xc0, 0x03);

    pub const LIGHT_ON: PropertyCode = PropertyCode::pair(0xa0, 0x04);
    pub const LIGHT_BRIGHTNESS: PropertyCode = PropertyCode::pair(0xa8, 0x04);
    pub const BRIGHTNESS_REMEMBERED: PropertyCode = PropertyCode::pair(0xb0, 0x04);
    pub const COLOR_TEMPERATURE: PropertyCode = PropertyCode::pair(0xb8, 0x04);
    pub const DIM_TO_WARM: PropertyCode = PropertyCode::pair(0xe8, 0x04);

    pub const NAME: PropertyCode = PropertyCode::pair(0xd2, 0x02);
    pub const MODEL: PropertyCode = PropertyCode::pair(0x82, 0x01);
    pub const FIRMWARE: PropertyCode = PropertyCode::pair(0xa2, 0x05);
    pub const MAC_ADDRESS: PropertyCode = PropertyCode::pair(0xaa, 0x05);

    /// Codes seen on the wire whose meaning is still unknown.
    pub const MYSTERY: [PropertyCode; 6] = [
        PropertyCode::single(0x70),
        PropertyCode::single(0x78),
        PropertyCode::pair(0xd0, 0x03),
        PropertyCode::pair(0xe0, 0x03),
        PropertyCode::pair(0x98, 0x05),
        PropertyCode::pair(0xa8, 0x02),
    ];
}
