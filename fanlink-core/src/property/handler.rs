//! Handlers fold a decoded value into the device state.

use tracing::{debug, info, trace};

use super::{DecodedValue, PropertyCode, TriState};
use crate::error::DecodeError;
use crate::state::{DeviceState, MAX_BRIGHTNESS, MAX_SPEED, MysteryLedger, Observation};
use crate::state::{RotationDirection, StateUpdate};

/// Plausible sensor ranges; anything outside is a decoding artefact.
const TEMPERATURE_RANGE: (f64, f64) = (-270.0, 100.0);
const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);

/// What to do with a successfully decoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    FanOn,
    FanDirection,
    FanSpeed,
    Whoosh,
    Temperature,
    Humidity,
    LightOn,
    Brightness,
    ColorTemperature,
    DimToWarm,
    Name,
    Model,
    Firmware,
    MacAddress,
    /// Understood but not acted on.
    Noop,
    /// Meaning unknown; tracked in the ledger and logged when it changes.
    Mystery,
}

impl Handler {
    pub fn handle(
        &self,
        code: PropertyCode,
        value: DecodedValue,
        state: &mut DeviceState,
        ledger: &mut MysteryLedger,
    ) -> Result<(), DecodeError> {
        let update = match (self, value) {
            (Self::FanOn, DecodedValue::Bool(on)) => StateUpdate::FanOn(on),
            (Self::FanDirection, DecodedValue::UInt8(v)) => StateUpdate::FanDirection(
                RotationDirection::from_wire(v).ok_or(DecodeError::InvalidValue {
                    kind: "rotation direction",
                    value: v,
                })?,
            ),
            (Self::FanSpeed, DecodedValue::UInt8(v)) => {
                check_range(v as f64, 0.0, MAX_SPEED as f64)?;
                StateUpdate::FanSpeed(v)
            }
            (Self::Whoosh, DecodedValue::Bool(on)) => StateUpdate::Whoosh(on),
            (Self::Temperature, DecodedValue::ScaledFraction(t)) => {
                check_range(t, TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1)?;
                StateUpdate::Temperature(t)
            }
            (Self::Humidity, DecodedValue::ScaledFraction(h)) => {
                check_range(h, HUMIDITY_RANGE.0, HUMIDITY_RANGE.1)?;
                StateUpdate::Humidity(h)
            }
            (Self::LightOn, DecodedValue::TriState(TriState::Off)) => StateUpdate::LightOn(false),
            (Self::LightOn, DecodedValue::TriState(TriState::On)) => StateUpdate::LightOn(true),
            (Self::LightOn, DecodedValue::TriState(TriState::Auto)) => {
                // occupancy decides; the next on/off report carries the truth
                debug!(%code, "light in auto mode");
                return Ok(());
            }
            (Self::Brightness, DecodedValue::UInt8(v)) => {
                check_range(v as f64, 0.0, MAX_BRIGHTNESS as f64)?;
                StateUpdate::Brightness(v)
            }
            (Self::ColorTemperature, DecodedValue::VarInt(kelvin)) => {
                StateUpdate::ColorTemperature(kelvin_to_mireds(kelvin)?)
            }
            (Self::DimToWarm, DecodedValue::Bool(on)) => StateUpdate::DimToWarm(on),
            (Self::Name, DecodedValue::Text(s)) => StateUpdate::Name(s),
            (Self::Model, DecodedValue::Text(s)) => StateUpdate::Model(s),
            (Self::Firmware, DecodedValue::Text(s)) => StateUpdate::Firmware(s),
            (Self::MacAddress, DecodedValue::Text(s)) => StateUpdate::MacAddress(s),
            (Self::Noop, value) => {
                trace!(%code, %value, "ignored property");
                return Ok(());
            }
            (Self::Mystery, value) => {
                observe_mystery(code, value, ledger);
                return Ok(());
            }
            (handler, value) => {
                return Err(DecodeError::WrongType {
                    expected: handler.expects(),
                    found: value.kind(),
                });
            }
        };

        state.apply(update);
        Ok(())
    }

    fn expects(&self) -> &'static str {
        match self {
            Self::FanOn | Self::Whoosh | Self::DimToWarm => "bool",
            Self::FanDirection | Self::FanSpeed | Self::Brightness => "uint8",
            Self::LightOn => "tri-state",
            Self::ColorTemperature => "varint",
            Self::Temperature | Self::Humidity => "scaled fraction",
            Self::Name | Self::Model | Self::Firmware | Self::MacAddress => "text",
            Self::Noop | Self::Mystery => "any",
        }
    }
}

/// `round(1_000_000 / kelvin)`.
pub(crate) fn kelvin_to_mireds(kelvin: u64) -> Result<u32, DecodeError> {
    if kelvin == 0 {
        return Err(DecodeError::OutOfRange {
            value: 0.0,
            min: 1.0,
            max: f64::MAX,
        });
    }
    Ok((1_000_000.0 / kelvin as f64).round() as u32)
}

fn check_range(value: f64, min: f64, max: f64) -> Result<(), DecodeError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(DecodeError::OutOfRange { value, min, max })
    }
}

fn observe_mystery(code: PropertyCode, value: DecodedValue, ledger: &mut MysteryLedger) {
    match ledger.observe(code, value.clone()) {
        Observation::First => debug!(%code, %value, "mystery property first seen"),
        Observation::Unchanged => {}
        Observation::Changed(previous) => {
            info!(%code, from = %previous, to = %value, "mystery property changed")
        }
    }
}
