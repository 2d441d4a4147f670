//! The immutable, process-wide property table.

use std::collections::HashMap;
use std::sync::LazyLock;

use tracing::trace;

use super::{Handler, PropertyCode, ValueDecoder, codes};
use crate::error::FanError;
use crate::message::PropertyRecord;
use crate::state::{DeviceState, MysteryLedger};

/// One row of the property table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub code: PropertyCode,
    pub name: &'static str,
    pub decoder: ValueDecoder,
    pub handler: Handler,
}

const fn row(
    code: PropertyCode,
    name: &'static str,
    decoder: ValueDecoder,
    handler: Handler,
) -> PropertyDescriptor {
    PropertyDescriptor {
        code,
        name,
        decoder,
        handler,
    }
}

#[rustfmt::skip]
const KNOWN: [PropertyDescriptor; 16] = [
    // fan
    row(codes::FAN_ON, "fan on", ValueDecoder::Bool, Handler::FanOn),
    row(codes::FAN_DIRECTION, "fan direction", ValueDecoder::UInt8, Handler::FanDirection),
    row(codes::FAN_SPEED, "fan speed", ValueDecoder::UInt8, Handler::FanSpeed),
    row(codes::FAN_SPEED_REMEMBERED, "fan speed remembered", ValueDecoder::UInt8, Handler::Noop),
    row(codes::WHOOSH, "whoosh", ValueDecoder::Bool, Handler::Whoosh),
    // sensors
    row(codes::TEMPERATURE, "temperature", ValueDecoder::ScaledFraction, Handler::Temperature),
    row(codes::HUMIDITY, "humidity", ValueDecoder::ScaledFraction, Handler::Humidity),
    // light
    row(codes::LIGHT_ON, "light on", ValueDecoder::TriState, Handler::LightOn),
    row(codes::LIGHT_BRIGHTNESS, "light brightness", ValueDecoder::UInt8, Handler::Brightness),
    row(codes::BRIGHTNESS_REMEMBERED, "brightness remembered", ValueDecoder::UInt8, Handler::Noop),
    row(codes::COLOR_TEMPERATURE, "color temperature", ValueDecoder::VarInt,
        Handler::ColorTemperature),
    row(codes::DIM_TO_WARM, "dim to warm", ValueDecoder::Bool, Handler::DimToWarm),
    // device info
    row(codes::NAME, "name", ValueDecoder::Text { offset: 1 }, Handler::Name),
    row(codes::MODEL, "model", ValueDecoder::Text { offset: 1 }, Handler::Model),
    row(codes::FIRMWARE, "firmware", ValueDecoder::Text { offset: 3 }, Handler::Firmware),
    row(codes::MAC_ADDRESS, "mac address", ValueDecoder::Text { offset: 1 }, Handler::MacAddress),
];

static REGISTRY: LazyLock<PropertyRegistry> = LazyLock::new(PropertyRegistry::build);

/// The shared property table.
pub fn registry() -> &'static PropertyRegistry {
    &REGISTRY
}

/// Lookup from property code to descriptor. Built once, never mutated.
#[derive(Debug)]
pub struct PropertyRegistry {
    table: HashMap<PropertyCode, PropertyDescriptor>,
}

impl PropertyRegistry {
    fn build() -> Self {
        let mystery = codes::MYSTERY
            .iter()
            .map(|&code| row(code, "mystery", ValueDecoder::OpaqueHex, Handler::Mystery));

        let table = KNOWN
            .iter()
            .copied()
            .chain(mystery)
            .map(|d| (d.code, d))
            .collect();
        Self { table }
    }

    pub fn get(&self, code: PropertyCode) -> Option<&PropertyDescriptor> {
        self.table.get(&code)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Decode one record and run its handler.
    ///
    /// Unknown codes and undecodable values come back as errors for the
    /// caller to log; the state is untouched in both cases.
    pub fn dispatch(
        &self,
        record: &PropertyRecord,
        state: &mut DeviceState,
        ledger: &mut MysteryLedger,
    ) -> Result<(), FanError> {
        let code = record.code;
        let descriptor = self.get(code).ok_or(FanError::UnknownPropertyCode(code))?;

        let value = descriptor
            .decoder
            .decode(&record.value)
            .map_err(|source| FanError::ValueDecode { code, source })?;
        trace!(%code, name = descriptor.name, %value, "property");

        descriptor
            .handler
            .handle(code, value, state, ledger)
            .map_err(|source| FanError::ValueDecode { code, source })
    }
}
