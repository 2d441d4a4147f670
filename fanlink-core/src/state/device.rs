//! Per-connection snapshot of what the fan last told us.
//!
//! Inbound values arrive through [`DeviceState::apply`], which records them
//! and queues a [`StateUpdate`] for the consumer. Outbound commands record
//! their optimistic result through [`DeviceState::assume`], which publishes
//! nothing: the consumer asked for the change and already shows it.
//!
//! Invariants: `speed <= MAX_SPEED`, `brightness <= MAX_BRIGHTNESS`.

use serde::{Deserialize, Serialize};

/// Highest step on the fan's internal speed scale.
pub const MAX_SPEED: u8 = 7;
/// Highest brightness percentage.
pub const MAX_BRIGHTNESS: u8 = 100;

// ── Enums ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationDirection {
    #[default]
    Forward,
    Reverse,
}

impl RotationDirection {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Forward),
            1 => Some(Self::Reverse),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Forward => 0,
            Self::Reverse => 1,
        }
    }
}

/// One field of the device state changed. This is the only thing the
/// external accessory layer ever receives from a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum StateUpdate {
    FanOn(bool),
    FanDirection(RotationDirection),
    /// Internal scale, `0..=7`.
    FanSpeed(u8),
    Whoosh(bool),
    LightOn(bool),
    /// Percent, `0..=100`.
    Brightness(u8),
    /// Mireds.
    ColorTemperature(u32),
    DimToWarm(bool),
    /// Degrees Celsius.
    Temperature(f64),
    /// Percent relative humidity.
    Humidity(f64),
    Name(String),
    Model(String),
    Firmware(String),
    MacAddress(String),
}

// ── Aggregates ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanState {
    pub on: bool,
    pub direction: RotationDirection,
    pub speed: u8,
    /// Set after the consumer asked for speed 0; see the module docs of
    /// [`command`](crate::command).
    pub speed_shield: bool,
    pub whoosh: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightState {
    pub on: bool,
    pub brightness: u8,
    pub brightness_shield: bool,
    /// Mireds.
    pub color_temperature: Option<u32>,
    pub dim_to_warm: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub mac_address: Option<String>,
}

/// Everything known about one fan, owned by its connection task.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    fan: FanState,
    light: LightState,
    temperature: Option<f64>,
    humidity: Option<f64>,
    info: DeviceInfo,
    pending: Vec<StateUpdate>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fan(&self) -> &FanState {
        &self.fan
    }

    pub fn light(&self) -> &LightState {
        &self.light
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Record a value reported by the fan and queue it for the consumer.
    ///
    /// A zero speed or brightness on a shielded actuator is recorded but not
    /// published. A non-zero value lifts the shield.
    pub(crate) fn apply(&mut self, update: StateUpdate) {
        let publish = match update {
            StateUpdate::FanSpeed(0) => !self.fan.speed_shield,
            StateUpdate::FanSpeed(_) => {
                self.fan.speed_shield = false;
                true
            }
            StateUpdate::Brightness(0) => !self.light.brightness_shield,
            StateUpdate::Brightness(_) => {
                self.light.brightness_shield = false;
                true
            }
            _ => true,
        };

        self.store(&update);
        if publish {
            self.pending.push(update);
        }
    }

    /// Record the expected result of a command before the fan confirms it.
    pub(crate) fn assume(&mut self, update: StateUpdate) {
        self.store(&update);
    }

    pub(crate) fn set_speed_shield(&mut self, on: bool) {
        self.fan.speed_shield = on;
    }

    pub(crate) fn set_brightness_shield(&mut self, on: bool) {
        self.light.brightness_shield = on;
    }

    /// Take the updates queued since the last call, oldest first.
    pub fn take_updates(&mut self) -> Vec<StateUpdate> {
        std::mem::take(&mut self.pending)
    }

    fn store(&mut self, update: &StateUpdate) {
        match update {
            StateUpdate::FanOn(on) => self.fan.on = *on,
            StateUpdate::FanDirection(d) => self.fan.direction = *d,
            StateUpdate::FanSpeed(s) => self.fan.speed = (*s).min(MAX_SPEED),
            StateUpdate::Whoosh(on) => self.fan.whoosh = Some(*on),
            StateUpdate::LightOn(on) => self.light.on = *on,
            StateUpdate::Brightness(b) => self.light.brightness = (*b).min(MAX_BRIGHTNESS),
            StateUpdate::ColorTemperature(m) => self.light.color_temperature = Some(*m),
            StateUpdate::DimToWarm(on) => self.light.dim_to_warm = Some(*on),
            StateUpdate::Temperature(t) => self.temperature = Some(*t),
            StateUpdate::Humidity(h) => self.humidity = Some(*h),
            StateUpdate::Name(s) => self.info.name = Some(s.clone()),
            StateUpdate::Model(s) => self.info.model = Some(s.clone()),
            StateUpdate::Firmware(s) => self.info.firmware = Some(s.clone()),
            StateUpdate::MacAddress(s) => self.info.mac_address = Some(s.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_records_and_queues() {
        let mut state = DeviceState::new();
        state.apply(StateUpdate::FanOn(true));
        state.apply(StateUpdate::Brightness(40));
        assert!(state.fan().on);
        assert_eq!(state.light().brightness, 40);
        assert_eq!(
            state.take_updates(),
            vec![StateUpdate::FanOn(true), StateUpdate::Brightness(40)]
        );
        assert!(state.take_updates().is_empty());
    }

    #[test]
    fn assume_does_not_publish() {
        let mut state = DeviceState::new();
        state.assume(StateUpdate::FanSpeed(3));
        assert_eq!(state.fan().speed, 3);
        assert!(state.take_updates().is_empty());
    }

    #[test]
    fn shielded_zero_is_recorded_but_silent() {
        let mut state = DeviceState::new();
        state.set_speed_shield(true);
        state.apply(StateUpdate::FanSpeed(0));
        assert_eq!(state.fan().speed, 0);
        assert!(state.take_updates().is_empty());

        state.apply(StateUpdate::FanSpeed(2));
        assert!(!state.fan().speed_shield);
        assert_eq!(state.take_updates(), vec![StateUpdate::FanSpeed(2)]);
    }

    #[test]
    fn unshielded_zero_is_published() {
        let mut state = DeviceState::new();
        state.apply(StateUpdate::Brightness(0));
        assert_eq!(state.take_updates(), vec![StateUpdate::Brightness(0)]);
    }

    #[test]
    fn store_clamps_to_invariants() {
        let mut state = DeviceState::new();
        state.assume(StateUpdate::FanSpeed(42));
        state.assume(StateUpdate::Brightness(250));
        assert_eq!(state.fan().speed, MAX_SPEED);
        assert_eq!(state.light().brightness, MAX_BRIGHTNESS);
    }

    #[test]
    fn direction_wire_values() {
        assert_eq!(RotationDirection::from_wire(1), Some(RotationDirection::Reverse));
        assert_eq!(RotationDirection::from_wire(9), None);
        assert_eq!(RotationDirection::Reverse.to_wire(), 1);
    }
}
