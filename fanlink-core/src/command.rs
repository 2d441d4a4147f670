//! Outbound commands.
//!
//! Every settable property is written with the same envelope:
//!
//! ```text
//! C0 stuff(12 <outer> 12 <inner> 1A <plen> <code> <value>) C0
//! ```
//!
//! where `plen` counts the code and value bytes and each enclosing length
//! counts everything after it up to the closing delimiter. All three lengths
//! are varints.
//!
//! # Home shield
//!
//! Home-automation consumers tend to treat a reported `0%` as "device off"
//! and insist on jumping back to `100%` afterwards. Speed and brightness
//! therefore follow a small policy:
//!
//! * Setting `0` writes the matching "remembered" property as `1` and then
//!   the value `0`, and raises the actuator's shield.
//! * Setting `100` while the shield is raised writes the value `1` and lowers
//!   the shield. The fan comes back at its lowest step rather than full blast.
//! * While the shield is raised an inbound `0` is recorded but not published.
//!   Any inbound non-zero value lowers it.
//!
//! Each command also records its expected outcome in the
//! [`DeviceState`] without publishing it.

use serde::{Deserialize, Serialize};

use crate::error::FanError;
use crate::frame;
use crate::message::MESSAGE_MARKER;
use crate::property::{PropertyCode, codes};
use crate::state::{DeviceState, MAX_BRIGHTNESS, MAX_SPEED, RotationDirection, StateUpdate};
use crate::varint;

/// Sent once after the first successful connect.
pub const INIT_FRAME: [u8; 6] = [0xC0, 0x12, 0x02, 0x1A, 0x00, 0xC0];
/// Sent periodically while connected; the fan does not answer it.
pub const KEEPALIVE_FRAME: [u8; 8] = [0xC0, 0x12, 0x04, 0x1A, 0x02, 0x08, 0x03, 0xC0];

const RECORD_HEADER: u8 = 0x1A;

/// A complete, stuffed frame ready for the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame(Vec<u8>);

impl CommandFrame {
    pub fn init() -> Self {
        Self(INIT_FRAME.to_vec())
    }

    pub fn keepalive() -> Self {
        Self(KEEPALIVE_FRAME.to_vec())
    }

    /// Build the frame that writes `value` to the property `code`.
    pub fn property(code: PropertyCode, value: &[u8]) -> Self {
        let mut payload = code.to_bytes();
        payload.extend_from_slice(value);

        let mut inner = vec![RECORD_HEADER];
        inner.extend(varint::encode(payload.len() as u64));
        inner.extend(payload);

        let mut outer = vec![MESSAGE_MARKER];
        outer.extend(varint::encode(inner.len() as u64));
        outer.extend(inner);

        let mut body = vec![MESSAGE_MARKER];
        body.extend(varint::encode(outer.len() as u64));
        body.extend(outer);

        Self(frame::wrap(&body))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A change requested by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum FanCommand {
    FanOn(bool),
    Direction(RotationDirection),
    /// Percent, `0..=100`.
    RotationSpeed(u8),
    LightOn(bool),
    /// Percent, `0..=100`.
    Brightness(u8),
    /// Mireds.
    ColorTemperature(u32),
    Whoosh(bool),
    DimToWarm(bool),
}

impl FanCommand {
    /// Turn the command into frames, applying the home-shield policy and the
    /// optimistic state update.
    pub fn encode(self, state: &mut DeviceState) -> Result<Vec<CommandFrame>, FanError> {
        let frames = match self {
            Self::FanOn(on) => {
                state.assume(StateUpdate::FanOn(on));
                vec![CommandFrame::property(codes::FAN_ON, &[on as u8])]
            }
            Self::Direction(direction) => {
                state.assume(StateUpdate::FanDirection(direction));
                vec![CommandFrame::property(
                    codes::FAN_DIRECTION,
                    &[direction.to_wire()],
                )]
            }
            Self::RotationSpeed(percent) => {
                check_percent("rotation speed", percent)?;
                let shielded = state.fan().speed_shield;
                let (frames, speed) = shielded_write(
                    percent,
                    shielded,
                    codes::FAN_SPEED,
                    codes::FAN_SPEED_REMEMBERED,
                    speed_from_percent,
                );
                state.set_speed_shield(next_shield(percent, shielded));
                state.assume(StateUpdate::FanSpeed(speed));
                frames
            }
            Self::LightOn(on) => {
                state.assume(StateUpdate::LightOn(on));
                vec![CommandFrame::property(codes::LIGHT_ON, &[on as u8])]
            }
            Self::Brightness(percent) => {
                check_percent("brightness", percent)?;
                let shielded = state.light().brightness_shield;
                let (frames, brightness) = shielded_write(
                    percent,
                    shielded,
                    codes::LIGHT_BRIGHTNESS,
                    codes::BRIGHTNESS_REMEMBERED,
                    |p| p,
                );
                state.set_brightness_shield(next_shield(percent, shielded));
                state.assume(StateUpdate::Brightness(brightness));
                frames
            }
            Self::ColorTemperature(mireds) => {
                if mireds == 0 {
                    return Err(FanError::InvalidCommand(
                        "color temperature of 0 mireds".into(),
                    ));
                }
                let kelvin = (1_000_000.0 / mireds as f64).round() as u64;
                state.assume(StateUpdate::ColorTemperature(mireds));
                vec![CommandFrame::property(
                    codes::COLOR_TEMPERATURE,
                    &varint::encode(kelvin),
                )]
            }
            Self::Whoosh(on) => {
                state.assume(StateUpdate::Whoosh(on));
                vec![CommandFrame::property(codes::WHOOSH, &[on as u8])]
            }
            Self::DimToWarm(on) => {
                state.assume(StateUpdate::DimToWarm(on));
                vec![CommandFrame::property(codes::DIM_TO_WARM, &[on as u8])]
            }
        };
        Ok(frames)
    }
}

/// Frames for a shield-aware actuator, and the internal value they set.
fn shielded_write(
    percent: u8,
    shielded: bool,
    code: PropertyCode,
    remembered: PropertyCode,
    scale: impl Fn(u8) -> u8,
) -> (Vec<CommandFrame>, u8) {
    match percent {
        0 => (
            vec![
                CommandFrame::property(remembered, &[1]),
                CommandFrame::property(code, &[0]),
            ],
            0,
        ),
        100 if shielded => (vec![CommandFrame::property(code, &[1])], 1),
        p => {
            let value = scale(p);
            (vec![CommandFrame::property(code, &[value])], value)
        }
    }
}

fn next_shield(percent: u8, shielded: bool) -> bool {
    match percent {
        0 => true,
        100 => false,
        _ => shielded,
    }
}

fn check_percent(what: &str, percent: u8) -> Result<(), FanError> {
    if percent > MAX_BRIGHTNESS {
        return Err(FanError::InvalidCommand(format!(
            "{what} {percent}% exceeds 100%"
        )));
    }
    Ok(())
}

/// Map a percentage onto the fan's `1..=7` scale, `0` staying `0`.
pub fn speed_from_percent(percent: u8) -> u8 {
    let percent = percent.min(100) as u16;
    (percent * MAX_SPEED as u16).div_ceil(100) as u8
}

/// The percentage shown for an internal speed step.
pub fn speed_to_percent(speed: u8) -> u8 {
    let speed = speed.min(MAX_SPEED) as u16;
    (speed * 100 / MAX_SPEED as u16) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Envelope, decode_frame};

    fn bytes(frames: &[CommandFrame]) -> Vec<&[u8]> {
        frames.iter().map(CommandFrame::as_bytes).collect()
    }

    #[test]
    fn fan_on_matches_known_frame() {
        let mut state = DeviceState::new();
        let frames = FanCommand::FanOn(true).encode(&mut state).unwrap();
        assert_eq!(
            bytes(&frames),
            vec![&[0xC0, 0x12, 0x07, 0x12, 0x05, 0x1A, 0x03, 0xD8, 0x02, 0x01, 0xC0][..]]
        );
        assert!(state.fan().on);
        assert!(state.take_updates().is_empty());
    }

    #[test]
    fn speed_zero_writes_remembered_then_zero() {
        let mut state = DeviceState::new();
        let frames = FanCommand::RotationSpeed(0).encode(&mut state).unwrap();
        assert_eq!(
            bytes(&frames),
            vec![
                &[0xC0, 0x12, 0x07, 0x12, 0x05, 0x1A, 0x03, 0xF8, 0x02, 0x01, 0xC0][..],
                &[0xC0, 0x12, 0x07, 0x12, 0x05, 0x1A, 0x03, 0xF0, 0x02, 0x00, 0xC0][..],
            ]
        );
        assert!(state.fan().speed_shield);
        assert_eq!(state.fan().speed, 0);
    }

    #[test]
    fn speed_hundred_while_shielded_writes_one() {
        let mut state = DeviceState::new();
        FanCommand::RotationSpeed(0).encode(&mut state).unwrap();
        let frames = FanCommand::RotationSpeed(100).encode(&mut state).unwrap();
        assert_eq!(
            bytes(&frames),
            vec![&[0xC0, 0x12, 0x07, 0x12, 0x05, 0x1A, 0x03, 0xF0, 0x02, 0x01, 0xC0][..]]
        );
        assert!(!state.fan().speed_shield);
        assert_eq!(state.fan().speed, 1);
    }

    #[test]
    fn speed_hundred_unshielded_is_full_speed() {
        let mut state = DeviceState::new();
        let frames = FanCommand::RotationSpeed(100).encode(&mut state).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes()[9], MAX_SPEED);
    }

    #[test]
    fn brightness_follows_shield_policy() {
        let mut state = DeviceState::new();
        let frames = FanCommand::Brightness(0).encode(&mut state).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].as_bytes()[7..10], &[0xB0, 0x04, 0x01]);
        assert!(state.light().brightness_shield);

        let frames = FanCommand::Brightness(40).encode(&mut state).unwrap();
        assert_eq!(&frames[0].as_bytes()[7..10], &[0xA8, 0x04, 40]);
        assert!(state.light().brightness_shield);

        FanCommand::Brightness(100).encode(&mut state).unwrap();
        assert!(!state.light().brightness_shield);
    }

    #[test]
    fn percent_above_hundred_is_rejected() {
        let mut state = DeviceState::new();
        assert!(matches!(
            FanCommand::Brightness(101).encode(&mut state),
            Err(FanError::InvalidCommand(_))
        ));
        assert_eq!(state.light().brightness, 0);
    }

    #[test]
    fn color_temperature_is_varint_kelvin() {
        let mut state = DeviceState::new();
        let frames = FanCommand::ColorTemperature(370).encode(&mut state).unwrap();
        assert_eq!(
            bytes(&frames),
            vec![&[0xC0, 0x12, 0x08, 0x12, 0x06, 0x1A, 0x04, 0xB8, 0x04, 0x8F, 0x15, 0xC0][..]]
        );
        assert_eq!(state.light().color_temperature, Some(370));
        assert!(FanCommand::ColorTemperature(0).encode(&mut state).is_err());
    }

    #[test]
    fn color_temperature_payload_is_stuffed() {
        // 248 mireds -> 4032 K -> varint C0 1F
        let mut state = DeviceState::new();
        let frames = FanCommand::ColorTemperature(248).encode(&mut state).unwrap();
        let expected = [
            0xC0, 0x12, 0x08, 0x12, 0x06, 0x1A, 0x04, 0xB8, 0x04, 0xDB, 0xDC, 0x1F, 0xC0,
        ];
        assert_eq!(bytes(&frames), vec![&expected[..]]);

        let message = decode_frame(frames[0].as_bytes()).unwrap();
        assert_eq!(message.envelope, Envelope::Command);
        assert_eq!(message.records[0].value, vec![0xC0, 0x1F]);
    }

    #[test]
    fn fixed_frames() {
        assert_eq!(CommandFrame::init().as_bytes(), &INIT_FRAME);
        assert_eq!(CommandFrame::keepalive().as_bytes(), &KEEPALIVE_FRAME);
    }

    #[test]
    fn speed_scale() {
        assert_eq!(speed_from_percent(0), 0);
        assert_eq!(speed_from_percent(1), 1);
        assert_eq!(speed_from_percent(14), 1);
        assert_eq!(speed_from_percent(15), 2);
        assert_eq!(speed_from_percent(100), 7);
        assert_eq!(speed_to_percent(7), 100);
        assert_eq!(speed_to_percent(0), 0);
    }

    #[test]
    fn commands_deserialize_from_json_shape() {
        let cmd: FanCommand =
            serde_json::from_str(r#"{"command":"rotation_speed","value":50}"#).unwrap();
        assert_eq!(cmd, FanCommand::RotationSpeed(50));
    }
}
