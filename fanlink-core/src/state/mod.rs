pub mod connection;
mod device;
mod ledger;

pub use connection::ConnectionPhase;
pub use device::{
    DeviceInfo, DeviceState, FanState, LightState, MAX_BRIGHTNESS, MAX_SPEED, RotationDirection,
    StateUpdate,
};
pub use ledger::{MysteryLedger, Observation};
