//! The protocol half of a connection: frames in, state updates out.
//!
//! A [`FanSession`] owns one device's [`DeviceState`] and [`MysteryLedger`]
//! and knows nothing about sockets, which keeps it trivially testable.

use tracing::{debug, warn};

use crate::command::{CommandFrame, FanCommand};
use crate::error::FanError;
use crate::message;
use crate::property::{PropertyRegistry, registry};
use crate::state::{DeviceState, MysteryLedger, StateUpdate};

#[derive(Debug)]
pub struct FanSession {
    addr: String,
    state: DeviceState,
    ledger: MysteryLedger,
    registry: &'static PropertyRegistry,
}

impl FanSession {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            state: DeviceState::new(),
            ledger: MysteryLedger::new(),
            registry: registry(),
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn ledger(&self) -> &MysteryLedger {
        &self.ledger
    }

    /// Process one raw frame and return the updates it produced.
    ///
    /// A malformed frame is logged and dropped whole. A bad record is logged
    /// and skipped; the rest of its frame still applies.
    pub fn handle_frame(&mut self, raw: &[u8]) -> Vec<StateUpdate> {
        let message = match message::decode_frame(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(addr = %self.addr, len = raw.len(), "{}", FanError::from(e));
                return Vec::new();
            }
        };
        debug!(
            addr = %self.addr,
            envelope = ?message.envelope,
            records = message.records.len(),
            "frame"
        );

        for record in &message.records {
            if let Err(e) = self
                .registry
                .dispatch(record, &mut self.state, &mut self.ledger)
            {
                warn!(addr = %self.addr, "{e}");
            }
        }
        self.state.take_updates()
    }

    /// Encode a command against the current state.
    pub fn issue(&mut self, command: FanCommand) -> Result<Vec<CommandFrame>, FanError> {
        debug!(addr = %self.addr, ?command, "issuing command");
        command.encode(&mut self.state)
    }
}
