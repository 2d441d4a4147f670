//! # fanlink-core
//!
//! Protocol library for networked ceiling-fan controllers that speak a
//! byte-stuffed, length-prefixed property protocol over TCP.
//!
//! This crate contains:
//! - **Wire primitives**: the custom `varint` and SLIP-style `frame` stuffing
//! - **Codec**: `FanCodec` for framed TCP I/O via `tokio_util`
//! - **Message**: the two-length-check envelope parser yielding `PropertyRecord`s
//! - **Property**: the immutable code table with per-family decoders and handlers
//! - **Command**: `FanCommand` encoding, including the home-shield policy
//! - **State**: `DeviceState`, `MysteryLedger` and the `ConnectionPhase` machine
//! - **Session**: `FanSession`, the socket-free frame-in, update-out core
//! - **Network**: `FanConnection`, a reconnecting connection task with keepalive
//! - **Error**: `FanError` — typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod message;
pub mod network;
pub mod property;
pub mod session;
pub mod state;
pub mod varint;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{FanCodec, MAX_FRAME_SIZE};
pub use command::{CommandFrame, FanCommand, INIT_FRAME, KEEPALIVE_FRAME};
pub use error::{DecodeError, FanError, FrameError, SocketErrorKind};
pub use message::{Envelope, Message, PropertyRecord, decode_frame, parse_message};
pub use network::{
    ConnectionConfig, ConnectionInfo, Connector, DEFAULT_PORT, FanConnection, FanEvent,
    TcpConnector, probe,
};
pub use property::{DecodedValue, PropertyCode, PropertyRegistry, registry};
pub use session::FanSession;
pub use state::{ConnectionPhase, DeviceState, MysteryLedger, RotationDirection, StateUpdate};
