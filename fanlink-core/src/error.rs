//! Domain-specific error types for the fan protocol.
//!
//! Frame and record errors are local: the session logs them and keeps
//! going. Socket errors feed the reconnect loop. Nothing here is fatal to
//! the process.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::property::PropertyCode;

/// The canonical error type for the fan protocol.
#[derive(Debug, Error)]
pub enum FanError {
    // ── Frame / Record Errors ────────────────────────────────────
    /// A frame failed a structural or length check and was discarded.
    #[error("malformed frame: {0}")]
    FrameMalformed(#[from] FrameError),

    /// A record carried a code that is not in the property table.
    #[error("unknown property code {0}")]
    UnknownPropertyCode(PropertyCode),

    /// A known property's value could not be decoded.
    #[error("cannot decode property {code}: {source}")]
    ValueDecode {
        code: PropertyCode,
        #[source]
        source: DecodeError,
    },

    // ── Connection Errors ────────────────────────────────────────
    /// A socket operation failed; the connection will be re-established.
    #[error("socket error ({kind}): {source}")]
    Socket {
        kind: SocketErrorKind,
        #[source]
        source: std::io::Error,
    },

    /// The connection task is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A connection phase transition was attempted from the wrong phase.
    #[error("invalid phase transition: {0}")]
    ProtocolViolation(&'static str),

    // ── Setup Errors ─────────────────────────────────────────────
    /// A device entry lacks a setting needed to reach it.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// A command could not be turned into a frame.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl FanError {
    /// Wrap an I/O error that happened on a live socket, classifying it.
    pub fn socket(source: std::io::Error) -> Self {
        FanError::Socket {
            kind: SocketErrorKind::classify(&source),
            source,
        }
    }
}

// ── FrameError ───────────────────────────────────────────────────

/// Why a frame was rejected by the unstuffer or the message parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame is empty")]
    Empty,

    #[error("expected start delimiter 0xc0, found {0:#04x}")]
    MissingStartDelimiter(u8),

    #[error("expected end delimiter 0xc0, found {0:#04x}")]
    MissingEndDelimiter(u8),

    #[error("expected message marker 0x12, found {0:#04x}")]
    MissingMarker(u8),

    /// The bytes of a length field never reached their terminator.
    #[error("{field} is not terminated")]
    UnterminatedLength { field: &'static str },

    /// A length field disagrees with the bytes actually present.
    #[error("{field} mismatch: header says {expected} bytes remain, found {actual}")]
    LengthMismatch {
        field: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("unexpected byte {byte:#04x} at offset {offset}")]
    UnexpectedByte { byte: u8, offset: usize },

    #[error("record needs {needed} bytes, only {available} remain")]
    Truncated { needed: usize, available: usize },

    #[error("{0} bytes follow the end delimiter")]
    TrailingBytes(usize),
}

// ── DecodeError ──────────────────────────────────────────────────

/// Why a property value could not be decoded or was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("value is empty")]
    Empty,

    #[error("{value} is not a valid {kind}")]
    InvalidValue { kind: &'static str, value: u8 },

    #[error("{value} outside plausible range {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("text field shorter than its {offset}-byte prefix")]
    TextTooShort { offset: usize },

    #[error("decoded {found}, handler expects {expected}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

// ── SocketErrorKind ──────────────────────────────────────────────

/// Coarse classes of socket failure, each logged with its own message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketErrorKind {
    Reset,
    TimedOut,
    Refused,
    Unreachable,
    Other,
}

impl SocketErrorKind {
    pub fn classify(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Self::Reset,
            ErrorKind::TimedOut => Self::TimedOut,
            ErrorKind::ConnectionRefused => Self::Refused,
            ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => Self::Unreachable,
            _ => Self::Other,
        }
    }

    /// Operator-facing explanation for the log line.
    pub fn diagnostic(&self) -> &'static str {
        match self {
            Self::Reset => "connection reset by the fan",
            Self::TimedOut => "connection timed out; is the fan powered?",
            Self::Refused => "connection refused; check the address and port",
            Self::Unreachable => "fan unreachable; check the network",
            Self::Other => "unexpected socket error",
        }
    }
}

impl fmt::Display for SocketErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reset => "reset",
            Self::TimedOut => "timed out",
            Self::Refused => "refused",
            Self::Unreachable => "unreachable",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for FanError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        FanError::ChannelClosed
    }
}
