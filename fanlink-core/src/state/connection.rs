//! Connection lifecycle state machine.
//!
//! `ConnectionPhase` models the reconnecting lifecycle of one fan link,
//! with validated transitions that return `Result` instead of panicking.

use std::time::Instant;

use crate::error::FanError;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of a fan connection.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲  │             │             │
///       │  ▼             ▼             ▼
///       │ ReconnectPending ◄── Disconnected
///       └──────────────────────────────┘
/// ```
///
/// There is no terminal phase: a link keeps cycling until it is shut down.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No socket. Initial phase, and the phase after any socket error.
    #[default]
    Disconnected,

    /// TCP connect in progress.
    Connecting,

    /// Socket is up and frames are flowing.
    Connected {
        /// When the connection entered the `Connected` phase.
        since: Instant,
    },

    /// Waiting out the backoff before the next attempt.
    ReconnectPending,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::ReconnectPending => write!(f, "ReconnectPending"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the connection has been up. `None` unless `Connected`.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Disconnected` (first attempt), `ReconnectPending`.
    pub fn begin_connect(&mut self) -> Result<(), FanError> {
        match self {
            Self::Disconnected | Self::ReconnectPending => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(FanError::ProtocolViolation(
                "cannot connect: not in Disconnected or ReconnectPending state",
            )),
        }
    }

    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), FanError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(FanError::ProtocolViolation(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// A socket error ended the attempt or the session.
    ///
    /// Valid from: `Connecting`, `Connected`.
    pub fn fail(&mut self) -> Result<(), FanError> {
        match self {
            Self::Connecting | Self::Connected { .. } => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(FanError::ProtocolViolation(
                "cannot fail: no connection attempt in progress",
            )),
        }
    }

    /// Valid from: `Disconnected`.
    pub fn schedule_reconnect(&mut self) -> Result<(), FanError> {
        match self {
            Self::Disconnected => {
                *self = Self::ReconnectPending;
                Ok(())
            }
            _ => Err(FanError::ProtocolViolation(
                "cannot schedule reconnect: not in Disconnected state",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current phase. Used on
    /// shutdown.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────
