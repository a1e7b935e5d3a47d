//! Error taxonomy for the control library (spec §7).

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the orchestrator, transport and codec layers can surface to a caller.
#[derive(Debug, Error)]
pub enum Error {
    /// A commanded speed was non-finite or outside the codec's legal range.
    #[error("speed {value} out of range [{min}, {max}]")]
    SpeedOutOfRange { value: f64, min: f64, max: f64 },

    /// A command was issued while the connection wasn't in the `connected` state.
    #[error("not connected")]
    NotConnected,

    /// A bounded BLE operation exceeded its deadline.
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    /// `connect`/`reconnect` was cancelled via its abort signal.
    #[error("connection aborted")]
    ConnectionAborted,

    /// GATT discovery could not locate the required write/notify characteristics.
    #[error("GATT discovery failed: {0}")]
    Discovery(String),

    /// A programmer error: an invalid state-machine transition was attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: crate::state_machine::ConnectionState,
        to: crate::state_machine::ConnectionState,
    },

    /// An option value was out of its legal range (e.g. a non-positive poll interval).
    #[error("invalid option: {0}")]
    Range(String),

    /// A write was attempted with an empty payload; there is nothing to
    /// send, and the underlying characteristic write is never issued.
    #[error("refusing to write an empty payload")]
    EmptyPayload,

    /// An error surfaced by the external BLE stack, normalised to a string.
    ///
    /// The stack's error type is not constrained by this crate (see `ble.rs`), so
    /// peer errors are captured as their `Display` form; `None`/empty messages and
    /// non-UTF8 payloads are replaced with a fixed placeholder rather than an empty
    /// string so the text is never silently lost.
    #[error("peer error: {0}")]
    Peer(String),
}

impl Error {
    /// Normalise an arbitrary peer-reported failure into a [`Error::Peer`].
    ///
    /// Mirrors the "normalise anything the stack throws" rule of §7: the original
    /// message is preserved verbatim when non-empty, otherwise replaced with
    /// explicit placeholder text.
    pub fn from_peer(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Error::Peer("<no message>".to_string())
        } else {
            Error::Peer(message)
        }
    }
}
