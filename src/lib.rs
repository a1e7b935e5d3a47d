//! Core control library for WalkingPad-family treadmills over Bluetooth LE.
//!
//! The public surface is small and imperative: connect, start, stop,
//! set-speed, observe state. Everything else — protocol codecs, GATT role
//! discovery, the connection state machine, legacy-protocol polling — is
//! internal machinery the [`orchestrator::ConnectionOrchestrator`] drives on
//! the caller's behalf.
//!
//! The BLE stack itself is an external collaborator: this crate depends
//! only on the [`ble`] trait contracts, never on a concrete transport.
//! Enable the `btleplug-backend` feature for a ready-made adapter over
//! real hardware, or implement [`ble::BleStack`] directly against another
//! transport (or a test double).

pub mod abort;
pub mod ble;
#[cfg(feature = "btleplug-backend")]
pub mod btleplug_backend;
pub mod bytes;
pub mod clamp;
pub mod codec;
pub mod error;
pub mod events;
pub mod gatt;
pub mod logger;
pub mod orchestrator;
pub mod poll;
pub mod registry;
pub mod state;
pub mod state_machine;
pub mod storage;
pub mod throttle;
pub mod transport;
pub mod uuid_util;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use orchestrator::{ConnectOptions, ConnectionOrchestrator, SessionInfo};
pub use state::TreadmillState;
pub use state_machine::ConnectionState;
