//! Protocol codecs: build outbound commands, parse inbound status packets.
//!
//! Generalised from the teacher's `protocol::TreadmillProtocol` trait
//! (`name`/`characteristic_uuid`/`mode`/`parse_data`), narrowed to the two
//! concrete behaviours this spec actually needs: command-building and
//! status-packet parsing. Discovery-time characteristic roles are handled
//! separately by `gatt.rs`, since both codecs here share the same GATT role
//! model (spec §4.6) rather than owning their own characteristic UUID.

pub mod ftms;
pub mod standard;

use crate::error::Result;
use crate::state::TreadmillState;

/// Which wire dialect a connected session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecName {
    Standard,
    Ftms,
}

impl CodecName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecName::Standard => "standard",
            CodecName::Ftms => "ftms",
        }
    }
}

const SPEED_MIN_KMH: f64 = 0.5;
const SPEED_MAX_KMH: f64 = 6.0;

/// Shared speed-command validation (spec §4.3, reused verbatim by §4.4).
fn validate_speed(kmh: f64) -> Result<f64> {
    if !kmh.is_finite() || kmh < SPEED_MIN_KMH || kmh > SPEED_MAX_KMH {
        return Err(crate::error::Error::SpeedOutOfRange {
            value: kmh,
            min: SPEED_MIN_KMH,
            max: SPEED_MAX_KMH,
        });
    }
    Ok(kmh)
}

/// A stateless, process-lifetime-singleton protocol codec (spec §4.3/§4.4).
///
/// Command builders return an empty `Vec` when the command is a no-op for
/// this dialect (e.g. FTMS's `ask_stats`, which is notification-driven and
/// never sent) — callers treat an empty payload as "nothing to write".
pub trait Codec: Send + Sync {
    fn name(&self) -> CodecName;

    /// Route table: does this command go to the control-point characteristic
    /// (if present) or to the plain write characteristic?
    fn uses_control_point(&self) -> bool;

    fn ask_stats(&self) -> Vec<u8>;
    fn start(&self) -> Vec<u8>;
    fn stop(&self) -> Vec<u8>;
    fn request_control(&self) -> Vec<u8>;
    fn set_speed(&self, kmh: f64) -> Result<Vec<u8>>;

    /// Parse a status/notification packet into a fresh [`TreadmillState`].
    fn parse_status(&self, data: &[u8]) -> TreadmillState;
}
