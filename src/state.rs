//! The observable treadmill state snapshot (spec §3).

use serde::{Deserialize, Serialize};

/// Device-state enum: 0 idle, 1 running, 2 starting, 3 paused.
///
/// Values 2 and 3 are carried through verbatim from the wire but their
/// precise semantics aren't documented by either protocol (spec §9); treat
/// them as opaque beyond the `Idle`/`Running` distinction used to derive
/// `is_running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeviceState {
    Idle = 0,
    Running = 1,
    Starting = 2,
    Paused = 3,
}

impl DeviceState {
    pub fn from_clamped(byte: u8) -> Self {
        match byte {
            1 => DeviceState::Running,
            2 => DeviceState::Starting,
            3 => DeviceState::Paused,
            _ => DeviceState::Idle,
        }
    }
}

/// Control-mode enum: 0 standby, 1 manual, 2 auto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlMode {
    Standby = 0,
    Manual = 1,
    Auto = 2,
}

impl ControlMode {
    pub fn from_clamped(byte: u8) -> Self {
        match byte {
            1 => ControlMode::Manual,
            2 => ControlMode::Auto,
            _ => ControlMode::Standby,
        }
    }
}

/// A fresh parse-result snapshot. Never shared between parses — every codec
/// parse produces an owned, independent value (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreadmillState {
    pub device_state: DeviceState,
    pub control_mode: ControlMode,
    /// km/h, `[0, 25]`.
    pub speed_kmh: f64,
    /// whole seconds, `[0, 86400]`.
    pub elapsed_time_secs: u32,
    /// km, `[0, 100]`.
    pub distance_km: f64,
    /// whole steps, `[0, 200000]`.
    pub steps: u32,
    pub is_running: bool,
}

impl Default for TreadmillState {
    fn default() -> Self {
        TreadmillState {
            device_state: DeviceState::Idle,
            control_mode: ControlMode::Standby,
            speed_kmh: 0.0,
            elapsed_time_secs: 0,
            distance_km: 0.0,
            steps: 0,
            is_running: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_zero() {
        let s = TreadmillState::default();
        assert_eq!(s.device_state, DeviceState::Idle);
        assert_eq!(s.control_mode, ControlMode::Standby);
        assert_eq!(s.speed_kmh, 0.0);
        assert_eq!(s.elapsed_time_secs, 0);
        assert_eq!(s.distance_km, 0.0);
        assert_eq!(s.steps, 0);
        assert!(!s.is_running);
    }

    #[test]
    fn device_state_round_trips_in_range_values() {
        for (byte, expected) in [
            (0u8, DeviceState::Idle),
            (1, DeviceState::Running),
            (2, DeviceState::Starting),
            (3, DeviceState::Paused),
        ] {
            assert_eq!(DeviceState::from_clamped(byte), expected);
        }
    }
}
