//! The standard Bluetooth Fitness Machine Service protocol (spec §4.4).
//!
//! Control-point commands are short fixed opcodes. Treadmill-data
//! notifications are flags-gated: a leading `u16` flags word selects which
//! optional fields follow, in a fixed order, each at its own fixed width.
//! Parsing halts the instant a flagged field would overrun the buffer,
//! returning whatever was accumulated so far — this is what keeps a short
//! read from misaligning every field after it.

use super::{validate_speed, Codec, CodecName};
use crate::bytes::{read_u16_le, read_u24_le};
use crate::clamp::{clamp_control_mode, clamp_device_state, clamp_distance, clamp_speed, clamp_time};
use crate::error::Result;
use crate::state::{ControlMode, DeviceState, TreadmillState};

const FLAG_AVERAGE_SPEED: u16 = 1 << 1;
const FLAG_TOTAL_DISTANCE: u16 = 1 << 2;
const FLAG_INCLINATION: u16 = 1 << 3;
const FLAG_ELEVATION_GAIN: u16 = 1 << 4;
const FLAG_INSTANT_PACE: u16 = 1 << 5;
const FLAG_AVERAGE_PACE: u16 = 1 << 6;
const FLAG_EXPENDED_ENERGY: u16 = 1 << 7;
const FLAG_HEART_RATE: u16 = 1 << 8;
const FLAG_METABOLIC_EQUIVALENT: u16 = 1 << 9;
const FLAG_ELAPSED_TIME: u16 = 1 << 10;

/// The standard FTMS codec singleton. Stateless.
#[derive(Debug, Default)]
pub struct FtmsCodec;

impl Codec for FtmsCodec {
    fn name(&self) -> CodecName {
        CodecName::Ftms
    }

    fn uses_control_point(&self) -> bool {
        true
    }

    fn ask_stats(&self) -> Vec<u8> {
        // FTMS is notification-driven; there's no poll request to send.
        Vec::new()
    }

    fn start(&self) -> Vec<u8> {
        vec![0x07]
    }

    fn stop(&self) -> Vec<u8> {
        vec![0x08, 0x01]
    }

    fn request_control(&self) -> Vec<u8> {
        vec![0x00]
    }

    fn set_speed(&self, kmh: f64) -> Result<Vec<u8>> {
        let kmh = validate_speed(kmh)?;
        let hundredths = (kmh * 100.0).round() as u16;
        let [lo, hi] = hundredths.to_le_bytes();
        Ok(vec![0x02, lo, hi])
    }

    fn parse_status(&self, data: &[u8]) -> TreadmillState {
        if data.len() < 2 {
            return TreadmillState::default();
        }
        let flags = read_u16_le(data, 0);
        if data.len() < 4 {
            return TreadmillState::default();
        }

        // Instantaneous speed: 0.01 km/h units, always present right after flags.
        let speed = clamp_speed(read_u16_le(data, 2) as f64 / 100.0);

        let mut offset = 4usize;
        let mut distance_km = 0.0f64;
        let mut elapsed_time_secs = 0u32;

        // Fields appear in this fixed order, each only when its flag bit is set.
        let fields: &[(u16, usize)] = &[
            (FLAG_AVERAGE_SPEED, 2),
            (FLAG_TOTAL_DISTANCE, 3),
            (FLAG_INCLINATION, 4),
            (FLAG_ELEVATION_GAIN, 2),
            (FLAG_INSTANT_PACE, 1),
            (FLAG_AVERAGE_PACE, 1),
            (FLAG_EXPENDED_ENERGY, 5),
            (FLAG_HEART_RATE, 1),
            (FLAG_METABOLIC_EQUIVALENT, 1),
            (FLAG_ELAPSED_TIME, 2),
        ];

        for &(bit, width) in fields {
            if flags & bit == 0 {
                continue;
            }
            if offset + width > data.len() {
                // Buffer ends mid-field: stop here rather than misread later fields.
                return TreadmillState {
                    device_state: DeviceState::from_clamped(clamp_device_state(if speed > 0.0 { 1.0 } else { 0.0 })),
                    control_mode: ControlMode::from_clamped(clamp_control_mode(if speed > 0.0 { 1.0 } else { 0.0 })),
                    speed_kmh: speed,
                    elapsed_time_secs,
                    distance_km,
                    steps: 0,
                    is_running: speed > 0.0,
                };
            }
            match bit {
                FLAG_TOTAL_DISTANCE => {
                    let meters = read_u24_le(data, offset);
                    distance_km = clamp_distance(meters as f64 / 1000.0);
                }
                FLAG_ELAPSED_TIME => {
                    elapsed_time_secs = clamp_time(read_u16_le(data, offset) as f64);
                }
                _ => {}
            }
            offset += width;
        }

        // Vendor extension: if >=2 bytes remain after the last flagged field,
        // they're a little-endian step count. Any shortfall just leaves steps
        // unknown rather than erroring (spec §9 open question).
        let steps = if data.len() >= offset + 2 {
            read_u16_le(data, offset) as u32
        } else {
            0
        };

        let is_running = speed > 0.0;
        TreadmillState {
            device_state: DeviceState::from_clamped(clamp_device_state(if is_running { 1.0 } else { 0.0 })),
            control_mode: ControlMode::from_clamped(clamp_control_mode(if is_running { 1.0 } else { 0.0 })),
            speed_kmh: speed,
            elapsed_time_secs,
            distance_km,
            steps,
            is_running,
        }
    }
}
