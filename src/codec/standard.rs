//! The proprietary framed protocol used by legacy WalkingPad-family models
//! (spec §4.3).
//!
//! Frame shape: `[0xF7, 0xA2, <body...>, checksum, 0xFD]` for commands;
//! responses use `0xF8, 0xA2` headers. The checksum is the sum of every byte
//! from the second header byte through the last body byte (exclusive of the
//! checksum and suffix bytes), mod 256.
//!
//! Byte-level field reads follow the same manual-offset style as the
//! teacher's LifeSpan response parser in `bluetooth/ftms.rs`
//! (`parse_lifespan_response`), just against this protocol's fixed status
//! layout instead.

use super::{validate_speed, Codec, CodecName};
use crate::bytes::{read_u24_be, read_u8};
use crate::clamp::{clamp_control_mode, clamp_device_state, clamp_distance, clamp_speed, clamp_steps, clamp_time};
use crate::error::Result;
use crate::state::{ControlMode, DeviceState, TreadmillState};

const HEADER: [u8; 2] = [0xF7, 0xA2];
const SUFFIX: u8 = 0xFD;
const MIN_STATUS_LEN: usize = 16;

fn frame(body: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER.len() + body.len() + 2);
    packet.extend_from_slice(&HEADER);
    packet.extend_from_slice(body);
    // sum(bytes[1..n-2]) mod 256, i.e. header[1] through the last body byte.
    let sum = packet[1..].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    packet.push(sum);
    packet.push(SUFFIX);
    packet
}

/// The standard-protocol codec singleton. Stateless.
#[derive(Debug, Default)]
pub struct StandardCodec;

impl Codec for StandardCodec {
    fn name(&self) -> CodecName {
        CodecName::Standard
    }

    fn uses_control_point(&self) -> bool {
        false
    }

    fn ask_stats(&self) -> Vec<u8> {
        frame(&[0x00])
    }

    fn start(&self) -> Vec<u8> {
        frame(&[0x04, 0x01])
    }

    fn stop(&self) -> Vec<u8> {
        frame(&[0x04, 0x00])
    }

    fn request_control(&self) -> Vec<u8> {
        Vec::new()
    }

    fn set_speed(&self, kmh: f64) -> Result<Vec<u8>> {
        let kmh = validate_speed(kmh)?;
        let tenths = (kmh * 10.0).round() as u8;
        Ok(frame(&[0x03, tenths]))
    }

    fn parse_status(&self, data: &[u8]) -> TreadmillState {
        if data.len() < MIN_STATUS_LEN {
            return TreadmillState::default();
        }

        let device_state = DeviceState::from_clamped(clamp_device_state(read_u8(data, 2) as f64));
        let speed = clamp_speed(read_u8(data, 3) as f64 / 10.0);
        let control_mode = ControlMode::from_clamped(clamp_control_mode(read_u8(data, 4) as f64));
        let elapsed_time_secs = clamp_time(read_u24_be(data, 5) as f64);
        let distance_km = clamp_distance(read_u24_be(data, 8) as f64 / 100.0);
        let steps = clamp_steps(read_u24_be(data, 11) as f64);
        let is_running = speed > 0.0 || device_state == DeviceState::Running;

        TreadmillState {
            device_state,
            control_mode,
            speed_kmh: speed,
            elapsed_time_secs,
            distance_km,
            steps,
            is_running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_packet() -> Vec<u8> {
        // spec §8.1: state=1 speed=3.5 mode=0 time=120 distance=0.5km steps=100
        vec![
            0xf7, 0xa2, 0x01, 0x23, 0x00, 0x00, 0x00, 0x78, 0x00, 0x00, 0x32, 0x00, 0x00, 0x64,
            0x00, 0xfd,
        ]
    }

    #[test]
    fn parses_the_canonical_status_fixture() {
        let s = StandardCodec.parse_status(&status_packet());
        assert_eq!(s.device_state, DeviceState::Running);
        assert_eq!(s.speed_kmh, 3.5);
        assert_eq!(s.control_mode, ControlMode::Standby);
        assert_eq!(s.elapsed_time_secs, 120);
        assert_eq!(s.distance_km, 0.5);
        assert_eq!(s.steps, 100);
        assert!(s.is_running);
    }

    #[test]
    fn too_short_yields_default_state_byte_for_byte() {
        let short = &status_packet()[..15];
        let s = StandardCodec.parse_status(short);
        assert_eq!(s, TreadmillState::default());

        let exact = &status_packet()[..16];
        assert_ne!(StandardCodec.parse_status(exact), TreadmillState::default());
    }

    #[test]
    fn set_speed_validates_range() {
        assert!(StandardCodec.set_speed(0.5).is_ok());
        assert!(StandardCodec.set_speed(6.0).is_ok());
        assert!(StandardCodec.set_speed(0.4999).is_err());
        assert!(StandardCodec.set_speed(6.0001).is_err());
        assert!(StandardCodec.set_speed(f64::NAN).is_err());
    }

    #[test]
    fn set_speed_framing_matches_checksum_rule() {
        let cmd = StandardCodec.set_speed(3.5).unwrap();
        assert_eq!(cmd[0], 0xf7);
        assert_eq!(cmd[1], 0xa2);
        assert_eq!(cmd[2], 0x03);
        assert_eq!(cmd[3], 35); // round(3.5 * 10)
        assert_eq!(*cmd.last().unwrap(), 0xfd);

        let expected_checksum = cmd[1..cmd.len() - 2]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        assert_eq!(cmd[cmd.len() - 2], expected_checksum);
    }

    #[test]
    fn every_command_satisfies_the_frame_invariant() {
        for cmd in [
            StandardCodec.ask_stats(),
            StandardCodec.start(),
            StandardCodec.stop(),
            StandardCodec.set_speed(2.0).unwrap(),
        ] {
            assert_eq!(cmd[0], 0xf7);
            assert_eq!(cmd[1], 0xa2);
            assert_eq!(*cmd.last().unwrap(), 0xfd);
            let expected = cmd[1..cmd.len() - 2]
                .iter()
                .fold(0u8, |acc, b| acc.wrapping_add(*b));
            assert_eq!(cmd[cmd.len() - 2], expected);
        }
    }

    #[test]
    fn request_control_is_a_no_op() {
        assert!(StandardCodec.request_control().is_empty());
    }
}
