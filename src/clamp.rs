//! Domain-value clamps (spec §4.2).
//!
//! Every clamp maps any `f64` (including NaN/inf) into its documented valid
//! range. Non-finite inputs clamp to 0. Time and step counts additionally
//! floor to an integer, since the wire never carries fractional seconds or
//! steps.

const MAX_SPEED_KMH: f64 = 25.0;
const MAX_TIME_SECS: f64 = 86_400.0;
const MAX_DISTANCE_KM: f64 = 100.0;
const MAX_STEPS: f64 = 200_000.0;

fn clamp_range(value: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, max)
}

/// Device-state enum clamp: 0 idle, 1 running, 2 starting, 3 paused.
pub fn clamp_device_state(value: f64) -> u8 {
    clamp_range(value, 3.0).floor() as u8
}

/// Control-mode enum clamp: 0 standby, 1 manual, 2 auto.
pub fn clamp_control_mode(value: f64) -> u8 {
    clamp_range(value, 2.0).floor() as u8
}

/// Speed clamp, km/h, `[0, 25]`.
pub fn clamp_speed(value: f64) -> f64 {
    clamp_range(value, MAX_SPEED_KMH)
}

/// Elapsed-time clamp, whole seconds, `[0, 86400]`.
pub fn clamp_time(value: f64) -> u32 {
    clamp_range(value, MAX_TIME_SECS).floor() as u32
}

/// Distance clamp, km, `[0, 100]`.
pub fn clamp_distance(value: f64) -> f64 {
    clamp_range(value, MAX_DISTANCE_KM)
}

/// Step-count clamp, whole steps, `[0, 200000]`.
pub fn clamp_steps(value: f64) -> u32 {
    clamp_range(value, MAX_STEPS).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_clamps_to_zero() {
        assert_eq!(clamp_speed(f64::NAN), 0.0);
        assert_eq!(clamp_speed(f64::INFINITY), 0.0);
        assert_eq!(clamp_speed(f64::NEG_INFINITY), 0.0);
        assert_eq!(clamp_time(f64::NAN), 0);
        assert_eq!(clamp_steps(f64::NAN), 0);
        assert_eq!(clamp_distance(f64::NAN), 0.0);
        assert_eq!(clamp_device_state(f64::NAN), 0);
        assert_eq!(clamp_control_mode(f64::NAN), 0);
    }

    #[test]
    fn out_of_range_clamps_to_nearest_boundary() {
        assert_eq!(clamp_speed(-5.0), 0.0);
        assert_eq!(clamp_speed(1000.0), 25.0);
        assert_eq!(clamp_time(-1.0), 0);
        assert_eq!(clamp_time(1_000_000.0), 86_400);
        assert_eq!(clamp_distance(-1.0), 0.0);
        assert_eq!(clamp_distance(500.0), 100.0);
        assert_eq!(clamp_steps(-1.0), 0);
        assert_eq!(clamp_steps(1_000_000.0), 200_000);
        assert_eq!(clamp_device_state(10.0), 3);
        assert_eq!(clamp_control_mode(10.0), 2);
    }

    #[test]
    fn fractional_values_floor() {
        assert_eq!(clamp_time(12.9), 12);
        assert_eq!(clamp_steps(99.99), 99);
        assert_eq!(clamp_device_state(1.9), 1);
    }

    #[test]
    fn in_range_values_pass_through() {
        assert_eq!(clamp_speed(3.5), 3.5);
        assert_eq!(clamp_distance(0.5), 0.5);
        assert_eq!(clamp_time(120.0), 120);
        assert_eq!(clamp_steps(100.0), 100);
    }
}
