//! Numeric encodings shared by the entity messages
//!
//! - Angles travel as a single wrapped byte (1/256 of a turn)
//! - Relative moves travel as int16 deltas at 1/4096 unit resolution
//! - Velocities travel as int16 at 1/8000 unit per tick

use glam::DVec3;

/// Fixed-point scale of a relative move delta
pub const RELATIVE_MOVE_SCALE: f64 = 4096.0;

/// A delta on any axis of at least this many units needs a teleport
pub const RELATIVE_MOVE_LIMIT: f64 = 8.0;

/// Fixed-point scale of a velocity component
pub const VELOCITY_SCALE: f64 = 8000.0;

/// Largest velocity magnitude per axis the client accepts
pub const MAX_VELOCITY: f64 = 3.9;

/// Wrap an angle in degrees into a single byte.
///
/// Any two angles that differ by a multiple of 360 degrees produce the same
/// byte, including negative angles.
pub fn wrap_angle(degrees: f64) -> u8 {
    let steps = (degrees * 256.0 / 360.0).floor();
    if !steps.is_finite() {
        return 0;
    }
    (steps as i64).rem_euclid(256) as u8
}

/// Convert a wrapped angle byte back to degrees in `[0, 360)`
pub fn unwrap_angle(angle: u8) -> f64 {
    angle as f64 * 360.0 / 256.0
}

/// Whether a positional delta fits in a relative move
pub fn fits_relative_move(delta: DVec3) -> bool {
    delta.abs().max_element() < RELATIVE_MOVE_LIMIT
}

/// Encode one axis of a positional delta as 1/4096 fixed point
pub fn encode_delta(delta: f64) -> i16 {
    (delta * RELATIVE_MOVE_SCALE)
        .round()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Decode one axis of a 1/4096 fixed-point delta
pub fn decode_delta(delta: i16) -> f64 {
    delta as f64 / RELATIVE_MOVE_SCALE
}

/// Encode one velocity component as int16 fixed point
pub fn encode_velocity(velocity: f64) -> i16 {
    (velocity.clamp(-MAX_VELOCITY, MAX_VELOCITY) * VELOCITY_SCALE).round() as i16
}

/// Decode one int16 fixed-point velocity component
pub fn decode_velocity(velocity: i16) -> f64 {
    velocity as f64 / VELOCITY_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_angle_full_turns() {
        assert_eq!(wrap_angle(10.0), wrap_angle(370.0));
        assert_eq!(wrap_angle(10.0), wrap_angle(-350.0));
        assert_eq!(wrap_angle(0.0), 0);
        assert_eq!(wrap_angle(90.0), 64);
        assert_eq!(wrap_angle(180.0), 128);
        assert_eq!(wrap_angle(-90.0), 192);
        assert_eq!(wrap_angle(720.0 + 45.0), wrap_angle(45.0));
    }

    #[test]
    fn test_wrap_angle_non_finite() {
        assert_eq!(wrap_angle(f64::NAN), 0);
        assert_eq!(wrap_angle(f64::INFINITY), 0);
    }

    #[test]
    fn test_unwrap_angle() {
        assert_eq!(unwrap_angle(64), 90.0);
        assert_eq!(unwrap_angle(wrap_angle(270.0)), 270.0);
    }

    #[test]
    fn test_relative_move_threshold() {
        assert!(fits_relative_move(DVec3::new(7.9999, 0.0, 0.0)));
        assert!(fits_relative_move(DVec3::new(0.0, -7.9999, 7.9999)));
        assert!(!fits_relative_move(DVec3::new(8.0, 0.0, 0.0)));
        assert!(!fits_relative_move(DVec3::new(0.0, 0.0, -8.0)));
    }

    #[test]
    fn test_delta_fixed_point() {
        assert_eq!(encode_delta(2.0), 8192);
        assert_eq!(encode_delta(1.5), 6144);
        assert_eq!(encode_delta(-2.25), -9216);
        assert_eq!(encode_delta(7.9999), i16::MAX);
        assert!((decode_delta(encode_delta(0.123)) - 0.123).abs() <= 1.0 / 4096.0);
    }

    #[test]
    fn test_velocity_fixed_point() {
        assert_eq!(encode_velocity(0.5), 4000);
        assert_eq!(encode_velocity(-0.25), -2000);
        assert_eq!(encode_velocity(10.0), 31200);
        assert_eq!(encode_velocity(-10.0), -31200);
        assert_eq!(decode_velocity(4000), 0.5);
    }
}
