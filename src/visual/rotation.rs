//! Knob rotation math

use crate::mapping::RotationConfig;

use super::geometry::{ElementGeometry, Point};

/// Map any angle into `[0, 360)`. Non-finite input yields 0.
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let a = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Angle of an absolute-mode knob for a 0-127 value
pub fn absolute_angle(rotation: &RotationConfig, value: i16) -> f64 {
    let t = crate::midi::convert::to_unit_7bit(value);
    normalize_angle(rotation.angle_min + (rotation.angle_max - rotation.angle_min) * t + rotation.angle_offset)
}

/// Degrees to add to the accumulated angle for a new raw value.
///
/// The first value seen only primes the previous value. The raw delta is
/// clamped to `±max_step` so a source wrapping at 0/127 never jumps the knob
/// by a full turn.
pub fn accumulate_delta(rotation: &RotationConfig, last_raw: Option<i16>, value: i16) -> f64 {
    let Some(previous) = last_raw else {
        return 0.0;
    };
    let step = rotation.max_step.max(1);
    let delta = (value - previous).clamp(-step, step);
    delta as f64 * rotation.degrees_per_step()
}

/// Rotation center of a knob.
///
/// Priority: explicit override, the target's native circle, the bounding box
/// of the pointer element, the target's bounding box, then the origin.
pub fn resolve_center(
    rotation: &RotationConfig,
    target: Option<&ElementGeometry>,
    pointer: Option<&ElementGeometry>,
) -> Point {
    if let Some(center) = rotation.center {
        return center;
    }
    if let Some(circle) = target.and_then(|g| g.circle) {
        return circle.center;
    }
    if let Some(bbox) = pointer.and_then(|g| g.bbox) {
        return bbox.center();
    }
    if let Some(bbox) = target.and_then(|g| g.bbox) {
        return bbox.center();
    }
    Point::ORIGIN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::RotationMode;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_normalize_angle() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(360.0), 0.0);
        assert_eq!(normalize_angle(-135.0), 225.0);
        assert_eq!(normalize_angle(725.0), 5.0);
        assert_eq!(normalize_angle(f64::NAN), 0.0);
        let tiny = normalize_angle(-1e-20);
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn test_absolute_endpoints() {
        let rotation = RotationConfig {
            angle_offset: 30.0,
            ..Default::default()
        };
        assert!((absolute_angle(&rotation, 0) - normalize_angle(-135.0 + 30.0)).abs() < EPS);
        assert!((absolute_angle(&rotation, 127) - normalize_angle(135.0 + 30.0)).abs() < EPS);
        assert!((absolute_angle(&RotationConfig::default(), 0) - 225.0).abs() < EPS);
        assert!((absolute_angle(&RotationConfig::default(), 127) - 135.0).abs() < EPS);
    }

    #[test]
    fn test_accumulate_delta_is_clamped() {
        let rotation = RotationConfig {
            mode: RotationMode::Accumulate,
            ..Default::default()
        };
        let per_step = 270.0 / 127.0;

        assert_eq!(accumulate_delta(&rotation, None, 64), 0.0);
        assert!((accumulate_delta(&rotation, Some(10), 15) - 5.0 * per_step).abs() < EPS);
        assert!((accumulate_delta(&rotation, Some(15), 12) + 3.0 * per_step).abs() < EPS);
        // Wrap from 127 to 0 is a single clamped step, not a full turn
        assert!((accumulate_delta(&rotation, Some(127), 0) + 8.0 * per_step).abs() < EPS);
    }

    #[test]
    fn test_center_priority() {
        let knob = ElementGeometry::circle(50.0, 60.0, 10.0);
        let rect = ElementGeometry::rect(0.0, 0.0, 20.0, 40.0);
        let pointer = ElementGeometry::rect(100.0, 100.0, 2.0, 2.0);

        let mut rotation = RotationConfig {
            center: Some(Point::new(1.0, 2.0)),
            ..Default::default()
        };
        assert_eq!(resolve_center(&rotation, Some(&knob), Some(&pointer)), Point::new(1.0, 2.0));

        rotation.center = None;
        assert_eq!(resolve_center(&rotation, Some(&knob), Some(&pointer)), Point::new(50.0, 60.0));
        assert_eq!(resolve_center(&rotation, Some(&rect), Some(&pointer)), Point::new(101.0, 101.0));
        assert_eq!(resolve_center(&rotation, Some(&rect), None), Point::new(10.0, 20.0));
        assert_eq!(resolve_center(&rotation, None, None), Point::ORIGIN);
    }
}
