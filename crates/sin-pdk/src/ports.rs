//! Port orientation to solver source injection mapping

use std::fmt;

use serde::Serialize;

const MANHATTAN: [f64; 4] = [0.0, 90.0, 180.0, 270.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// Axis-aligned injection for a port, with the residual tilt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Injection {
    /// Manhattan angle the orientation was snapped to
    pub snapped: f64,
    pub axis: Axis,
    pub direction: Direction,
    /// Signed residual in whole degrees (orientation minus snapped angle)
    pub theta: i64,
}

impl Injection {
    /// Sign convention for mode ports: `+` injects along +axis.
    pub fn sign(&self) -> char {
        match self.direction {
            Direction::Forward => '+',
            Direction::Backward => '-',
        }
    }
}

/// Snap a port orientation to the nearest Manhattan direction.
///
/// The angle is first reduced to [0, 360). Exact multiples of 90 keep a zero
/// residual. Anything else snaps to the closest of 0/90/180/270 without
/// wrapping around 360 (first match wins on ties), and the residual is
/// rounded half-to-even to whole degrees.
pub fn snap_orientation(angle: f64) -> Injection {
    let base = angle.rem_euclid(360.0);

    let (snapped, theta) = if MANHATTAN.contains(&base) {
        (base, 0)
    } else {
        let mut closest = MANHATTAN[0];
        for &candidate in &MANHATTAN[1..] {
            if (base - candidate).abs() < (base - closest).abs() {
                closest = candidate;
            }
        }
        (closest, (base - closest).round_ties_even() as i64)
    };

    // Ports face outward, so a port looking along +x injects backward.
    let (axis, direction) = match snapped as u16 {
        0 => (Axis::X, Direction::Backward),
        90 => (Axis::Y, Direction::Forward),
        180 => (Axis::X, Direction::Forward),
        _ => (Axis::Y, Direction::Backward),
    };

    Injection {
        snapped,
        axis,
        direction,
        theta,
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("x-axis"),
            Axis::Y => f.write_str("y-axis"),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("Forward"),
            Direction::Backward => f.write_str("Backward"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinal_angles_have_no_residual() {
        for (angle, axis, direction) in [
            (0.0, Axis::X, Direction::Backward),
            (90.0, Axis::Y, Direction::Forward),
            (180.0, Axis::X, Direction::Forward),
            (270.0, Axis::Y, Direction::Backward),
            (360.0, Axis::X, Direction::Backward),
            (-90.0, Axis::Y, Direction::Backward),
        ] {
            let inj = snap_orientation(angle);
            assert_eq!((inj.axis, inj.direction, inj.theta), (axis, direction, 0), "{angle}");
        }
    }

    #[test]
    fn test_off_axis_angles_snap_with_residual() {
        let inj = snap_orientation(35.0);
        assert_eq!((inj.snapped, inj.theta), (0.0, 35));

        let inj = snap_orientation(100.0);
        assert_eq!((inj.snapped, inj.theta), (90.0, 10));
        assert_eq!(inj.axis, Axis::Y);

        let inj = snap_orientation(260.0);
        assert_eq!((inj.snapped, inj.theta), (270.0, -10));
    }

    #[test]
    fn test_no_wraparound_and_tie_breaking() {
        // 350 is closer to 270 than to 0 when distances are not wrapped.
        let inj = snap_orientation(350.0);
        assert_eq!((inj.snapped, inj.theta), (270.0, 80));

        // Equidistant: the first candidate wins.
        assert_eq!(snap_orientation(45.0).snapped, 0.0);
        assert_eq!(snap_orientation(135.0).snapped, 90.0);
    }

    #[test]
    fn test_residual_rounds_half_to_even() {
        assert_eq!(snap_orientation(12.5).theta, 12);
        assert_eq!(snap_orientation(13.5).theta, 14);
    }

    #[test]
    fn test_idempotent_on_snapped_angle() {
        for angle in [12.0, 100.0, 200.0, 300.0] {
            let once = snap_orientation(angle);
            let twice = snap_orientation(once.snapped);
            assert_eq!(twice.snapped, once.snapped);
            assert_eq!(twice.theta, 0);
        }
    }
}
