//! Small helpers shared across the crate: float comparison, planar
//! geometry, and index conversions.

use easy_ext::ext;
use serde::{Deserialize, Serialize};

/// Planar coordinates in meters, after input scaling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other` in meters.
    pub fn distance_to(&self, other: Coord) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    /// Linear interpolation from `self` toward `to` by fraction `t`.
    pub fn lerp(&self, to: Coord, t: f64) -> Coord {
        Coord {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }
}

/// Compare two floats to within a relative-or-absolute epsilon.
pub fn almost_eq(a: f64, b: f64, epsilon: Option<f64>) -> bool {
    let epsilon = epsilon.unwrap_or(1e-8);
    (a - b).abs() <= epsilon * a.abs().max(b.abs()).max(1.0)
}

/// Whether A, B, C are listed in counter-clockwise order.
fn ccw(a: Coord, b: Coord, c: Coord) -> bool {
    (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
}

/// Whether segments AB and CD intersect, by the straddle test.
pub fn segments_intersect(a: Coord, b: Coord, c: Coord, d: Coord) -> bool {
    (ccw(a, c, d) != ccw(b, c, d)) && (ccw(a, b, c) != ccw(a, b, d))
}

#[ext(IdxExt)]
pub impl u32 {
    /// Widen an arena index for slice access.
    fn idx(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_segments_intersect() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(2.0, 2.0);
        let c = Coord::new(0.0, 2.0);
        let d = Coord::new(2.0, 0.0);
        assert!(segments_intersect(a, b, c, d));
    }

    #[test]
    fn parallel_segments_do_not_intersect() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(2.0, 0.0);
        let c = Coord::new(0.0, 1.0);
        let d = Coord::new(2.0, 1.0);
        assert!(!segments_intersect(a, b, c, d));
    }

    #[test]
    fn lerp_midpoint() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(10.0, 4.0);
        let m = a.lerp(b, 0.5);
        assert!(almost_eq(m.x, 5.0, None));
        assert!(almost_eq(m.y, 2.0, None));
    }
}
