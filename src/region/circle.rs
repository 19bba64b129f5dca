use crate::coverage::{angle_deg_to_chord2, chord2, classify_circle, Coverage};
use crate::error::{Error, Result};
use crate::trixel::TriFrame;
use crate::vec3::V3;

/// A spherical circle (small or great): all points within `radius_deg`
/// of `center` (both in the contractual unit-vector sense for `center`).
#[derive(Debug, Clone, Copy)]
pub struct Circle {
    pub center: V3,
    pub radius_deg: f64,
    dist2: f64,
}

impl Circle {
    pub fn new(center: V3, radius_deg: f64) -> Result<Self> {
        if !(0.0..=180.0).contains(&radius_deg) {
            return Err(Error::InvalidArgument(format!(
                "circle radius {radius_deg} outside [0, 180] degrees"
            )));
        }
        let center = center.normalize()?;
        Ok(Self {
            center,
            radius_deg,
            dist2: angle_deg_to_chord2(radius_deg),
        })
    }

    /// The whole-sky circle: radius 180 degrees, every point is inside.
    #[must_use]
    pub fn all_sky() -> Self {
        Self {
            center: V3::new(0.0, 0.0, 1.0),
            radius_deg: 180.0,
            dist2: 4.0,
        }
    }

    #[must_use]
    pub fn contains(&self, v: &V3) -> bool {
        chord2(&self.center, v) <= self.dist2
    }

    #[must_use]
    pub fn classify(&self, tri: &TriFrame) -> Coverage {
        classify_circle(tri, &self.center, self.dist2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_center() {
        let c = Circle::new(V3::new(1.0, 0.0, 0.0), 10.0).unwrap();
        assert!(c.contains(&V3::new(1.0, 0.0, 0.0)));
        assert!(!c.contains(&V3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn all_sky_contains_everything() {
        let c = Circle::all_sky();
        assert!(c.contains(&V3::new(0.0, 0.0, -1.0)));
        assert!(c.contains(&V3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn rejects_bad_radius() {
        assert!(Circle::new(V3::new(1.0, 0.0, 0.0), -1.0).is_err());
        assert!(Circle::new(V3::new(1.0, 0.0, 0.0), 181.0).is_err());
    }
}
