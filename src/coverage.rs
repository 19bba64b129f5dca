//! Triangle-vs-region classification: the `{disjoint, intersect,
//! contains, inside}` coverage codes shared by all three region shapes.

use crate::trixel::TriFrame;
use crate::vec3::V3;

/// Classification of an HTM triangle against a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Triangle and region do not overlap.
    Disjoint,
    /// Triangle and region overlap, but neither contains the other.
    Intersect,
    /// Triangle completely contains the region.
    Contains,
    /// Triangle is completely inside the region.
    Inside,
}

/// Squared chord (Euclidean) distance between two unit vectors:
/// `|a-b|^2 = 2 - 2 a.b`. Equal to `4 sin^2(theta/2)` where `theta` is
/// the angular separation -- the metric used throughout region
/// classification so that angular-radius comparisons avoid trig calls.
#[must_use]
pub fn chord2(a: &V3, b: &V3) -> f64 {
    2.0 - 2.0 * a.dot(b)
}

/// Converts an angular radius in degrees to the equivalent squared-chord
/// threshold `4 sin^2(r/2)`.
#[must_use]
pub fn angle_deg_to_chord2(radius_deg: f64) -> f64 {
    let half = radius_deg.to_radians() / 2.0;
    4.0 * half.sin() * half.sin()
}

/// Squared chord distance from `c` to the closest point on the
/// great-circle arc between unit vectors `a` and `b`.
///
/// If the perpendicular foot of `c` on the arc's great circle falls
/// within the minor arc `[a,b]`, that foot is the closest point;
/// otherwise the closest point is one of the two endpoints. Arc
/// membership is tested via the angular-sum identity
/// `angsep(a,f) + angsep(f,b) == angsep(a,b)`, which holds only when `f`
/// lies on the minor arc.
#[must_use]
pub fn edge_dist2(c: &V3, a: &V3, b: &V3) -> f64 {
    let n = a.cross(b);
    let n2 = n.norm2();
    let endpoint_floor = chord2(c, a).min(chord2(c, b));
    if n2 == 0.0 {
        return endpoint_floor;
    }
    let proj = n.scale(c.dot(&n) / n2);
    let on_plane = c.sub(&proj);
    let Ok(f) = on_plane.normalize() else {
        return endpoint_floor;
    };
    let ang_ab = a.angsep(b);
    let ang_af = a.angsep(&f);
    let ang_fb = f.angsep(b);
    if (ang_af + ang_fb - ang_ab).abs() < 1e-9 {
        chord2(c, &f).min(endpoint_floor)
    } else {
        endpoint_floor
    }
}

/// The circle-vs-triangle classification rule from the component design:
/// count vertices within the chord-squared threshold, then fall back to
/// edge-distance and containment tests.
#[must_use]
pub fn classify_circle(tri: &TriFrame, center: &V3, dist2: f64) -> Coverage {
    let nin = tri
        .verts
        .iter()
        .filter(|v| chord2(center, v) <= dist2)
        .count();
    if nin == 3 {
        return Coverage::Inside;
    }
    if nin != 0 {
        return Coverage::Intersect;
    }
    if edge_dist2(center, &tri.verts[0], &tri.verts[1]) <= dist2
        || edge_dist2(center, &tri.verts[1], &tri.verts[2]) <= dist2
        || edge_dist2(center, &tri.verts[2], &tri.verts[0]) <= dist2
    {
        return Coverage::Intersect;
    }
    if tri.edges.iter().all(|e| center.dot(e) >= 0.0) {
        Coverage::Contains
    } else {
        Coverage::Disjoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord2_matches_angle() {
        let a = V3::new(1.0, 0.0, 0.0);
        let b = V3::new(0.0, 1.0, 0.0);
        assert!((chord2(&a, &b) - 2.0).abs() < 1e-12);
        assert!((angle_deg_to_chord2(90.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn edge_dist_zero_on_arc() {
        let a = V3::new(1.0, 0.0, 0.0);
        let b = V3::new(0.0, 1.0, 0.0);
        let mid = V3::midpoint(&a, &b).unwrap();
        assert!(edge_dist2(&mid, &a, &b) < 1e-18);
    }
}
