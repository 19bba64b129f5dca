//! Spherical convex polygon: a vertex loop plus per-edge plane normals
//! and a witness point, with construction helpers and the edge-plane
//! line-program intersection test used for triangle classification.

use crate::coverage::Coverage;
use crate::error::{Error, Result};
use crate::trixel::TriFrame;
use crate::vec3::{north_east_frame, V3};

const EPS: f64 = 1e-9;

/// A spherical convex polygon: vertices `v_0..v_{n-1}` in counter-clockwise
/// order as seen from outside the sphere, edge-plane normals
/// `e_i = v_i x v_{(i+1) mod n}`, and `vsum`, the unnormalized sum of the
/// vertices, used as a cheap interior witness point.
#[derive(Debug, Clone)]
pub struct Polygon {
    pub verts: Vec<V3>,
    pub edges: Vec<V3>,
    pub vsum: V3,
}

impl Polygon {
    /// Builds a polygon from vertices already in CCW order, validating
    /// hemisphericality (via the `vsum` witness) and convexity (every
    /// vertex lies on the inner side of every edge it is not an
    /// endpoint of).
    pub fn from_vertices(verts: &[V3]) -> Result<Self> {
        let n = verts.len();
        if n < 3 {
            return Err(Error::InvalidArgument(
                "polygon needs at least 3 vertices".into(),
            ));
        }
        let verts: Vec<V3> = verts
            .iter()
            .map(V3::normalize)
            .collect::<Result<_>>()?;

        let mut vsum = V3::ZERO;
        for v in &verts {
            vsum = vsum.add(v);
        }
        if vsum.norm2() < EPS {
            return Err(Error::NotHemispherical);
        }
        let witness = vsum.normalize()?;
        for v in &verts {
            if v.dot(&witness) <= 0.0 {
                return Err(Error::NotHemispherical);
            }
        }

        let edges: Vec<V3> = (0..n)
            .map(|i| verts[i].cross(&verts[(i + 1) % n]))
            .collect();
        for (i, e) in edges.iter().enumerate() {
            for (j, v) in verts.iter().enumerate() {
                if j == i || j == (i + 1) % n {
                    continue;
                }
                if e.dot(v) < -EPS {
                    return Err(Error::Degenerate(format!(
                        "polygon is not convex: vertex {j} is outside edge {i}"
                    )));
                }
            }
        }

        Ok(Self { verts, edges, vsum })
    }

    /// Builds the convex hull of a hemispherical point set: the centroid
    /// direction anchors a gnomonic projection onto its tangent plane
    /// (exact for points strictly within the centroid's hemisphere,
    /// since central projection sends great circles to straight lines),
    /// then the projected points are swept into a 2D convex hull and
    /// mapped back to their original unit vectors.
    pub fn from_hull(points: &[V3]) -> Result<Self> {
        if points.len() < 3 {
            return Err(Error::InvalidArgument(
                "convex hull needs at least 3 points".into(),
            ));
        }
        let mut centroid = V3::ZERO;
        for p in points {
            centroid = centroid.add(p);
        }
        if centroid.norm2() < EPS {
            return Err(Error::NotHemispherical);
        }
        let centroid = centroid.normalize()?;
        let (north, east) = north_east_frame(&centroid);

        let mut pts2d: Vec<(f64, f64, V3)> = Vec::with_capacity(points.len());
        for p in points {
            let p = p.normalize()?;
            let d = p.dot(&centroid);
            if d <= EPS {
                return Err(Error::NotHemispherical);
            }
            pts2d.push((p.dot(&north) / d, p.dot(&east) / d, p));
        }
        pts2d.sort_by(|a, b| {
            a.1.atan2(a.0)
                .partial_cmp(&b.1.atan2(b.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pts2d.dedup_by(|a, b| (a.0 - b.0).abs() < EPS && (a.1 - b.1).abs() < EPS);
        if pts2d.len() < 3 {
            return Err(Error::Degenerate("convex hull points coincide".into()));
        }

        // Angular-sort-then-prune convex hull: a point sorted by angle
        // around an interior reference (the centroid here) survives on
        // the hull only if it is a strict left turn from its neighbors;
        // repeated passes remove every interior point.
        let cross2 = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| {
            (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
        };
        let mut hull: Vec<(f64, f64, V3)> = pts2d;
        loop {
            let n = hull.len();
            if n < 4 {
                break;
            }
            let mut drop_idx = None;
            for i in 0..n {
                let prev = hull[(i + n - 1) % n];
                let cur = hull[i];
                let next = hull[(i + 1) % n];
                if cross2((prev.0, prev.1), (cur.0, cur.1), (next.0, next.1)) <= EPS {
                    drop_idx = Some(i);
                    break;
                }
            }
            match drop_idx {
                Some(i) => {
                    hull.remove(i);
                }
                None => break,
            }
        }
        if hull.len() < 3 {
            return Err(Error::Degenerate(
                "convex hull collapsed to fewer than 3 vertices".into(),
            ));
        }
        let verts: Vec<V3> = hull.into_iter().map(|(_, _, v)| v).collect();
        Self::from_vertices(&verts)
    }

    /// Builds a regular n-gon centered at `center`, with every vertex
    /// `radius_deg` from the center, starting due north and proceeding
    /// east.
    pub fn from_ngon(center: V3, radius_deg: f64, n: usize) -> Result<Self> {
        if n < 3 {
            return Err(Error::InvalidArgument("n-gon needs n >= 3".into()));
        }
        let center = center.normalize()?;
        let step = 360.0 / n as f64;
        let verts: Vec<V3> = (0..n)
            .map(|k| offset_point(&center, radius_deg, k as f64 * step))
            .collect::<Result<_>>()?;
        Self::from_vertices(&verts)
    }

    /// Builds a best-effort spherical rectangle centered at `center`,
    /// `width_deg` by `height_deg`, rotated `rotation_deg` east of
    /// north. Corners are placed at the four diagonal bearings of the
    /// corresponding tangent-plane rectangle; exact only for small
    /// width/height, analogous to a lon/lat box elsewhere in the
    /// library.
    pub fn from_box(
        center: V3,
        width_deg: f64,
        height_deg: f64,
        rotation_deg: f64,
    ) -> Result<Self> {
        if width_deg <= 0.0 || height_deg <= 0.0 {
            return Err(Error::InvalidArgument(
                "box width and height must be positive".into(),
            ));
        }
        let center = center.normalize()?;
        let hw = width_deg / 2.0;
        let hh = height_deg / 2.0;
        let diag = hw.hypot(hh);
        let phi = hw.atan2(hh).to_degrees();
        let bearings = [
            rotation_deg + phi,
            rotation_deg + 180.0 - phi,
            rotation_deg + 180.0 + phi,
            rotation_deg - phi,
        ];
        let verts: Vec<V3> = bearings
            .iter()
            .map(|&b| offset_point(&center, diag, b))
            .collect::<Result<_>>()?;
        Self::from_vertices(&verts)
    }

    #[must_use]
    pub fn contains(&self, v: &V3) -> bool {
        self.edges.iter().all(|e| e.dot(v) >= 0.0)
    }

    /// Grows the polygon by tilting each edge plane outward by
    /// `radius_deg` (away from the `vsum` witness direction) and
    /// re-deriving vertices as the intersections of consecutive padded
    /// edges. This is a documented approximation: uniformly offsetting a
    /// great-circle edge by a constant angle produces a small circle,
    /// not another great circle, so an exact padded boundary cannot be
    /// represented in this polygon's great-circle-edge model.
    pub fn pad(&self, radius_deg: f64) -> Result<Self> {
        if radius_deg < 0.0 {
            return Err(Error::InvalidArgument(
                "pad radius must be non-negative".into(),
            ));
        }
        if radius_deg == 0.0 {
            return Self::from_vertices(&self.verts);
        }
        let r = radius_deg.to_radians();
        let witness = self.vsum.normalize()?;
        let new_edges: Vec<V3> = self
            .edges
            .iter()
            .map(|e| {
                let n = e.normalize().unwrap_or(*e);
                n.scale(r.cos()).sub(&witness.scale(r.sin()))
            })
            .collect();

        let n = new_edges.len();
        let mut new_verts = Vec::with_capacity(n);
        for i in 0..n {
            let e_prev = new_edges[(i + n - 1) % n];
            let e_cur = new_edges[i];
            let cross = e_prev.cross(&e_cur);
            if cross.norm2() < 1e-24 {
                return Err(Error::Degenerate(
                    "pad: adjacent edges became parallel".into(),
                ));
            }
            let cand = cross.normalize()?;
            let v = if cand.dot(&self.verts[i]) >= 0.0 {
                cand
            } else {
                cand.neg()
            };
            new_verts.push(v);
        }
        Self::from_vertices(&new_verts)
    }

    /// Best-effort axis-aligned (lon/lat) bounding box: the min/max
    /// longitude and latitude among the vertices, widened slightly isn't
    /// attempted for edges that bulge past their endpoints (e.g. an edge
    /// crossing a pole or the longitude wrap); callers needing an exact
    /// box should fall back to a full scan.
    #[must_use]
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        let mut lon_min = f64::INFINITY;
        let mut lon_max = f64::NEG_INFINITY;
        let mut lat_min = f64::INFINITY;
        let mut lat_max = f64::NEG_INFINITY;
        for v in &self.verts {
            if let Ok(sc) = crate::vec3::SphericalCoord::from_v3(v) {
                lon_min = lon_min.min(sc.lon_deg);
                lon_max = lon_max.max(sc.lon_deg);
                lat_min = lat_min.min(sc.lat_deg);
                lat_max = lat_max.max(sc.lat_deg);
            }
        }
        (lon_min, lon_max, lat_min, lat_max)
    }

    #[must_use]
    pub fn classify(&self, tri: &TriFrame) -> Coverage {
        let nin = tri.verts.iter().filter(|v| self.contains(v)).count();
        if nin == 3 {
            return Coverage::Inside;
        }
        if nin != 0 {
            return Coverage::Intersect;
        }
        let tri_edges = [
            (tri.verts[0], tri.verts[1], tri.edges[0]),
            (tri.verts[1], tri.verts[2], tri.edges[1]),
            (tri.verts[2], tri.verts[0], tri.edges[2]),
        ];
        for (v1, v2, n) in tri_edges {
            if isect_test(&v1, &v2, &n, self) {
                return Coverage::Intersect;
            }
        }
        if tri.edges.iter().all(|e| self.vsum.dot(e) >= 0.0) {
            Coverage::Contains
        } else {
            Coverage::Disjoint
        }
    }
}

/// The point `radius_deg` from `center` along the great circle through
/// `center` and its local north direction, then swung `bearing_deg`
/// degrees east of north around `center`.
fn offset_point(center: &V3, radius_deg: f64, bearing_deg: f64) -> Result<V3> {
    let (north, _east) = north_east_frame(center);
    let d = radius_deg.to_radians();
    let v0 = center.scale(d.cos()).add(&north.scale(d.sin())).normalize()?;
    Ok(crate::vec3::rotate_about(&v0, center, bearing_deg.to_radians()))
}

/// Tests whether the great-circle edge through `v1`, `v2` with plane
/// normal `n` crosses the polygon boundary, via a reduction to a 1D
/// line program: every polygon edge and the two planes through `n` and
/// each endpoint become a linear inequality `a*t + b >= 0` (or `<= 0`)
/// in a parameter `t` tracking position along the edge's great circle,
/// and the edge intersects the polygon iff the feasible region for `t`
/// (or its antipode) is non-empty.
fn isect_test(v1: &V3, v2: &V3, n: &V3, poly: &Polygon) -> bool {
    let c0 = n.cross(v1);
    let c1 = v2.cross(n);
    let nv = poly.verts.len();
    let mut ab = vec![0.0f64; 2 * (nv + 2)];

    if n.z != 0.0 {
        let s = if n.z > 0.0 { 1.0 } else { -1.0 };
        ab[0] = s * (c0.x * n.z - c0.z * n.x);
        ab[1] = s * (c0.y * n.z - c0.z * n.y);
        ab[2] = s * (c1.x * n.z - c1.z * n.x);
        ab[3] = s * (c1.y * n.z - c1.z * n.y);
        for i in 0..nv {
            let e = poly.edges[i];
            ab[2 * i + 4] = s * (e.x * n.z - e.z * n.x);
            ab[2 * i + 5] = s * (e.y * n.z - e.z * n.y);
        }
    } else if n.y != 0.0 {
        let s = if n.y > 0.0 { 1.0 } else { -1.0 };
        ab[0] = s * (c0.x * n.y - c0.y * n.x);
        ab[1] = s * (c0.z * n.y);
        ab[2] = s * (c1.x * n.y - c1.y * n.x);
        ab[3] = s * (c1.z * n.y);
        for i in 0..nv {
            let e = poly.edges[i];
            ab[2 * i + 4] = s * (e.x * n.y - e.y * n.x);
            ab[2 * i + 5] = s * (e.z * n.y);
        }
    } else if n.x != 0.0 {
        let s = if n.x > 0.0 { 1.0 } else { -1.0 };
        ab[0] = s * (c0.y * n.x);
        ab[1] = s * (c0.z * n.x);
        ab[2] = s * (c1.y * n.x);
        ab[3] = s * (c1.z * n.x);
        for i in 0..nv {
            let e = poly.edges[i];
            ab[2 * i + 4] = s * (e.y * n.x);
            ab[2 * i + 5] = s * (e.z * n.x);
        }
    } else {
        return false;
    }

    let inf = f64::INFINITY;
    let mut min1 = -inf;
    let mut max1 = inf;
    let mut minm1 = -inf;
    let mut maxm1 = inf;
    let mut neg = 0;
    let mut pos = 0;
    for i in 0..(nv + 2) {
        let a = ab[2 * i];
        let b = ab[2 * i + 1];
        if a == 0.0 {
            if b < 0.0 {
                min1 = inf;
                max1 = -inf;
            } else if b > 0.0 {
                minm1 = inf;
                maxm1 = -inf;
            }
        } else if a < 0.0 {
            neg += 1;
            let d = -b / a;
            if d < max1 {
                max1 = d;
            }
            if -d < maxm1 {
                maxm1 = -d;
            }
        } else {
            pos += 1;
            let d = -b / a;
            if d > min1 {
                min1 = d;
            }
            if -d > minm1 {
                minm1 = -d;
            }
        }
    }
    if min1 <= max1 || minm1 <= maxm1 {
        return true;
    }
    neg == 0 || pos == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deg(lon: f64, lat: f64) -> V3 {
        crate::vec3::SphericalCoord::new(lon, lat).to_v3()
    }

    #[test]
    fn square_from_vertices_contains_center() {
        let verts = vec![
            deg(-1.0, -1.0),
            deg(1.0, -1.0),
            deg(1.0, 1.0),
            deg(-1.0, 1.0),
        ];
        let p = Polygon::from_vertices(&verts).unwrap();
        assert!(p.contains(&deg(0.0, 0.0)));
        assert!(!p.contains(&deg(45.0, 45.0)));
    }

    #[test]
    fn non_convex_rejected() {
        let verts = vec![
            deg(-2.0, -2.0),
            deg(0.0, -0.1),
            deg(2.0, -2.0),
            deg(2.0, 2.0),
            deg(-2.0, 2.0),
        ];
        assert!(Polygon::from_vertices(&verts).is_err());
    }

    #[test]
    fn ngon_is_convex_and_contains_center() {
        let p = Polygon::from_ngon(deg(10.0, 20.0), 3.0, 6).unwrap();
        assert!(p.contains(&deg(10.0, 20.0)));
    }

    #[test]
    fn hull_of_square_matches_direct_construction() {
        let pts = vec![deg(-1.0, -1.0), deg(1.0, -1.0), deg(1.0, 1.0), deg(-1.0, 1.0)];
        let hull = Polygon::from_hull(&pts).unwrap();
        assert!(hull.contains(&deg(0.0, 0.0)));
        assert_eq!(hull.verts.len(), 4);
    }

    #[test]
    fn pad_grows_containment() {
        let verts = vec![
            deg(-1.0, -1.0),
            deg(1.0, -1.0),
            deg(1.0, 1.0),
            deg(-1.0, 1.0),
        ];
        let p = Polygon::from_vertices(&verts).unwrap();
        let padded = p.pad(2.0).unwrap();
        assert!(padded.contains(&deg(1.5, 0.0)));
        assert!(!p.contains(&deg(1.5, 0.0)));
    }

    #[test]
    fn box_contains_center() {
        let b = Polygon::from_box(deg(0.0, 0.0), 4.0, 2.0, 0.0).unwrap();
        assert!(b.contains(&deg(0.0, 0.0)));
    }
}
