use crate::coverage::Coverage;
use crate::error::{Error, Result};
use crate::trixel::TriFrame;
use crate::vec3::{north_east_frame, V3};

/// A spherical ellipse: a symmetric 3x3 quadratic form `M` such that a
/// unit vector `v` is on the boundary iff `v' M v == 0`, inside iff
/// `v' M v <= 0 && v.center >= 0` (or `a >= 90 deg`, the whole-hemisphere
/// case). Stored as the 6 independent entries of `M` plus the center and
/// semi-major axis for fast membership tests and for `a >= 90` handling.
#[derive(Debug, Clone, Copy)]
pub struct Ellipse {
    pub xx: f64,
    pub yy: f64,
    pub zz: f64,
    pub xy: f64,
    pub xz: f64,
    pub yz: f64,
    pub center: V3,
    /// Semi-major axis, degrees.
    pub a_deg: f64,
}

impl Ellipse {
    /// Builds the quadratic form for an ellipse centered at `center`
    /// (unit vector) with semi-major axis `a_deg` along the direction
    /// `position_angle_deg` east of north, and semi-minor axis `b_deg`.
    ///
    /// Construction: in the local (north, east) tangent frame at
    /// `center`, let `u` be the major-axis direction and `w` the
    /// minor-axis direction (orthogonal, rotated 90 degrees from `u`).
    /// `M = (1/sin^2 a) u u' + (1/sin^2 b) w w' - center center'`. Near
    /// `center` this reduces to the small-ellipse gnomonic boundary
    /// `(v.u)^2/sin^2(a) + (v.w)^2/sin^2(b) == (v.center)^2`, the
    /// standard on-sky error-ellipse convention; `a >= b` is required.
    pub fn new(center: V3, a_deg: f64, b_deg: f64, position_angle_deg: f64) -> Result<Self> {
        if !(a_deg > 0.0 && a_deg <= 180.0) || !(b_deg > 0.0 && b_deg <= 180.0) {
            return Err(Error::InvalidArgument(
                "ellipse axes must be in (0, 180] degrees".into(),
            ));
        }
        if a_deg < b_deg {
            return Err(Error::InvalidArgument(
                "ellipse semi-major axis must be >= semi-minor axis".into(),
            ));
        }
        let center = center.normalize()?;
        let (north, east) = north_east_frame(&center);
        let pa = position_angle_deg.to_radians();
        let u = north.scale(pa.cos()).add(&east.scale(pa.sin()));
        let w = north.scale(-pa.sin()).add(&east.scale(pa.cos()));

        let inv_sin2_a = if a_deg >= 180.0 {
            0.0
        } else {
            1.0 / a_deg.to_radians().sin().powi(2)
        };
        let inv_sin2_b = 1.0 / b_deg.to_radians().sin().powi(2);

        let outer = |v: &V3, scale: f64| {
            (
                scale * v.x * v.x,
                scale * v.y * v.y,
                scale * v.z * v.z,
                scale * v.x * v.y,
                scale * v.x * v.z,
                scale * v.y * v.z,
            )
        };
        let (uxx, uyy, uzz, uxy, uxz, uyz) = outer(&u, inv_sin2_a);
        let (wxx, wyy, wzz, wxy, wxz, wyz) = outer(&w, inv_sin2_b);
        let (cxx, cyy, czz, cxy, cxz, cyz) = outer(&center, 1.0);

        Ok(Self {
            xx: uxx + wxx - cxx,
            yy: uyy + wyy - cyy,
            zz: uzz + wzz - czz,
            xy: uxy + wxy - cxy,
            xz: uxz + wxz - cxz,
            yz: uyz + wyz - cyz,
            center,
            a_deg,
        })
    }

    /// Evaluates `v' M v`.
    #[must_use]
    pub fn quad_form(&self, v: &V3) -> f64 {
        v.x * v.x * self.xx
            + v.y * v.y * self.yy
            + v.z * v.z * self.zz
            + 2.0 * v.x * v.y * self.xy
            + 2.0 * v.x * v.z * self.xz
            + 2.0 * v.y * v.z * self.yz
    }

    #[must_use]
    pub fn contains(&self, v: &V3) -> bool {
        self.quad_form(v) <= 0.0 && v.dot(&self.center) >= 0.0
    }

    /// Tests whether the edge between `v1` and `v2` intersects the
    /// ellipse boundary, via the `(v1+v2, v2-v1)` basis quadratic
    /// reduction: solve `c22*b^2 + 2*c21*b + c11 == 0` for `b in [-1,1]`
    /// and check the corresponding direction lies in the center's
    /// hemisphere (or `a >= 90`, in which case any root on the edge
    /// counts, matching `_htm_s2ellipse_isect`).
    #[must_use]
    pub fn edge_intersects(&self, v1: &V3, v2: &V3) -> bool {
        let e1 = v1.add(v2);
        let e2 = v2.sub(v1);
        let q = |v: &V3| self.quad_form(v);
        let bilinear = |a: &V3, b: &V3| {
            a.x * b.x * self.xx
                + a.y * b.y * self.yy
                + a.z * b.z * self.zz
                + (a.x * b.y + a.y * b.x) * self.xy
                + (a.x * b.z + a.z * b.x) * self.xz
                + (a.y * b.z + a.z * b.y) * self.yz
        };
        let c11 = q(&e1);
        let c22 = q(&e2);
        let c21 = bilinear(&e2, &e1);
        let in_hemisphere = |b: f64| -> bool {
            if self.a_deg >= 90.0 {
                return true;
            }
            let v = e2.scale(b).add(&e1);
            v.dot(&self.center) >= 0.0
        };

        if c11 == 0.0 {
            if self.a_deg >= 90.0 || e1.dot(&self.center) >= 0.0 {
                return true;
            }
            if c22 == 0.0 || c22.abs() < (2.0 * c21).abs() {
                return false;
            }
            return in_hemisphere(-2.0 * c21 / c22);
        }
        if c22 == 0.0 {
            if c21 == 0.0 {
                return false;
            }
            if c11.abs() <= (2.0 * c21).abs() {
                return in_hemisphere(-0.5 * c11 / c21);
            }
            return false;
        }
        let delta = c21 * c21 - c11 * c22;
        if delta < 0.0 {
            return false;
        }
        let delta = delta.sqrt();
        if c22.abs() >= (delta - c21).abs() {
            return in_hemisphere((delta - c21) / c22);
        }
        if c22.abs() >= (delta + c21).abs() {
            return in_hemisphere(-(delta + c21) / c22);
        }
        false
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
        if self.edge_intersects(&tri.verts[0], &tri.verts[1])
            || self.edge_intersects(&tri.verts[1], &tri.verts[2])
            || self.edge_intersects(&tri.verts[2], &tri.verts[0])
        {
            return Coverage::Intersect;
        }
        if tri.edges.iter().all(|e| self.center.dot(e) >= 0.0) {
            Coverage::Contains
        } else {
            Coverage::Disjoint
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_is_inside() {
        let center = V3::new(1.0, 0.0, 0.0);
        let e = Ellipse::new(center, 5.0, 2.0, 0.0).unwrap();
        assert!(e.contains(&center));
    }

    #[test]
    fn far_point_is_outside() {
        let center = V3::new(1.0, 0.0, 0.0);
        let e = Ellipse::new(center, 5.0, 2.0, 0.0).unwrap();
        assert!(!e.contains(&V3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn rejects_major_less_than_minor() {
        assert!(Ellipse::new(V3::new(1.0, 0.0, 0.0), 1.0, 2.0, 0.0).is_err());
    }
}
