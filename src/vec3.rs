//! 3-vector and spherical-coordinate arithmetic on the unit sphere.

use crate::error::{Error, Result};

/// An ordered triple of finite doubles. May be non-unit except where a
/// unit vector is contractually required (documented per call site).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct V3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl V3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const ZERO: V3 = V3::new(0.0, 0.0, 0.0);

    #[must_use]
    pub fn dot(&self, other: &V3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[must_use]
    pub fn cross(&self, other: &V3) -> V3 {
        V3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Cross product with reversed operand order (`other x self`), matching
    /// the source's `htm_v3_rcross`: used when building edge-plane normals
    /// so that right-handedness is preserved under the library's winding
    /// convention.
    #[must_use]
    pub fn rcross(&self, other: &V3) -> V3 {
        other.cross(self)
    }

    #[must_use]
    pub fn add(&self, other: &V3) -> V3 {
        V3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    #[must_use]
    pub fn sub(&self, other: &V3) -> V3 {
        V3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    #[must_use]
    pub fn scale(&self, s: f64) -> V3 {
        V3::new(self.x * s, self.y * s, self.z * s)
    }

    #[must_use]
    pub fn neg(&self) -> V3 {
        V3::new(-self.x, -self.y, -self.z)
    }

    #[must_use]
    pub fn norm2(&self) -> f64 {
        self.dot(self)
    }

    #[must_use]
    pub fn norm(&self) -> f64 {
        self.norm2().sqrt()
    }

    /// Normalizes the vector to unit length. Fails if the vector is null
    /// (norm not finite and positive).
    pub fn normalize(&self) -> Result<V3> {
        let n = self.norm();
        if !(n > 0.0) || !n.is_finite() {
            return Err(Error::NullInput("V3::normalize on a null vector"));
        }
        Ok(self.scale(1.0 / n))
    }

    /// The normalized average of two input vertices: `sv = (v1+v2)/|v1+v2|`.
    /// Used for HTM edge midpoints.
    pub fn midpoint(v1: &V3, v2: &V3) -> Result<V3> {
        v1.add(v2).normalize()
    }

    /// Angular separation in radians between two (not necessarily unit)
    /// vectors, via the numerically stable half-angle formula.
    #[must_use]
    pub fn angsep(&self, other: &V3) -> f64 {
        let a = self.normalize().unwrap_or(*self);
        let b = other.normalize().unwrap_or(*other);
        let cross = a.cross(&b).norm();
        let dot = a.dot(&b);
        cross.atan2(dot)
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Longitude/latitude, in degrees, with longitude reduced to `[0, 360)`
/// and latitude clamped to `[-90, 90]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalCoord {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl SphericalCoord {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon_deg: reduce_lon(lon_deg),
            lat_deg: lat_deg.clamp(-90.0, 90.0),
        }
    }

    /// Converts to a unit vector.
    #[must_use]
    pub fn to_v3(&self) -> V3 {
        let lon = self.lon_deg.to_radians();
        let lat = self.lat_deg.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        V3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
    }

    /// Converts a unit vector back to spherical coordinates.
    pub fn from_v3(v: &V3) -> Result<Self> {
        let v = v.normalize()?;
        let lat = v.z.clamp(-1.0, 1.0).asin().to_degrees();
        let lon = v.y.atan2(v.x).to_degrees();
        Ok(Self::new(lon, lat))
    }
}

fn reduce_lon(lon: f64) -> f64 {
    let r = lon % 360.0;
    if r < 0.0 {
        r + 360.0
    } else {
        r
    }
}

/// Rotates `v` about `axis` (not required to be unit) by `angle_rad`
/// radians using Rodrigues' rotation formula; used to build the
/// north/east local tangent frame and for regular n-gon construction.
#[must_use]
pub fn rotate_about(v: &V3, axis: &V3, angle_rad: f64) -> V3 {
    let k = axis.normalize().unwrap_or(*axis);
    let (s, c) = angle_rad.sin_cos();
    let term1 = v.scale(c);
    let term2 = k.cross(v).scale(s);
    let term3 = k.scale(k.dot(v) * (1.0 - c));
    term1.add(&term2).add(&term3)
}

/// The local (north, east) orthonormal tangent frame at unit vector `v`:
/// `north` points toward increasing latitude, `east` toward increasing
/// longitude. Degenerates gracefully at the poles by picking an arbitrary
/// east direction.
#[must_use]
pub fn north_east_frame(v: &V3) -> (V3, V3) {
    let z_axis = V3::new(0.0, 0.0, 1.0);
    let east = z_axis.cross(v);
    let east = east.normalize().unwrap_or(V3::new(1.0, 0.0, 0.0));
    let north = east.cross(v).normalize().unwrap_or(V3::new(0.0, 1.0, 0.0));
    (north, east)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_spherical() {
        for (lon, lat) in [(0.0, 0.0), (90.0, 45.0), (270.0, -30.0), (10.0, 89.9)] {
            let sc = SphericalCoord::new(lon, lat);
            let v = sc.to_v3();
            let back = SphericalCoord::from_v3(&v).unwrap();
            assert!((back.lon_deg - sc.lon_deg).abs() < 1e-9 || (sc.lat_deg.abs() - 90.0).abs() < 1e-6);
            assert!((back.lat_deg - sc.lat_deg).abs() < 1e-9);
        }
    }

    #[test]
    fn lon_reduction() {
        assert!((SphericalCoord::new(-10.0, 0.0).lon_deg - 350.0).abs() < 1e-12);
        assert!((SphericalCoord::new(370.0, 0.0).lon_deg - 10.0).abs() < 1e-12);
    }

    #[test]
    fn angsep_basic() {
        let a = V3::new(1.0, 0.0, 0.0);
        let b = V3::new(0.0, 1.0, 0.0);
        assert!((a.angsep(&b) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn cross_anticommutes() {
        let a = V3::new(1.0, 2.0, 3.0);
        let b = V3::new(-1.0, 0.5, 4.0);
        let c1 = a.cross(&b);
        let c2 = b.cross(&a).neg();
        assert!((c1.x - c2.x).abs() < 1e-12);
        assert!((c1.y - c2.y).abs() < 1e-12);
        assert!((c1.z - c2.z).abs() < 1e-12);
    }
}
