//! Region shapes: circle, ellipse, and convex polygon, unified behind a
//! single [`Shape`] so range covering and tree search don't need to know
//! which concrete shape they're querying against.

pub mod circle;
pub mod ellipse;
pub mod polygon;

pub use circle::Circle;
pub use ellipse::Ellipse;
pub use polygon::Polygon;

use crate::coverage::Coverage;
use crate::trixel::TriFrame;
use crate::vec3::V3;

/// A region on the sphere, in one of the three supported shapes.
#[derive(Debug, Clone)]
pub enum Shape {
    Circle(Circle),
    Ellipse(Ellipse),
    Polygon(Polygon),
}

impl Shape {
    #[must_use]
    pub fn contains(&self, v: &V3) -> bool {
        match self {
            Shape::Circle(c) => c.contains(v),
            Shape::Ellipse(e) => e.contains(v),
            Shape::Polygon(p) => p.contains(v),
        }
    }

    #[must_use]
    pub fn classify(&self, tri: &TriFrame) -> Coverage {
        match self {
            Shape::Circle(c) => c.classify(tri),
            Shape::Ellipse(e) => e.classify(tri),
            Shape::Polygon(p) => p.classify(tri),
        }
    }
}

impl From<Circle> for Shape {
    fn from(value: Circle) -> Self {
        Shape::Circle(value)
    }
}

impl From<Ellipse> for Shape {
    fn from(value: Ellipse) -> Self {
        Shape::Ellipse(value)
    }
}

impl From<Polygon> for Shape {
    fn from(value: Polygon) -> Self {
        Shape::Polygon(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3::SphericalCoord;

    #[test]
    fn shape_dispatch_matches_concrete_type() {
        let center = SphericalCoord::new(0.0, 0.0).to_v3();
        let circle: Shape = Circle::new(center, 5.0).unwrap().into();
        assert!(circle.contains(&center));

        let ellipse: Shape = Ellipse::new(center, 5.0, 2.0, 0.0).unwrap().into();
        assert!(ellipse.contains(&center));
    }
}
