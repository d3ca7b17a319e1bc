// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Half-spaces and oriented boxes

use crate::transform::AffineTransform;
use nalgebra::{Point3, Vector3};

/// A plane through `origin` with unit `normal`. The kept side is the one the
/// normal points into. An optional transform maps query points from mesh
/// space into the plane's own frame before the test is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct HalfSpace {
    pub origin: Point3<f64>,
    pub normal: Vector3<f64>,
    transform: Option<AffineTransform>,
}

impl HalfSpace {
    /// Create a half-space in mesh coordinates
    pub fn new(origin: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            origin,
            normal: normal.try_normalize(1e-12).unwrap_or(normal),
            transform: None,
        }
    }

    /// Evaluate the plane in the frame reached by applying `transform` to
    /// mesh points
    pub fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn transform(&self) -> Option<&AffineTransform> {
        self.transform.as_ref()
    }

    /// Signed distance in the plane frame. Positive = kept side.
    #[inline]
    pub fn evaluate(&self, point: &Point3<f64>) -> f64 {
        let local = match &self.transform {
            Some(t) => t.transform_point(point),
            None => *point,
        };
        (local - self.origin).dot(&self.normal)
    }

    #[inline]
    pub fn is_inside(&self, point: &Point3<f64>) -> bool {
        self.evaluate(point) >= 0.0
    }
}

/// Box of extents `size` centred on `center`, turned clockwise about +Z by
/// `rotation` degrees when seen from above
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: Point3<f64>,
    pub size: Vector3<f64>,
    pub rotation: f64,
}

impl OrientedBox {
    pub fn new(center: Point3<f64>, size: Vector3<f64>, rotation: f64) -> Self {
        Self {
            center,
            size,
            rotation,
        }
    }

    /// A box with a zero or non-finite extent encloses nothing. A negative
    /// extent mirrors the local axis onto the same slab.
    pub fn is_degenerate(&self) -> bool {
        self.size.iter().any(|s| !s.is_finite() || *s == 0.0) || !self.rotation.is_finite()
    }

    /// Map from mesh space into the unit cube centred at the origin:
    /// translate by `-center`, rotate, then scale by `1 / size`
    pub fn transform(&self) -> AffineTransform {
        AffineTransform::identity()
            .scale(self.size.map(|s| 1.0 / s))
            .rotate_z(self.rotation)
            .translate(-self.center.coords)
    }

    /// The six inward-facing planes at +-0.5 along each local axis, in
    /// clipping order -X, +X, -Y, +Y, -Z, +Z
    pub fn planes(&self) -> [HalfSpace; 6] {
        let t = self.transform();
        let plane = |origin: [f64; 3], normal: [f64; 3]| {
            HalfSpace::new(Point3::from(origin), Vector3::from(normal)).with_transform(t)
        };
        [
            plane([-0.5, 0.0, 0.0], [1.0, 0.0, 0.0]),
            plane([0.5, 0.0, 0.0], [-1.0, 0.0, 0.0]),
            plane([0.0, -0.5, 0.0], [0.0, 1.0, 0.0]),
            plane([0.0, 0.5, 0.0], [0.0, -1.0, 0.0]),
            plane([0.0, 0.0, -0.5], [0.0, 0.0, 1.0]),
            plane([0.0, 0.0, 0.5], [0.0, 0.0, -1.0]),
        ]
    }

    /// Closed containment test
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        !self.is_degenerate() && self.planes().iter().all(|p| p.is_inside(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn city_box() -> OrientedBox {
        OrientedBox::new(
            Point3::new(0.0, 0.0, 250.0),
            Vector3::new(1000.0, 1000.0, 500.0),
            28.5,
        )
    }

    #[test]
    fn test_half_space_sign() {
        let plane = HalfSpace::new(Point3::new(0.0, 0.0, 1.0), Vector3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(plane.evaluate(&Point3::new(5.0, 5.0, 3.0)), 2.0);
        assert!(!plane.is_inside(&Point3::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_center_maps_to_origin() {
        let b = city_box();
        let local = b.transform().transform_point(&b.center);
        assert_relative_eq!(local, Point3::origin(), epsilon = 1e-12);
        assert!(b.contains(&b.center));
    }

    #[test]
    fn test_corners_of_rotated_box() {
        let b = city_box();
        // Clockwise turn of the local +X axis seen from above
        let angle = (-28.5f64).to_radians();
        let axis_x = Vector3::new(angle.cos(), angle.sin(), 0.0);
        let inside = b.center + axis_x * 499.0;
        let outside = b.center + axis_x * 501.0;
        assert!(b.contains(&inside));
        assert!(!b.contains(&outside));

        // An unrotated box would contain this point, the rotated one does not
        let corner = Point3::new(495.0, 495.0, 250.0);
        assert!(!b.contains(&corner));
    }

    #[test]
    fn test_vertical_extent() {
        let b = city_box();
        assert!(b.contains(&Point3::new(0.0, 0.0, 1.0)));
        assert!(b.contains(&Point3::new(0.0, 0.0, 499.0)));
        assert!(!b.contains(&Point3::new(0.0, 0.0, 501.0)));
        assert!(!b.contains(&Point3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn test_negative_extent_mirrors() {
        let b = city_box();
        let mirrored = OrientedBox::new(b.center, Vector3::new(-1000.0, 1000.0, -500.0), b.rotation);
        assert!(!mirrored.is_degenerate());
        for p in [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(300.0, -200.0, 400.0),
            Point3::new(495.0, 495.0, 250.0),
            Point3::new(0.0, 0.0, 501.0),
        ] {
            assert_eq!(mirrored.contains(&p), b.contains(&p), "{p}");
        }
    }

    #[test]
    fn test_degenerate_box_contains_nothing() {
        let b = OrientedBox::new(Point3::origin(), Vector3::new(1.0, 0.0, 1.0), 0.0);
        assert!(b.is_degenerate());
        assert!(!b.contains(&Point3::origin()));
    }
}
