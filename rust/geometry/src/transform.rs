// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Composable affine transforms
//!
//! Builder calls compose in pre-multiply order: every call adds an operation
//! that is applied to points *before* the ones already present. Reading a
//! chain left to right therefore lists the operations from last-applied to
//! first-applied:
//!
//! ```rust,ignore
//! // p -> scale(rotate(p - center))
//! let t = AffineTransform::identity()
//!     .scale(Vector3::new(1.0 / sx, 1.0 / sy, 1.0 / sz))
//!     .rotate_z(rotation)
//!     .translate(-center.coords);
//! ```

use crate::error::{Error, Result};
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use rayon::prelude::*;
use urban_wind_core::{FieldArray, Mesh};

/// Name of the arrays treated as surface normals when transforming a mesh
pub const NORMALS: &str = "Normals";

/// Invertible linear map plus offset, stored as a homogeneous 4x4 matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix4<f64>,
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    pub fn from_matrix(matrix: Matrix4<f64>) -> Self {
        Self { matrix }
    }

    pub fn translation(offset: Vector3<f64>) -> Self {
        Self {
            matrix: Matrix4::new_translation(&offset),
        }
    }

    /// Rotation about +Z by `degrees`, counter-clockwise seen from above
    pub fn rotation_z(degrees: f64) -> Self {
        Self {
            matrix: Matrix4::from_axis_angle(&Vector3::z_axis(), degrees.to_radians()),
        }
    }

    /// Non-uniform scale
    pub fn scaling(factors: Vector3<f64>) -> Self {
        Self {
            matrix: Matrix4::new_nonuniform_scaling(&factors),
        }
    }

    /// `self ∘ other`: `other` is applied first
    pub fn compose(&self, other: &AffineTransform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    pub fn translate(self, offset: Vector3<f64>) -> Self {
        self.compose(&Self::translation(offset))
    }

    pub fn rotate_z(self, degrees: f64) -> Self {
        self.compose(&Self::rotation_z(degrees))
    }

    pub fn scale(self, factors: Vector3<f64>) -> Self {
        self.compose(&Self::scaling(factors))
    }

    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    #[inline]
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.matrix.transform_point(point)
    }

    /// Apply the linear part only
    #[inline]
    pub fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.matrix.transform_vector(vector)
    }

    /// Transform a surface normal with the inverse transpose of the linear
    /// part and renormalize. Degenerate input maps to the zero vector.
    pub fn transform_normal(&self, normal: &Vector3<f64>) -> Vector3<f64> {
        let linear: Matrix3<f64> = self.matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let mapped = match linear.try_inverse() {
            Some(inv) => inv.transpose() * normal,
            None => return Vector3::zeros(),
        };
        mapped.try_normalize(1e-12).unwrap_or_else(Vector3::zeros)
    }

    pub fn inverse(&self) -> Result<Self> {
        self.matrix
            .try_inverse()
            .map(Self::from_matrix)
            .ok_or_else(|| Error::NonInvertibleTransform(format!("{}", self.matrix)))
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Apply `transform` to every point of `mesh`. Arrays named [`NORMALS`] are
/// mapped as normals; all other arrays and the topology are carried through.
pub fn transform_mesh(mesh: &Mesh, transform: &AffineTransform) -> Mesh {
    let mut out = mesh.clone();
    out.points = mesh
        .points
        .par_iter()
        .map(|p| transform.transform_point(p))
        .collect();

    for attributes in [&mut out.point_data, &mut out.cell_data] {
        let mapped: Vec<Vector3<f64>> = match attributes.vector(NORMALS) {
            Some(normals) => normals
                .par_iter()
                .map(|n| transform.transform_normal(n))
                .collect(),
            None => continue,
        };
        attributes.insert(FieldArray::vector(NORMALS, mapped));
    }
    out
}

/// Offset a mesh vertically by `dz`
pub fn translate(mesh: &Mesh, dz: f64) -> Mesh {
    transform_mesh(mesh, &AffineTransform::translation(Vector3::new(0.0, 0.0, dz)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use urban_wind_core::Cell;

    #[test]
    fn test_chain_applies_last_call_first() {
        let t = AffineTransform::identity()
            .scale(Vector3::new(0.5, 0.5, 0.5))
            .translate(Vector3::new(-2.0, 0.0, 0.0));
        // (4 - 2) * 0.5
        let p = t.transform_point(&Point3::new(4.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_rotation_z_is_counter_clockwise() {
        let p = AffineTransform::rotation_z(90.0).transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = AffineTransform::identity()
            .scale(Vector3::new(1e-3, 1e-3, 2e-3))
            .rotate_z(28.5)
            .translate(Vector3::new(0.0, 0.0, -250.0));
        let p = Point3::new(120.0, -40.0, 30.0);
        let back = t.inverse().unwrap().transform_point(&t.transform_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_transform_has_no_inverse() {
        let t = AffineTransform::scaling(Vector3::new(1.0, 0.0, 1.0));
        assert!(matches!(t.inverse(), Err(Error::NonInvertibleTransform(_))));
    }

    #[test]
    fn test_normals_follow_nonuniform_scale() {
        let t = AffineTransform::scaling(Vector3::new(2.0, 1.0, 1.0));
        // Plane x + y = const
        let n = t.transform_normal(&Vector3::new(1.0, 1.0, 0.0).normalize());
        let expected = Vector3::new(0.5, 1.0, 0.0).normalize();
        assert_relative_eq!(n, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_translate_mesh_keeps_arrays() {
        let mut mesh = Mesh::new();
        mesh.push_point(Point3::new(0.0, 0.0, 0.0));
        mesh.push_point(Point3::new(1.0, 0.0, 0.0));
        mesh.push_point(Point3::new(0.0, 1.0, 0.0));
        mesh.push_cell(Cell::triangle(0, 1, 2));
        mesh.cell_data.insert(FieldArray::vector(NORMALS, vec![Vector3::z()]));
        mesh.point_data.insert(FieldArray::scalar("id", vec![0.0, 1.0, 2.0]));

        let moved = translate(&mesh, 10.0);
        assert_relative_eq!(moved.points[1], Point3::new(1.0, 0.0, 10.0));
        assert_eq!(moved.cells, mesh.cells);
        assert_eq!(moved.point_data, mesh.point_data);
        assert_relative_eq!(moved.cell_data.vector(NORMALS).unwrap()[0], Vector3::z());
    }
}
