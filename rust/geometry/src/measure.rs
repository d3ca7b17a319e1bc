// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cell measures: areas, volumes, centroids and face normals

use nalgebra::{Point3, Vector3};
use urban_wind_core::{Cell, CellKind, Mesh};

#[inline]
pub fn triangle_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    (b - a).cross(&(c - a)).norm() * 0.5
}

/// Signed volume, positive when `d` lies on the side `(b - a) x (c - a)`
/// points to
#[inline]
pub fn signed_tetra_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a))) / 6.0
}

#[inline]
pub fn tetra_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    signed_tetra_volume(a, b, c, d).abs()
}

/// Newell's method. The result is twice the area-weighted normal, so it
/// stays usable for non-planar and non-convex loops.
pub fn newell_normal(points: &[Point3<f64>], loop_ids: &[u32]) -> Vector3<f64> {
    let mut normal = Vector3::zeros();
    let n = loop_ids.len();
    for i in 0..n {
        let current = &points[loop_ids[i] as usize];
        let next = &points[loop_ids[(i + 1) % n] as usize];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal
}

/// Unit normal of a face loop, zero for degenerate loops
pub fn face_normal(points: &[Point3<f64>], loop_ids: &[u32]) -> Vector3<f64> {
    newell_normal(points, loop_ids)
        .try_normalize(1e-300)
        .unwrap_or_else(Vector3::zeros)
}

/// Arithmetic mean of the cell's points
pub fn cell_centroid(mesh: &Mesh, cell: &Cell) -> Point3<f64> {
    if cell.points.is_empty() {
        return Point3::origin();
    }
    let sum = cell
        .points
        .iter()
        .fold(Vector3::zeros(), |acc, &p| acc + mesh.points[p as usize].coords);
    Point3::from(sum / cell.points.len() as f64)
}

/// Length, area or volume depending on the cell's dimension
pub fn cell_size(mesh: &Mesh, cell: &Cell) -> f64 {
    let p = |i: usize| &mesh.points[cell.points[i] as usize];
    match cell.kind {
        CellKind::Vertex => 0.0,
        CellKind::Line => (p(1) - p(0)).norm(),
        CellKind::Triangle => triangle_area(p(0), p(1), p(2)),
        CellKind::Quad | CellKind::Polygon => newell_normal(&mesh.points, &cell.points).norm() * 0.5,
        CellKind::Tetra => tetra_volume(p(0), p(1), p(2), p(3)),
        CellKind::Pyramid | CellKind::Wedge | CellKind::Hexahedron | CellKind::Polyhedron => {
            closed_volume(mesh, cell)
        }
    }
}

/// Divergence-theorem volume over the outward face loops, fanned about the
/// cell centroid
fn closed_volume(mesh: &Mesh, cell: &Cell) -> f64 {
    let center = cell_centroid(mesh, cell);
    let mut volume = 0.0;
    for face in cell.face_loops() {
        let a = &mesh.points[face[0] as usize];
        for i in 1..face.len().saturating_sub(1) {
            let b = &mesh.points[face[i] as usize];
            let c = &mesh.points[face[i + 1] as usize];
            volume += signed_tetra_volume(&center, a, b, c);
        }
    }
    volume.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_cube() -> Mesh {
        let mut mesh = Mesh::new();
        for z in [0.0, 1.0] {
            for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                mesh.push_point(Point3::new(x, y, z));
            }
        }
        mesh.push_cell(Cell::new(CellKind::Hexahedron, &[0, 1, 2, 3, 4, 5, 6, 7]));
        mesh
    }

    #[test]
    fn test_simplex_measures() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let d = Point3::new(0.0, 0.0, 1.0);
        assert_relative_eq!(triangle_area(&a, &b, &c), 0.5);
        assert_relative_eq!(signed_tetra_volume(&a, &b, &c, &d), 1.0 / 6.0);
        assert_relative_eq!(signed_tetra_volume(&a, &c, &b, &d), -1.0 / 6.0);
        assert_relative_eq!(tetra_volume(&a, &c, &b, &d), 1.0 / 6.0);
    }

    #[test]
    fn test_hexahedron_volume_and_centroid() {
        let mesh = unit_cube();
        let cell = &mesh.cells[0];
        assert_relative_eq!(cell_size(&mesh, cell), 1.0, epsilon = 1e-12);
        assert_relative_eq!(cell_centroid(&mesh, cell), Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_face_normal_follows_winding() {
        let mesh = unit_cube();
        assert_relative_eq!(face_normal(&mesh.points, &[4, 5, 6, 7]), Vector3::z());
        assert_relative_eq!(face_normal(&mesh.points, &[0, 3, 2, 1]), -Vector3::z());
        assert_eq!(face_normal(&mesh.points, &[0, 0, 0]), Vector3::zeros());
    }

    #[test]
    fn test_quad_area() {
        let mesh = unit_cube();
        let quad = Cell::new(CellKind::Quad, &[0, 1, 5, 4]);
        assert_relative_eq!(cell_size(&mesh, &quad), 1.0, epsilon = 1e-12);
    }
}
