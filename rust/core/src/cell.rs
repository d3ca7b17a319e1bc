// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cell topology
//!
//! Fixed-size cell kinds use the VTK point ordering, so hexahedron points
//! 0-3 are the bottom face and 4-7 the top face, wedge points 0-2 the bottom
//! triangle and 3-5 the top triangle, and pyramid point 4 the apex.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Point indices of a cell
pub type CellPoints = SmallVec<[u32; 8]>;

/// Point loop of a polyhedron face
pub type FacePoints = SmallVec<[u32; 4]>;

/// Cell type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Vertex,
    Line,
    Triangle,
    Quad,
    Polygon,
    Tetra,
    Pyramid,
    Wedge,
    Hexahedron,
    Polyhedron,
}

impl CellKind {
    /// Name as written in the native mesh format
    pub fn name(self) -> &'static str {
        match self {
            CellKind::Vertex => "vertex",
            CellKind::Line => "line",
            CellKind::Triangle => "triangle",
            CellKind::Quad => "quad",
            CellKind::Polygon => "polygon",
            CellKind::Tetra => "tetra",
            CellKind::Pyramid => "pyramid",
            CellKind::Wedge => "wedge",
            CellKind::Hexahedron => "hexahedron",
            CellKind::Polyhedron => "polyhedron",
        }
    }

    /// Topological dimension (0 for vertices up to 3 for solids)
    pub fn dimension(self) -> u8 {
        match self {
            CellKind::Vertex => 0,
            CellKind::Line => 1,
            CellKind::Triangle | CellKind::Quad | CellKind::Polygon => 2,
            CellKind::Tetra
            | CellKind::Pyramid
            | CellKind::Wedge
            | CellKind::Hexahedron
            | CellKind::Polyhedron => 3,
        }
    }

    /// Number of points for fixed-size kinds
    pub fn fixed_point_count(self) -> Option<usize> {
        match self {
            CellKind::Vertex => Some(1),
            CellKind::Line => Some(2),
            CellKind::Triangle => Some(3),
            CellKind::Quad | CellKind::Tetra => Some(4),
            CellKind::Pyramid => Some(5),
            CellKind::Wedge => Some(6),
            CellKind::Hexahedron => Some(8),
            CellKind::Polygon | CellKind::Polyhedron => None,
        }
    }

    /// True for triangles and tetrahedra
    pub fn is_simplex(self) -> bool {
        matches!(self, CellKind::Triangle | CellKind::Tetra)
    }

    /// VTK cell type id, used by the legacy writer
    pub fn vtk_id(self) -> u8 {
        match self {
            CellKind::Vertex => 1,
            CellKind::Line => 3,
            CellKind::Triangle => 5,
            CellKind::Polygon => 7,
            CellKind::Quad => 9,
            CellKind::Tetra => 10,
            CellKind::Hexahedron => 12,
            CellKind::Wedge => 13,
            CellKind::Pyramid => 14,
            CellKind::Polyhedron => 42,
        }
    }
}

/// A topological element referencing points of its mesh by index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub kind: CellKind,
    pub points: CellPoints,
    /// Face loops, only populated for `CellKind::Polyhedron`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faces: Vec<FacePoints>,
}

impl Cell {
    /// Create a cell of a fixed-size kind or a polygon
    pub fn new(kind: CellKind, points: &[u32]) -> Self {
        Self {
            kind,
            points: SmallVec::from_slice(points),
            faces: Vec::new(),
        }
    }

    #[inline]
    pub fn triangle(a: u32, b: u32, c: u32) -> Self {
        Self::new(CellKind::Triangle, &[a, b, c])
    }

    #[inline]
    pub fn tetra(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self::new(CellKind::Tetra, &[a, b, c, d])
    }

    /// Create a polyhedron from its face loops. The cell's point list is the
    /// set of distinct face points in first-seen order.
    pub fn polyhedron(faces: Vec<FacePoints>) -> Self {
        let mut points = CellPoints::new();
        for face in &faces {
            for &p in face {
                if !points.contains(&p) {
                    points.push(p);
                }
            }
        }
        Self {
            kind: CellKind::Polyhedron,
            points,
            faces,
        }
    }

    #[inline]
    pub fn dimension(&self) -> u8 {
        self.kind.dimension()
    }

    /// Face loops of a 3D cell with outward orientation for the fixed kinds
    pub fn face_loops(&self) -> Vec<FacePoints> {
        let p = &self.points;
        let face = |ids: &[usize]| -> FacePoints { ids.iter().map(|&i| p[i]).collect() };
        match self.kind {
            CellKind::Tetra => vec![
                face(&[0, 2, 1]),
                face(&[0, 1, 3]),
                face(&[1, 2, 3]),
                face(&[2, 0, 3]),
            ],
            CellKind::Pyramid => vec![
                face(&[0, 3, 2, 1]),
                face(&[0, 1, 4]),
                face(&[1, 2, 4]),
                face(&[2, 3, 4]),
                face(&[3, 0, 4]),
            ],
            CellKind::Wedge => vec![
                face(&[0, 1, 2]),
                face(&[3, 5, 4]),
                face(&[0, 3, 4, 1]),
                face(&[1, 4, 5, 2]),
                face(&[2, 5, 3, 0]),
            ],
            CellKind::Hexahedron => vec![
                face(&[0, 4, 7, 3]),
                face(&[1, 2, 6, 5]),
                face(&[0, 1, 5, 4]),
                face(&[3, 7, 6, 2]),
                face(&[0, 3, 2, 1]),
                face(&[4, 5, 6, 7]),
            ],
            CellKind::Polyhedron => self.faces.clone(),
            _ => Vec::new(),
        }
    }

    /// Check that the cell has a point count its kind allows
    pub fn has_valid_arity(&self) -> bool {
        match self.kind.fixed_point_count() {
            Some(n) => self.points.len() == n,
            None => match self.kind {
                CellKind::Polygon => self.points.len() >= 3,
                _ => !self.faces.is_empty() && self.faces.iter().all(|f| f.len() >= 3),
            },
        }
    }
}
