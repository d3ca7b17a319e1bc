// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Half-space clipping of simplicial meshes
//!
//! Cells entirely on the kept side pass through, cells entirely outside are
//! dropped, and straddling cells are re-tessellated so the new boundary lies
//! on the plane. Cut points are created once per cut edge and shared between
//! neighbouring cells; their values are linearly interpolated along the edge.

use crate::measure::{newell_normal, signed_tetra_volume};
use crate::plane::{HalfSpace, OrientedBox};
use crate::topology::{simplexify, split_pyramid, split_quad, split_wedge};
use nalgebra::Point3;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use urban_wind_core::{Cell, CellKind, Mesh};

/// Plane values within this distance of zero count as on the plane. Points
/// created by a cut evaluate to roughly zero, so clipping again against the
/// same plane keeps every cell.
pub const CLASSIFY_EPSILON: f64 = 1e-9;

/// A point of a clipped cell: an input point or the cut point on an edge.
/// Edge endpoints are stored in ascending order. The derived ordering is used
/// to pick split diagonals consistently across neighbouring cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Node {
    Input(u32),
    Cut(u32, u32),
}

impl Node {
    fn cut(a: u32, b: u32) -> Self {
        if a < b {
            Node::Cut(a, b)
        } else {
            Node::Cut(b, a)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    In,
    On,
    Out,
}

fn classify(value: f64) -> Side {
    if value > CLASSIFY_EPSILON {
        Side::In
    } else if value < -CLASSIFY_EPSILON {
        Side::Out
    } else {
        Side::On
    }
}

/// Result of clipping a single cell
enum Fragment {
    Keep,
    Drop,
    Split(SmallVec<[SmallVec<[Node; 4]>; 3]>),
}

struct Cutter<'a> {
    points: &'a [Point3<f64>],
    values: &'a [f64],
}

impl Cutter<'_> {
    /// Interpolation parameter from the lower to the higher index of a cut
    /// edge, computed from the ordered pair so both neighbours agree
    fn parameter(&self, a: u32, b: u32) -> f64 {
        let fa = self.values[a as usize];
        let fb = self.values[b as usize];
        let denom = fa - fb;
        if denom.abs() < f64::MIN_POSITIVE {
            0.5
        } else {
            (fa / denom).clamp(0.0, 1.0)
        }
    }

    fn position(&self, node: Node) -> Point3<f64> {
        match node {
            Node::Input(i) => self.points[i as usize],
            Node::Cut(a, b) => {
                let t = self.parameter(a, b);
                let pa = self.points[a as usize];
                let pb = self.points[b as usize];
                pa + (pb - pa) * t
            }
        }
    }

    fn clip(&self, cell: &Cell) -> Fragment {
        let mut inside: SmallVec<[u32; 4]> = SmallVec::new();
        let mut on: SmallVec<[u32; 4]> = SmallVec::new();
        let mut outside: SmallVec<[u32; 4]> = SmallVec::new();
        for &p in &cell.points {
            match classify(self.values[p as usize]) {
                Side::In => inside.push(p),
                Side::On => on.push(p),
                Side::Out => outside.push(p),
            }
        }

        if outside.is_empty() {
            return Fragment::Keep;
        }
        if inside.is_empty() {
            return Fragment::Drop;
        }

        let pieces = match cell.kind {
            CellKind::Tetra => self.split_tetra(&inside, &on, &outside),
            CellKind::Triangle => self.split_triangle(cell, &inside, &on, &outside),
            CellKind::Line => {
                let mut piece = SmallVec::new();
                piece.push(Node::Input(inside[0]));
                piece.push(Node::cut(inside[0], outside[0]));
                let mut pieces = SmallVec::new();
                pieces.push(piece);
                pieces
            }
            _ => return Fragment::Drop,
        };
        Fragment::Split(pieces)
    }

    fn split_tetra(
        &self,
        inside: &[u32],
        on: &[u32],
        outside: &[u32],
    ) -> SmallVec<[SmallVec<[Node; 4]>; 3]> {
        let input = |p: u32| Node::Input(p);
        let mut tets: SmallVec<[[Node; 4]; 3]> = SmallVec::new();

        match (inside.len(), outside.len()) {
            // One corner survives, possibly joined by corners lying on the plane
            (1, _) => {
                let mut tet: SmallVec<[Node; 4]> = SmallVec::new();
                tet.push(input(inside[0]));
                tet.extend(on.iter().map(|&p| input(p)));
                tet.extend(outside.iter().map(|&p| Node::cut(inside[0], p)));
                if let Ok(tet) = tet.into_inner() {
                    tets.push(tet);
                }
            }
            // Two kept, two cut: a wedge between the kept edge and the cut face
            (2, 2) => {
                let [a, b] = [inside[0], inside[1]];
                let [c, d] = [outside[0], outside[1]];
                tets.extend(split_wedge([
                    input(a),
                    Node::cut(a, c),
                    Node::cut(a, d),
                    input(b),
                    Node::cut(b, c),
                    Node::cut(b, d),
                ]));
            }
            // Two kept, one on the plane: a pyramid with its apex on the plane
            (2, 1) => {
                let [a, b] = [inside[0], inside[1]];
                let c = outside[0];
                tets.extend(split_pyramid(
                    [input(a), input(b), Node::cut(b, c), Node::cut(a, c)],
                    input(on[0]),
                ));
            }
            // Three kept: the tetrahedron minus a corner is a wedge
            (3, 1) => {
                let d = outside[0];
                let [a, b, c] = [inside[0], inside[1], inside[2]];
                tets.extend(split_wedge([
                    input(a),
                    input(b),
                    input(c),
                    Node::cut(a, d),
                    Node::cut(b, d),
                    Node::cut(c, d),
                ]));
            }
            _ => {}
        }

        tets.into_iter()
            .filter(|t| !has_repeats(t))
            .map(|t| {
                let p = t.map(|n| self.position(n));
                if signed_tetra_volume(&p[0], &p[1], &p[2], &p[3]) < 0.0 {
                    SmallVec::from_slice(&[t[0], t[2], t[1], t[3]])
                } else {
                    SmallVec::from_slice(&t)
                }
            })
            .collect()
    }

    fn split_triangle(
        &self,
        cell: &Cell,
        inside: &[u32],
        on: &[u32],
        outside: &[u32],
    ) -> SmallVec<[SmallVec<[Node; 4]>; 3]> {
        let input = |p: u32| Node::Input(p);
        let mut triangles: SmallVec<[[Node; 3]; 2]> = SmallVec::new();

        match (inside.len(), outside.len()) {
            (1, 2) => {
                let a = inside[0];
                triangles.push([input(a), Node::cut(a, outside[0]), Node::cut(a, outside[1])]);
            }
            (1, 1) => {
                let a = inside[0];
                triangles.push([input(a), input(on[0]), Node::cut(a, outside[0])]);
            }
            (2, 1) => {
                let [a, b] = [inside[0], inside[1]];
                let c = outside[0];
                triangles.extend(split_quad([
                    input(a),
                    input(b),
                    Node::cut(b, c),
                    Node::cut(a, c),
                ]));
            }
            _ => {}
        }

        // Keep the parent's winding
        let reference = newell_normal(self.points, &cell.points);
        triangles
            .into_iter()
            .filter(|t| !has_repeats(t))
            .map(|t| {
                let p = t.map(|n| self.position(n));
                let normal = (p[1] - p[0]).cross(&(p[2] - p[0]));
                if normal.dot(&reference) < 0.0 {
                    SmallVec::from_slice(&[t[0], t[2], t[1]])
                } else {
                    SmallVec::from_slice(&t)
                }
            })
            .collect()
    }
}

fn has_repeats(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .enumerate()
        .any(|(i, n)| nodes[i + 1..].contains(n))
}

fn kind_for(len: usize) -> CellKind {
    match len {
        2 => CellKind::Line,
        3 => CellKind::Triangle,
        _ => CellKind::Tetra,
    }
}

/// Keep the part of `mesh` on the kept side of `plane`. Non-simplex cells are
/// decomposed first. Point arrays are interpolated at cut points, cell arrays
/// are copied from the parent cell.
pub fn clip_half_space(mesh: &Mesh, plane: &HalfSpace) -> Mesh {
    if mesh.cells.iter().any(|c| !is_clippable(c.kind)) {
        return clip_half_space(&simplexify(mesh), plane);
    }

    // PHASE 1: Evaluate the plane at every point
    let values: Vec<f64> = mesh.points.par_iter().map(|p| plane.evaluate(p)).collect();

    // PHASE 2: Clip each cell independently
    let cutter = Cutter {
        points: &mesh.points,
        values: &values,
    };
    let fragments: Vec<Fragment> = mesh.cells.par_iter().map(|c| cutter.clip(c)).collect();

    // PHASE 3: Sequential - number points in order of first use, in cell order
    let mut out = Mesh {
        points: Vec::new(),
        cells: Vec::new(),
        point_data: mesh.point_data.empty_like(0),
        cell_data: mesh.cell_data.empty_like(0),
    };
    let mut input_ids = vec![u32::MAX; mesh.points.len()];
    let mut cut_ids: FxHashMap<(u32, u32), u32> = FxHashMap::default();
    let mut split_cells = 0usize;

    let mut resolve = |node: Node, out: &mut Mesh| -> u32 {
        match node {
            Node::Input(i) => {
                let slot = &mut input_ids[i as usize];
                if *slot == u32::MAX {
                    *slot = out.push_point(mesh.points[i as usize]);
                    out.point_data.push_row(&mesh.point_data, i as usize);
                }
                *slot
            }
            Node::Cut(a, b) => *cut_ids.entry((a, b)).or_insert_with(|| {
                let t = cutter.parameter(a, b);
                let id = out.push_point(cutter.position(node));
                out.point_data
                    .push_interpolated(&mesh.point_data, &[(a as usize, 1.0 - t), (b as usize, t)]);
                id
            }),
        }
    };

    for (cell_index, (cell, fragment)) in mesh.cells.iter().zip(fragments).enumerate() {
        match fragment {
            Fragment::Drop => {}
            Fragment::Keep => {
                let mut kept = cell.clone();
                for p in kept.points.iter_mut() {
                    *p = resolve(Node::Input(*p), &mut out);
                }
                out.push_cell(kept);
                out.cell_data.push_row(&mesh.cell_data, cell_index);
            }
            Fragment::Split(pieces) => {
                split_cells += 1;
                for piece in pieces {
                    let ids: SmallVec<[u32; 4]> =
                        piece.iter().map(|&n| resolve(n, &mut out)).collect();
                    out.push_cell(Cell::new(kind_for(ids.len()), &ids));
                    out.cell_data.push_row(&mesh.cell_data, cell_index);
                }
            }
        }
    }

    tracing::debug!(
        input_cells = mesh.cell_count(),
        split_cells,
        output_cells = out.cell_count(),
        output_points = out.point_count(),
        "Clipped mesh against half-space"
    );
    out
}

fn is_clippable(kind: CellKind) -> bool {
    matches!(
        kind,
        CellKind::Vertex | CellKind::Line | CellKind::Triangle | CellKind::Tetra
    )
}

/// Keep the part of `mesh` inside `bounds` by clipping against its six planes
/// one after another. A degenerate box yields an empty mesh that still
/// carries the input's array names.
pub fn clip_to_oriented_box(mesh: &Mesh, bounds: &OrientedBox) -> Mesh {
    if bounds.is_degenerate() {
        tracing::warn!(
            size = ?bounds.size,
            rotation = bounds.rotation,
            "Clip box has no volume; result is empty"
        );
        return Mesh {
            points: Vec::new(),
            cells: Vec::new(),
            point_data: mesh.point_data.empty_like(0),
            cell_data: mesh.cell_data.empty_like(0),
        };
    }

    let mut current = if mesh.cells.iter().all(|c| is_clippable(c.kind)) {
        mesh.clone()
    } else {
        simplexify(mesh)
    };
    for (index, plane) in bounds.planes().iter().enumerate() {
        current = clip_half_space(&current, plane);
        tracing::debug!(plane = index + 1, cells = current.cell_count(), "Applied clip plane");
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::cell_size;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use urban_wind_core::FieldArray;

    fn unit_tetra() -> Mesh {
        let mut mesh = Mesh::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] {
            mesh.push_point(Point3::from(p));
        }
        mesh.push_cell(Cell::tetra(0, 1, 2, 3));
        mesh.point_data
            .insert(FieldArray::scalar("z", vec![0.0, 0.0, 0.0, 1.0]));
        mesh.cell_data.insert(FieldArray::scalar("id", vec![7.0]));
        mesh
    }

    fn volume(mesh: &Mesh) -> f64 {
        mesh.cells.iter().map(|c| cell_size(mesh, c)).sum()
    }

    fn below(height: f64) -> HalfSpace {
        HalfSpace::new(Point3::new(0.0, 0.0, height), -Vector3::z())
    }

    #[test]
    fn test_keep_and_drop_whole_cells() {
        let mesh = unit_tetra();
        assert_eq!(clip_half_space(&mesh, &below(2.0)), mesh);
        let empty = clip_half_space(&mesh, &below(-1.0));
        assert!(empty.is_empty());
        assert!(empty.point_data.contains("z"));
        assert!(empty.cell_data.contains("id"));
    }

    #[test]
    fn test_corner_cut_keeps_small_tetra() {
        // Only the apex is above z = 0.5
        let mesh = unit_tetra();
        let above = HalfSpace::new(Point3::new(0.0, 0.0, 0.5), Vector3::z());
        let clipped = clip_half_space(&mesh, &above);
        assert_eq!(clipped.cell_count(), 1);
        assert_eq!(clipped.point_count(), 4);
        assert_relative_eq!(volume(&clipped), 1.0 / 48.0, epsilon = 1e-12);
        assert_eq!(clipped.cell_data.scalar("id").unwrap(), &[7.0]);
        // Interpolated values on the cut face
        let z = clipped.point_data.scalar("z").unwrap();
        for (p, value) in clipped.points.iter().zip(z) {
            assert_relative_eq!(p.z, *value, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_base_cut_keeps_wedge() {
        let mesh = unit_tetra();
        let clipped = clip_half_space(&mesh, &below(0.5));
        assert_eq!(clipped.cell_count(), 3);
        assert_eq!(clipped.point_count(), 6);
        assert_relative_eq!(volume(&clipped), 1.0 / 6.0 - 1.0 / 48.0, epsilon = 1e-12);
        assert!(clipped.points.iter().all(|p| p.z <= 0.5 + 1e-12));
        clipped.validate().unwrap();
    }

    #[test]
    fn test_cut_through_vertex() {
        // Plane x = y passes through points 0 and 3
        let mesh = unit_tetra();
        let plane = HalfSpace::new(Point3::origin(), Vector3::new(1.0, -1.0, 0.0));
        let clipped = clip_half_space(&mesh, &plane);
        assert_eq!(clipped.cell_count(), 1);
        assert_relative_eq!(volume(&clipped), 1.0 / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clip_is_idempotent() {
        let mesh = unit_tetra();
        let plane = HalfSpace::new(Point3::new(0.3, 0.0, 0.0), Vector3::new(-1.0, 0.2, 0.1));
        let once = clip_half_space(&mesh, &plane);
        let twice = clip_half_space(&once, &plane);
        assert_eq!(once.cell_count(), twice.cell_count());
        assert_eq!(once.point_count(), twice.point_count());
    }

    #[test]
    fn test_neighbours_share_cut_points() {
        let mut mesh = unit_tetra();
        mesh.push_point(Point3::new(1.0, 1.0, 1.0));
        mesh.push_cell(Cell::tetra(1, 2, 3, 4));
        mesh.point_data
            .insert(FieldArray::scalar("z", vec![0.0, 0.0, 0.0, 1.0, 1.0]));
        mesh.cell_data.insert(FieldArray::scalar("id", vec![0.0, 1.0]));
        mesh.validate().unwrap();
        let clipped = clip_half_space(&mesh, &below(0.5));
        clipped.validate().unwrap();

        let mut positions: Vec<[u64; 3]> = clipped
            .points
            .iter()
            .map(|p| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()])
            .collect();
        let total = positions.len();
        positions.sort_unstable();
        positions.dedup();
        assert_eq!(positions.len(), total);
    }

    #[test]
    fn test_triangles_keep_winding() {
        let mut mesh = Mesh::new();
        for p in [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]] {
            mesh.push_point(Point3::from(p));
        }
        mesh.push_cell(Cell::triangle(0, 1, 2));
        let plane = HalfSpace::new(Point3::new(1.0, 0.0, 0.0), -Vector3::x());
        let clipped = clip_half_space(&mesh, &plane);
        assert_eq!(clipped.cell_count(), 2);
        for cell in &clipped.cells {
            let n = newell_normal(&clipped.points, &cell.points);
            assert!(n.z > 0.0);
        }
        assert_relative_eq!(volume(&clipped), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_box_gives_empty_mesh() {
        let mesh = unit_tetra();
        let flat = OrientedBox::new(Point3::origin(), Vector3::new(1.0, 1.0, 0.0), 0.0);
        let clipped = clip_to_oriented_box(&mesh, &flat);
        assert!(clipped.is_empty());
        assert!(clipped.point_data.contains("z"));
    }

    #[test]
    fn test_negative_size_clips_like_positive() {
        let mesh = unit_tetra();
        let size = Vector3::new(0.6, 0.6, 0.6);
        let center = Point3::new(0.2, 0.2, 0.2);
        let positive = clip_to_oriented_box(&mesh, &OrientedBox::new(center, size, 10.0));
        let negative = clip_to_oriented_box(&mesh, &OrientedBox::new(center, -size, 10.0));
        assert!(!negative.is_empty());
        assert_eq!(negative.cell_count(), positive.cell_count());
        assert_relative_eq!(volume(&negative), volume(&positive), epsilon = 1e-12);
    }

    #[test]
    fn test_box_clip_of_hexahedron() {
        let mut mesh = Mesh::new();
        for z in [0.0, 2.0] {
            for (x, y) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                mesh.push_point(Point3::new(x, y, z));
            }
        }
        mesh.push_cell(Cell::new(CellKind::Hexahedron, &[0, 1, 2, 3, 4, 5, 6, 7]));
        let bounds = OrientedBox::new(Point3::new(0.0, 0.0, 1.0), Vector3::new(1.0, 1.0, 1.0), 45.0);
        let clipped = clip_to_oriented_box(&mesh, &bounds);
        assert!(clipped.cells.iter().all(|c| c.kind == CellKind::Tetra));
        assert_relative_eq!(volume(&clipped), 1.0, epsilon = 1e-9);
        assert!(clipped
            .points
            .iter()
            .all(|p| bounds.planes().iter().all(|h| h.evaluate(p) > -1e-9)));
    }
}
