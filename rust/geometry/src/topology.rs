// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology normalization
//!
//! Merges multi-block datasets and reduces cells to simplices. Shared faces
//! are always split along the diagonal through their lowest point id, so two
//! neighbouring cells decompose a common quad the same way and the result
//! stays conforming without any neighbour lookup.

use crate::measure::signed_tetra_volume;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use smallvec::SmallVec;
use urban_wind_core::{Cell, CellKind, Mesh, MultiBlock};

/// Vertex orderings of a wedge that bring each vertex to position 0 while
/// keeping bottom/top pairs (0-3, 1-4, 2-5) aligned
const WEDGE_ROTATIONS: [[usize; 6]; 6] = [
    [0, 1, 2, 3, 4, 5],
    [1, 2, 0, 4, 5, 3],
    [2, 0, 1, 5, 3, 4],
    [3, 5, 4, 0, 2, 1],
    [4, 3, 5, 1, 0, 2],
    [5, 4, 3, 2, 1, 0],
];

/// Split a quad along the diagonal through its smallest key
pub(crate) fn split_quad<K: Ord + Copy>(quad: [K; 4]) -> [[K; 3]; 2] {
    let [a, b, c, d] = quad;
    if a.min(c) < b.min(d) {
        [[a, b, c], [a, c, d]]
    } else {
        [[a, b, d], [b, c, d]]
    }
}

/// Two tetrahedra from a pyramid with base loop `base` and `apex`
pub(crate) fn split_pyramid<K: Ord + Copy>(base: [K; 4], apex: K) -> [[K; 4]; 2] {
    split_quad(base).map(|[a, b, c]| [a, b, c, apex])
}

/// Three tetrahedra from a wedge in VTK order. Every quad face is cut along
/// the diagonal through its smallest key.
pub(crate) fn split_wedge<K: Ord + Copy>(wedge: [K; 6]) -> [[K; 4]; 3] {
    let min = (0..6).min_by_key(|&i| wedge[i]).unwrap_or(0);
    let v = WEDGE_ROTATIONS[min].map(|i| wedge[i]);
    if v[1].min(v[5]) < v[2].min(v[4]) {
        [[v[0], v[1], v[2], v[5]], [v[0], v[1], v[5], v[4]], [v[0], v[4], v[5], v[3]]]
    } else {
        [[v[0], v[1], v[2], v[4]], [v[0], v[4], v[2], v[5]], [v[0], v[4], v[5], v[3]]]
    }
}

/// Fan triangulation of a polygon loop from its smallest key, winding kept
pub(crate) fn fan_from_min<K: Ord + Copy>(polygon: &[K]) -> SmallVec<[[K; 3]; 4]> {
    let n = polygon.len();
    let start = (0..n).min_by_key(|&i| polygon[i]).unwrap_or(0);
    let at = |i: usize| polygon[(start + i) % n];
    (1..n.saturating_sub(1)).map(|i| [at(0), at(i), at(i + 1)]).collect()
}

/// Swap two points when the tetrahedron is inverted
pub(crate) fn orient_tetra(tet: [u32; 4], points: &[Point3<f64>]) -> [u32; 4] {
    let p = |i: usize| &points[tet[i] as usize];
    if signed_tetra_volume(p(0), p(1), p(2), p(3)) < 0.0 {
        [tet[0], tet[2], tet[1], tet[3]]
    } else {
        tet
    }
}

/// Concatenate all non-empty blocks into one mesh, offsetting point indices.
/// Only arrays present on every block are kept.
pub fn append_blocks(blocks: &MultiBlock) -> Mesh {
    let mut non_empty = blocks.iter().filter(|b| !b.points.is_empty());
    let Some(first) = non_empty.next() else {
        tracing::debug!(blocks = blocks.len(), "No non-empty blocks to append");
        return Mesh::new();
    };

    let mut merged = first.clone();
    for block in non_empty {
        let offset = merged.points.len() as u32;
        merged.points.extend_from_slice(&block.points);
        merged.cells.extend(block.cells.iter().map(|cell| {
            let mut cell = cell.clone();
            for p in cell.points.iter_mut().chain(cell.faces.iter_mut().flatten()) {
                *p += offset;
            }
            cell
        }));
        merged.point_data.append(&block.point_data);
        merged.cell_data.append(&block.cell_data);
    }

    tracing::debug!(
        blocks = blocks.len(),
        points = merged.point_count(),
        cells = merged.cell_count(),
        "Appended blocks"
    );
    merged
}

/// Decompose every 3D cell into tetrahedra. Lower-dimensional cells are
/// dropped.
pub fn tetrahedralize(mesh: &Mesh) -> Mesh {
    decompose(mesh, false)
}

/// Decompose every cell into simplices: 3D cells into tetrahedra, polygons
/// into triangles. Vertices and lines pass through.
pub fn simplexify(mesh: &Mesh) -> Mesh {
    decompose(mesh, true)
}

/// A tetrahedron corner: an existing point or the centroid added for the
/// parent cell
#[derive(Debug, Clone, Copy)]
enum Corner {
    Point(u32),
    Centroid,
}

#[derive(Debug, Default)]
struct Pieces {
    cells: SmallVec<[Cell; 4]>,
    centroid_tets: Vec<[Corner; 4]>,
}

fn decompose(mesh: &Mesh, keep_lower: bool) -> Mesh {
    // PHASE 1: Split each cell independently
    let pieces: Vec<Option<Pieces>> = mesh
        .cells
        .par_iter()
        .map(|cell| split_cell(mesh, cell, keep_lower))
        .collect();

    // PHASE 2: Sequential - number centroid points and assemble in cell order
    let mut out = Mesh {
        points: mesh.points.clone(),
        cells: Vec::with_capacity(mesh.cells.len()),
        point_data: mesh.point_data.clone(),
        cell_data: mesh.cell_data.empty_like(mesh.cells.len()),
    };
    let mut dropped = 0usize;

    for (cell_index, piece) in pieces.into_iter().enumerate() {
        let Some(piece) = piece else {
            dropped += 1;
            continue;
        };
        for cell in piece.cells {
            out.cells.push(cell);
            out.cell_data.push_row(&mesh.cell_data, cell_index);
        }
        if piece.centroid_tets.is_empty() {
            continue;
        }

        let parent = &mesh.cells[cell_index];
        let weight = 1.0 / parent.points.len() as f64;
        let weights: Vec<(usize, f64)> = parent.points.iter().map(|&p| (p as usize, weight)).collect();
        let centroid = weights
            .iter()
            .fold(Vector3::zeros(), |acc, &(p, w)| acc + mesh.points[p].coords * w);
        let centroid_id = out.push_point(Point3::from(centroid));
        out.point_data.push_interpolated(&mesh.point_data, &weights);

        for tet in piece.centroid_tets {
            let ids = tet.map(|c| match c {
                Corner::Point(p) => p,
                Corner::Centroid => centroid_id,
            });
            let [a, b, c, d] = orient_tetra(ids, &out.points);
            out.cells.push(Cell::tetra(a, b, c, d));
            out.cell_data.push_row(&mesh.cell_data, cell_index);
        }
    }

    if dropped > 0 {
        tracing::warn!(dropped, "Dropped cells that cannot be decomposed into tetrahedra");
    }
    tracing::debug!(
        input_cells = mesh.cell_count(),
        output_cells = out.cell_count(),
        added_points = out.point_count() - mesh.point_count(),
        "Decomposed cells into simplices"
    );
    out
}

fn split_cell(mesh: &Mesh, cell: &Cell, keep_lower: bool) -> Option<Pieces> {
    let mut pieces = Pieces::default();
    let p = &cell.points;

    if !cell.has_valid_arity() {
        return None;
    }

    match cell.kind {
        CellKind::Vertex | CellKind::Line | CellKind::Triangle if keep_lower => {
            pieces.cells.push(cell.clone());
        }
        CellKind::Quad | CellKind::Polygon if keep_lower => {
            for [a, b, c] in fan_from_min(p) {
                pieces.cells.push(Cell::triangle(a, b, c));
            }
        }
        CellKind::Tetra => {
            let [a, b, c, d] = orient_tetra([p[0], p[1], p[2], p[3]], &mesh.points);
            pieces.cells.push(Cell::tetra(a, b, c, d));
        }
        CellKind::Pyramid => {
            for tet in split_pyramid([p[0], p[1], p[2], p[3]], p[4]) {
                let [a, b, c, d] = orient_tetra(tet, &mesh.points);
                pieces.cells.push(Cell::tetra(a, b, c, d));
            }
        }
        CellKind::Wedge => {
            for tet in split_wedge([p[0], p[1], p[2], p[3], p[4], p[5]]) {
                let [a, b, c, d] = orient_tetra(tet, &mesh.points);
                pieces.cells.push(Cell::tetra(a, b, c, d));
            }
        }
        CellKind::Hexahedron | CellKind::Polyhedron => {
            for face in cell.face_loops() {
                for [a, b, c] in fan_from_min(&face) {
                    pieces.centroid_tets.push([
                        Corner::Point(a),
                        Corner::Point(b),
                        Corner::Point(c),
                        Corner::Centroid,
                    ]);
                }
            }
        }
        _ => return None,
    }
    Some(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{cell_size, tetra_volume};
    use approx::assert_relative_eq;
    use urban_wind_core::FieldArray;

    fn cube_points(mesh: &mut Mesh, origin: Vector3<f64>) {
        for z in [0.0, 1.0] {
            for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                mesh.push_point(Point3::new(x, y, z) + origin);
            }
        }
    }

    fn total_volume(mesh: &Mesh) -> f64 {
        mesh.cells.iter().map(|c| cell_size(mesh, c)).sum()
    }

    fn all_positive(mesh: &Mesh) -> bool {
        mesh.cells.iter().all(|c| {
            let p = |i: usize| &mesh.points[c.points[i] as usize];
            signed_tetra_volume(p(0), p(1), p(2), p(3)) > 0.0
        })
    }

    #[test]
    fn test_split_quad_uses_min_diagonal() {
        assert_eq!(split_quad([0, 1, 2, 3]), [[0, 1, 2], [0, 2, 3]]);
        assert_eq!(split_quad([5, 1, 7, 3]), [[5, 1, 3], [1, 7, 3]]);
    }

    #[test]
    fn test_wedge_split_covers_volume() {
        let mut mesh = Mesh::new();
        for z in [0.0, 1.0] {
            for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
                mesh.push_point(Point3::new(x, y, z));
            }
        }
        for rotation in WEDGE_ROTATIONS {
            let wedge = rotation.map(|i| i as u32);
            let volume: f64 = split_wedge(wedge)
                .iter()
                .map(|t| {
                    let p = |i: usize| &mesh.points[t[i] as usize];
                    tetra_volume(p(0), p(1), p(2), p(3))
                })
                .sum();
            assert_relative_eq!(volume, 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_append_offsets_indices_and_skips_empty() {
        let mut a = Mesh::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] {
            a.push_point(Point3::from(p));
        }
        a.push_cell(Cell::tetra(0, 1, 2, 3));
        a.point_data
            .insert(FieldArray::vector("velocity", vec![Vector3::x(); 4]));
        let b = a.clone();

        let blocks = MultiBlock {
            blocks: vec![a, Mesh::new(), b],
        };
        let merged = append_blocks(&blocks);
        assert_eq!(merged.point_count(), 8);
        assert_eq!(merged.cells[1].points.as_slice(), &[4, 5, 6, 7]);
        assert_eq!(merged.point_data.vector("velocity").map(|v| v.len()), Some(8));
        merged.validate().unwrap();
    }

    #[test]
    fn test_append_of_nothing_is_empty() {
        let merged = append_blocks(&MultiBlock::new());
        assert!(merged.is_empty());
        assert_eq!(merged.point_count(), 0);
    }

    #[test]
    fn test_hexahedra_become_conforming_tetrahedra() {
        let mut mesh = Mesh::new();
        cube_points(&mut mesh, Vector3::zeros());
        cube_points(&mut mesh, Vector3::new(1.0, 0.0, 0.0));
        mesh.push_cell(Cell::new(CellKind::Hexahedron, &[0, 1, 2, 3, 4, 5, 6, 7]));
        // Second cube shares the x = 1 face through points 1, 2, 5, 6
        mesh.push_cell(Cell::new(
            CellKind::Hexahedron,
            &[1, 9, 10, 2, 5, 13, 14, 6],
        ));
        mesh.point_data
            .insert(FieldArray::scalar("x", mesh.points.iter().map(|p| p.x).collect()));
        mesh.cell_data.insert(FieldArray::scalar("block", vec![1.0, 2.0]));

        let tets = tetrahedralize(&mesh);
        assert_eq!(tets.cell_count(), 24);
        assert!(tets.cells.iter().all(|c| c.kind == CellKind::Tetra));
        assert!(all_positive(&tets));
        assert_relative_eq!(total_volume(&tets), 2.0, epsilon = 1e-12);
        tets.validate().unwrap();

        // Centroid points carry the averaged point data
        let x = tets.point_data.scalar("x").unwrap();
        assert_relative_eq!(x[16], 0.5);
        assert_relative_eq!(x[17], 1.5);
        assert_eq!(tets.cell_data.scalar("block").unwrap()[23], 2.0);

        // Both cubes cut the shared face along the same diagonal
        let shared = [1u32, 2, 5, 6];
        let mut faces: Vec<Vec<u32>> = tets
            .cells
            .iter()
            .flat_map(|c| {
                [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]].map(|f| {
                    let mut face: Vec<u32> = f.iter().map(|&i| c.points[i]).collect();
                    face.sort_unstable();
                    face
                })
            })
            .filter(|f| f.iter().all(|p| shared.contains(p)))
            .collect();
        faces.sort();
        assert_eq!(faces.len(), 4);
        assert_eq!(faces[0], faces[1]);
        assert_eq!(faces[2], faces[3]);
    }

    #[test]
    fn test_mixed_cells() {
        let mut mesh = Mesh::new();
        cube_points(&mut mesh, Vector3::zeros());
        mesh.push_point(Point3::new(0.5, 0.5, 2.0));
        mesh.push_cell(Cell::new(CellKind::Pyramid, &[4, 5, 6, 7, 8]));
        mesh.push_cell(Cell::new(CellKind::Wedge, &[0, 1, 2, 4, 5, 6]));
        mesh.push_cell(Cell::new(CellKind::Quad, &[0, 1, 2, 3]));

        let tets = tetrahedralize(&mesh);
        assert_eq!(tets.cell_count(), 5);
        assert!(all_positive(&tets));
        assert_relative_eq!(total_volume(&tets), 1.0 / 3.0 + 0.5, epsilon = 1e-12);

        let simplices = simplexify(&mesh);
        assert_eq!(simplices.cell_count(), 7);
        assert_eq!(simplices.cells_of_dimension(2), 2);
    }
}
