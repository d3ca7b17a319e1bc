// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Surface normals
//!
//! Normals follow each face's own winding. No attempt is made to orient
//! neighbouring faces consistently, so disconnected shells keep whatever
//! orientation they were modelled with.

use crate::measure::face_normal;
use crate::transform::NORMALS;
use nalgebra::Vector3;
use rayon::prelude::*;
use smallvec::SmallVec;
use urban_wind_core::{FieldArray, Mesh};

/// Add a unit normal per cell as the cell array `Normals`. Cells that are not
/// surface faces, and degenerate faces, get the zero vector.
pub fn compute_cell_normals(mesh: &Mesh) -> Mesh {
    let normals = face_normals(mesh);
    let mut out = mesh.clone();
    out.cell_data.insert(FieldArray::vector(NORMALS, normals));
    out
}

fn face_normals(mesh: &Mesh) -> Vec<Vector3<f64>> {
    mesh.cells
        .par_iter()
        .map(|cell| {
            if cell.dimension() == 2 {
                face_normal(&mesh.points, &cell.points)
            } else {
                Vector3::zeros()
            }
        })
        .collect()
}

/// Give each face its own copy of a point wherever the faces sharing that
/// point disagree in orientation by more than `feature_angle` degrees.
///
/// Faces meeting at a point are grouped greedily in cell order: a face joins
/// the first group whose leading normal is within the angle, otherwise it
/// starts a new group. The first group keeps the original point; every other
/// group gets a duplicate carrying the same point data.
pub fn split_sharp_edges(mesh: &Mesh, feature_angle: f64) -> Mesh {
    let normals = face_normals(mesh);
    let min_cos = feature_angle.to_radians().cos() - 1e-9;

    let mut incident: Vec<SmallVec<[u32; 8]>> = vec![SmallVec::new(); mesh.points.len()];
    for (ci, cell) in mesh.cells.iter().enumerate() {
        if cell.dimension() != 2 {
            continue;
        }
        for &p in &cell.points {
            incident[p as usize].push(ci as u32);
        }
    }

    let mut out = mesh.clone();
    let mut duplicated = 0usize;

    for (point, cells) in incident.iter().enumerate() {
        if cells.len() < 2 {
            continue;
        }

        // (leading normal, point id for the group)
        let mut groups: SmallVec<[(Vector3<f64>, u32); 4]> = SmallVec::new();
        for &ci in cells {
            let normal = normals[ci as usize];
            let id = match groups.iter().find(|(lead, _)| lead.dot(&normal) >= min_cos) {
                Some(&(_, id)) => id,
                None => {
                    let id = if groups.is_empty() {
                        point as u32
                    } else {
                        duplicated += 1;
                        let id = out.push_point(mesh.points[point]);
                        out.point_data.push_row(&mesh.point_data, point);
                        id
                    };
                    groups.push((normal, id));
                    id
                }
            };
            if id != point as u32 {
                for p in out.cells[ci as usize].points.iter_mut() {
                    if *p == point as u32 {
                        *p = id;
                    }
                }
            }
        }
    }

    tracing::debug!(
        feature_angle,
        duplicated,
        points = out.point_count(),
        "Split sharp edges"
    );
    out
}
