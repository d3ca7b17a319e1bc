// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Roof detection on building surfaces

use crate::normals::{compute_cell_normals, split_sharp_edges};
use crate::transform::NORMALS;
use urban_wind_core::{FieldArray, Mesh};

/// Cell array holding the vertical component of each face normal
pub const Z_NORMAL: &str = "ZNormal";

/// Faces whose normal is within about 64 degrees of straight up count as roofs
pub const ROOF_THRESHOLD: f64 = 0.44;

/// Faces with differing normals never share points
const FEATURE_ANGLE: f64 = 0.0;

/// Keep the faces of `surface` whose unit normal has a vertical component of
/// at least `threshold`. The result carries the `Normals` and `ZNormal` cell
/// arrays plus everything the input had.
pub fn extract_roofs(surface: &Mesh, threshold: f64) -> Mesh {
    let mut faces = compute_cell_normals(&split_sharp_edges(surface, FEATURE_ANGLE));

    let z_normal: Vec<f64> = faces
        .cell_data
        .vector(NORMALS)
        .map(|normals| normals.iter().map(|n| n.z).collect())
        .unwrap_or_default();
    let kept: Vec<usize> = z_normal
        .iter()
        .enumerate()
        .filter(|&(_, &z)| z >= threshold)
        .map(|(i, _)| i)
        .collect();
    faces.cell_data.insert(FieldArray::scalar(Z_NORMAL, z_normal));

    let roofs = faces.subset_cells(&kept);
    tracing::info!(
        faces = surface.cell_count(),
        roofs = roofs.cell_count(),
        threshold,
        "Extracted roof faces"
    );
    roofs
}
