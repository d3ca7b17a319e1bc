// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-cell statistics of a product
//!
//! Both the CSV export and [`summarize`] work on the highest-dimension
//! simplices of the mesh (triangles for roof surfaces, tetrahedra for
//! volumes). A cell's value is the mean of its point values and its weight
//! is its area or volume.

use crate::derive::{
    bearing_derivations, evaluate, AttributeMode, VELOCITY_NORM_XY, VELOCITY_NORM_XY_ANGLE,
    VELOCITY_NORM_XY_DIRECTION,
};
use crate::error::Result;
use crate::expr::Expr;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use std::borrow::Cow;
use std::io::Write;
use std::path::Path;
use tracing::info;
use urban_wind_core::io::write_atomically;
use urban_wind_core::{FieldArray, FieldRange, Mesh};
use urban_wind_geometry::measure::{cell_centroid, cell_size};
use urban_wind_geometry::simplexify;

const STAGE: &str = "statistics";

struct CellRow {
    value: f64,
    size: f64,
    centroid: Point3<f64>,
}

/// Simplex form of `mesh` and the dimension of the cells to report
fn measured_cells(mesh: &Mesh) -> (Cow<'_, Mesh>, u8) {
    let simplices = if mesh.cells.iter().all(|c| c.kind.is_simplex()) {
        Cow::Borrowed(mesh)
    } else {
        Cow::Owned(simplexify(mesh))
    };
    let dimension = simplices.max_dimension().unwrap_or(0);
    (simplices, dimension)
}

fn cell_rows(mesh: &Mesh, dimension: u8, values: &[f64]) -> Vec<CellRow> {
    if dimension < 2 {
        return Vec::new();
    }
    mesh.cells
        .par_iter()
        .filter(|c| c.dimension() == dimension)
        .map(|cell| CellRow {
            value: cell.points.iter().map(|&p| values[p as usize]).sum::<f64>()
                / cell.points.len() as f64,
            size: cell_size(mesh, cell),
            centroid: cell_centroid(mesh, cell),
        })
        .collect()
}

/// Write one CSV row per cell: `Value, Area|Volume, X, Y, Z`.
/// Returns the number of rows written.
pub fn write_cell_statistics(mesh: &Mesh, array: &str, path: &Path) -> Result<usize> {
    mesh.point_data.require_scalar(STAGE, array)?;
    let (cells, dimension) = measured_cells(mesh);
    let values = cells.point_data.require_scalar(STAGE, array)?;
    let rows = cell_rows(&cells, dimension, values);

    let label = if dimension == 3 { "Volume" } else { "Area" };
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format!("Value, {label}, X, Y, Z"));
    lines.extend(rows.iter().map(|r| {
        format!(
            "{}, {}, {}, {}, {}",
            r.value, r.size, r.centroid.x, r.centroid.y, r.centroid.z
        )
    }));

    write_atomically(path, |w| {
        for line in &lines {
            writeln!(w, "{line}")?;
        }
        Ok(())
    })?;
    info!(path = %path.display(), array, rows = rows.len(), "Wrote cell statistics");
    Ok(rows.len())
}

/// Size-weighted summary of one point scalar array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Min/max over the points
    pub range: FieldRange,
    /// Mean over the cells, weighted by cell size
    pub mean: f64,
    /// Total area or volume
    pub total_size: f64,
    pub cells: usize,
}

/// Summarize `array`. `None` when the mesh has no points or no measurable
/// cells.
///
/// Bearings do not average linearly (1 and 359 degrees should give 0), so
/// for `velocityNormXYAngle` the mean is taken over the horizontal
/// direction vectors and turned back into a bearing.
pub fn summarize(mesh: &Mesh, array: &str) -> Result<Option<Summary>> {
    mesh.point_data.require_scalar(STAGE, array)?;
    let Some(range) = mesh.point_data.scalar_range(array) else {
        return Ok(None);
    };

    let (cells, dimension) = measured_cells(mesh);
    let rows = cell_rows(&cells, dimension, cells.point_data.require_scalar(STAGE, array)?);
    let total_size: f64 = rows.iter().map(|r| r.size).sum();
    if rows.is_empty() || total_size <= 0.0 {
        return Ok(None);
    }

    let directions = cells.point_data.vector(VELOCITY_NORM_XY_DIRECTION);
    let mean = match directions {
        Some(directions) if array == VELOCITY_NORM_XY_ANGLE => {
            let weighted: Vector3<f64> = cells
                .cells
                .iter()
                .filter(|c| c.dimension() == dimension)
                .map(|cell| {
                    let mean = cell
                        .points
                        .iter()
                        .map(|&p| directions[p as usize])
                        .sum::<Vector3<f64>>()
                        / cell.points.len() as f64;
                    mean * cell_size(&cells, cell)
                })
                .sum();
            bearing(&weighted)?
        }
        _ => rows.iter().map(|r| r.value * r.size).sum::<f64>() / total_size,
    };

    Ok(Some(Summary {
        range,
        mean,
        total_size,
        cells: rows.len(),
    }))
}

/// Bearing in [0, 360) the wind comes from, for a horizontal flow direction.
/// Evaluated with the same expressions that derive `velocityNormXYAngle`.
pub fn bearing(direction: &Vector3<f64>) -> Result<f64> {
    let mut sample = Mesh::new();
    sample.push_point(Point3::origin());
    sample.point_data.insert(FieldArray::vector(
        VELOCITY_NORM_XY,
        vec![Vector3::new(direction.x, direction.y, 0.0)],
    ));

    let unit = (VELOCITY_NORM_XY_DIRECTION, Expr::array(VELOCITY_NORM_XY).norm());
    for (name, expr) in std::iter::once(unit).chain(bearing_derivations()) {
        evaluate(&mut sample, AttributeMode::Point, name, &expr)?;
    }
    Ok(sample.point_data.require_scalar(STAGE, VELOCITY_NORM_XY_ANGLE)?[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use urban_wind_core::{Cell, CellKind, FieldArray};

    /// Two right triangles covering the unit square, split along x = y
    fn square() -> Mesh {
        let mut mesh = Mesh::new();
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            mesh.push_point(Point3::new(x, y, 0.0));
        }
        mesh.push_cell(Cell::triangle(0, 1, 2));
        mesh.push_cell(Cell::triangle(0, 2, 3));
        mesh.point_data
            .insert(FieldArray::scalar("speed", vec![0.0, 3.0, 3.0, 0.0]));
        mesh
    }

    #[test]
    fn test_csv_rows() {
        let path = std::env::temp_dir().join(format!("urban-wind-stats-{}.csv", std::process::id()));
        let rows = write_cell_statistics(&square(), "speed", &path).unwrap();
        assert_eq!(rows, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Value, Area, X, Y, Z");
        assert_eq!(lines[1].split(", ").next(), Some("2"));
        assert_eq!(lines[2].split(", ").nth(1), Some("0.5"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_quads_are_measured_as_triangles() {
        let mut mesh = square();
        mesh.cells = vec![Cell::new(CellKind::Quad, &[0, 1, 2, 3])];
        let summary = summarize(&mesh, "speed").unwrap().unwrap();
        assert_eq!(summary.cells, 2);
        assert_relative_eq!(summary.total_size, 1.0);
    }

    #[test]
    fn test_weighted_mean() {
        let summary = summarize(&square(), "speed").unwrap().unwrap();
        assert_eq!(summary.range, FieldRange { min: 0.0, max: 3.0 });
        // Cell means 2 and 1, equal areas
        assert_relative_eq!(summary.mean, 1.5);
        assert_relative_eq!(summary.total_size, 1.0);
    }

    #[test]
    fn test_angle_mean_wraps() {
        let mut mesh = square();
        let from = |deg: f64| {
            // Flow direction for a wind arriving from `deg`
            let r = deg.to_radians();
            Vector3::new(-r.sin(), -r.cos(), 0.0)
        };
        let angles = [350.0, 10.0, 10.0, 350.0];
        mesh.point_data
            .insert(FieldArray::scalar(VELOCITY_NORM_XY_ANGLE, angles.to_vec()));
        mesh.point_data.insert(FieldArray::vector(
            VELOCITY_NORM_XY_DIRECTION,
            angles.iter().map(|&a| from(a)).collect(),
        ));

        let mean = summarize(&mesh, VELOCITY_NORM_XY_ANGLE).unwrap().unwrap().mean;
        assert!(mean < 1e-9 || mean > 360.0 - 1e-9, "{mean}");
    }

    #[test]
    fn test_bearing_quadrants() {
        let bearing = |x: f64, y: f64, z: f64| bearing(&Vector3::new(x, y, z)).unwrap();
        assert_relative_eq!(bearing(0.0, -1.0, 0.0), 0.0);
        assert_relative_eq!(bearing(-2.0, 0.0, 0.0), 90.0);
        assert_relative_eq!(bearing(0.0, 3.0, 0.0), 180.0);
        assert_relative_eq!(bearing(1.0, 0.0, 5.0), 270.0);
        assert_eq!(bearing(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_bearing_matches_derived_angle() {
        let velocities: Vec<Vector3<f64>> = (0..48)
            .map(|i| {
                let theta = (i as f64 * 7.5).to_radians();
                Vector3::new(theta.cos() * 3.0, theta.sin() * 3.0, 1.0)
            })
            .collect();
        let mut mesh = Mesh::new();
        for _ in &velocities {
            mesh.push_point(Point3::origin());
        }
        mesh.point_data
            .insert(FieldArray::vector(crate::derive::VELOCITY, velocities.clone()));
        crate::derive::normalize_velocity(&mut mesh, 1.0).unwrap();

        let angles = mesh.point_data.scalar(VELOCITY_NORM_XY_ANGLE).unwrap();
        for (v, angle) in velocities.iter().zip(angles) {
            assert_eq!(bearing(v).unwrap(), *angle, "{v}");
        }
    }

    #[test]
    fn test_empty_mesh() {
        let mut mesh = Mesh::new();
        mesh.point_data.insert(FieldArray::scalar("speed", Vec::new()));
        assert_eq!(summarize(&mesh, "speed").unwrap(), None);
        assert!(summarize(&mesh, "missing").is_err());
    }
}
