// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Legacy ASCII VTK writer (`UNSTRUCTURED_GRID`)

use super::write_atomically;
use crate::attributes::{Attributes, FieldData};
use crate::cell::CellKind;
use crate::error::Result;
use crate::mesh::Mesh;
use std::io::Write;
use std::path::Path;

/// Write `mesh` with all point and cell arrays as a legacy `.vtk` file
pub fn save_legacy(mesh: &Mesh, path: &Path) -> Result<()> {
    write_atomically(path, |w| write_legacy(mesh, w))?;
    tracing::debug!(path = %path.display(), "Saved legacy VTK file");
    Ok(())
}

/// Serialize `mesh` in legacy VTK format to any writer
pub fn write_legacy<W: Write>(mesh: &Mesh, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "# vtk DataFile Version 4.2")?;
    writeln!(w, "urban-wind")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET UNSTRUCTURED_GRID")?;

    writeln!(w, "POINTS {} double", mesh.point_count())?;
    for p in &mesh.points {
        writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
    }

    let connectivity: Vec<Vec<usize>> = mesh.cells.iter().map(cell_record).collect();
    let size: usize = connectivity.iter().map(|r| r.len() + 1).sum();
    writeln!(w, "CELLS {} {}", mesh.cell_count(), size)?;
    for record in &connectivity {
        write!(w, "{}", record.len())?;
        for v in record {
            write!(w, " {v}")?;
        }
        writeln!(w)?;
    }

    writeln!(w, "CELL_TYPES {}", mesh.cell_count())?;
    for cell in &mesh.cells {
        writeln!(w, "{}", cell.kind.vtk_id())?;
    }

    if !mesh.point_data.is_empty() {
        writeln!(w, "POINT_DATA {}", mesh.point_count())?;
        write_arrays(&mesh.point_data, w)?;
    }
    if !mesh.cell_data.is_empty() {
        writeln!(w, "CELL_DATA {}", mesh.cell_count())?;
        write_arrays(&mesh.cell_data, w)?;
    }
    Ok(())
}

/// Polyhedra use the face-stream layout: face count, then each face as
/// point count followed by its points
fn cell_record(cell: &crate::cell::Cell) -> Vec<usize> {
    if cell.kind == CellKind::Polyhedron {
        let mut record = vec![cell.faces.len()];
        for face in &cell.faces {
            record.push(face.len());
            record.extend(face.iter().map(|&p| p as usize));
        }
        record
    } else {
        cell.points.iter().map(|&p| p as usize).collect()
    }
}

fn write_arrays<W: Write>(attributes: &Attributes, w: &mut W) -> std::io::Result<()> {
    for array in attributes.iter() {
        // Legacy readers stop at whitespace in names
        let name = array.name.replace(char::is_whitespace, "_");
        match &array.data {
            FieldData::Scalar(values) => {
                writeln!(w, "SCALARS {name} double 1")?;
                writeln!(w, "LOOKUP_TABLE default")?;
                for v in values {
                    writeln!(w, "{v}")?;
                }
            }
            FieldData::Vector(values) => {
                writeln!(w, "VECTORS {name} double")?;
                for v in values {
                    writeln!(w, "{} {} {}", v.x, v.y, v.z)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::FieldArray;
    use crate::cell::Cell;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_layout() {
        let mut mesh = Mesh::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] {
            mesh.push_point(Point3::from(p));
        }
        mesh.push_cell(Cell::tetra(0, 1, 2, 3));
        mesh.point_data.insert(FieldArray::scalar("velocityNormZ", vec![0.0; 4]));
        mesh.cell_data
            .insert(FieldArray::vector("Normals", vec![Vector3::z()]));

        let mut out = Vec::new();
        write_legacy(&mesh, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("POINTS 4 double"));
        assert!(text.contains("CELLS 1 5\n4 0 1 2 3\n"));
        assert!(text.contains("CELL_TYPES 1\n10\n"));
        assert!(text.contains("POINT_DATA 4\nSCALARS velocityNormZ double 1"));
        assert!(text.contains("CELL_DATA 1\nVECTORS Normals double\n0 0 1\n"));
    }
}
