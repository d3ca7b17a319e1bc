// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures

use crate::attributes::Attributes;
use crate::cell::Cell;
use crate::error::{Error, Result};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Unstructured mesh: points, typed cells, and the arrays attached to them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Point coordinates
    pub points: Vec<Point3<f64>>,
    /// Cells referencing `points` by index
    pub cells: Vec<Cell>,
    /// Arrays with one tuple per point
    #[serde(default)]
    pub point_data: Attributes,
    /// Arrays with one tuple per cell
    #[serde(default)]
    pub cell_data: Attributes,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with capacity
    pub fn with_capacity(point_count: usize, cell_count: usize) -> Self {
        Self {
            points: Vec::with_capacity(point_count),
            cells: Vec::with_capacity(cell_count),
            point_data: Attributes::new(),
            cell_data: Attributes::new(),
        }
    }

    /// Add a point, returning its index
    #[inline]
    pub fn push_point(&mut self, point: Point3<f64>) -> u32 {
        self.points.push(point);
        (self.points.len() - 1) as u32
    }

    #[inline]
    pub fn push_cell(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// A mesh without cells is empty; stray points carry no geometry
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Highest topological dimension among the cells
    pub fn max_dimension(&self) -> Option<u8> {
        self.cells.iter().map(Cell::dimension).max()
    }

    /// Number of cells with the given topological dimension
    pub fn cells_of_dimension(&self, dimension: u8) -> usize {
        self.cells.iter().filter(|c| c.dimension() == dimension).count()
    }

    /// Check topology and array invariants
    pub fn validate(&self) -> Result<()> {
        let point_count = self.points.len();
        for (cell_index, cell) in self.cells.iter().enumerate() {
            if !cell.has_valid_arity() {
                return Err(Error::CellArity {
                    cell: cell_index,
                    kind: cell.kind.name(),
                    points: cell.points.len(),
                });
            }
            let face_points = cell.faces.iter().flat_map(|f| f.iter());
            if let Some(&bad) = cell
                .points
                .iter()
                .chain(face_points)
                .find(|&&p| p as usize >= point_count)
            {
                return Err(Error::InvalidCell {
                    cell: cell_index,
                    point: bad,
                    point_count,
                });
            }
        }
        self.point_data.check_length(point_count)?;
        self.cell_data.check_length(self.cells.len())?;
        Ok(())
    }

    /// Calculate bounds (min, max)
    pub fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        if self.points.is_empty() {
            return (Point3::origin(), Point3::origin());
        }

        let mut min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Point3::new(f64::MIN, f64::MIN, f64::MIN);
        for p in &self.points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        (min, max)
    }

    /// Keep only the cells at `cell_indices` together with the points they
    /// use. Points are renumbered in ascending original order; point and cell
    /// arrays follow.
    pub fn subset_cells(&self, cell_indices: &[usize]) -> Mesh {
        let mut remap = vec![u32::MAX; self.points.len()];
        for &ci in cell_indices {
            let cell = &self.cells[ci];
            for &p in cell.points.iter().chain(cell.faces.iter().flatten()) {
                remap[p as usize] = 0;
            }
        }

        let mut kept_points = Vec::new();
        for (old, slot) in remap.iter_mut().enumerate() {
            if *slot == 0 {
                *slot = kept_points.len() as u32;
                kept_points.push(old);
            }
        }

        let cells = cell_indices
            .iter()
            .map(|&ci| {
                let mut cell = self.cells[ci].clone();
                for p in cell.points.iter_mut() {
                    *p = remap[*p as usize];
                }
                for face in cell.faces.iter_mut() {
                    for p in face.iter_mut() {
                        *p = remap[*p as usize];
                    }
                }
                cell
            })
            .collect();

        Mesh {
            points: kept_points.iter().map(|&i| self.points[i]).collect(),
            cells,
            point_data: self.point_data.select(&kept_points),
            cell_data: self.cell_data.select(cell_indices),
        }
    }

    /// Drop points no cell references
    pub fn compact(&self) -> Mesh {
        let all: Vec<usize> = (0..self.cells.len()).collect();
        self.subset_cells(&all)
    }
}

/// Multi-part mesh, e.g. the per-block partitions written by a flow solver
#[derive(Debug, Clone, Default)]
pub struct MultiBlock {
    pub blocks: Vec<Mesh>,
}

impl MultiBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: Mesh) {
        self.blocks.push(block);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total points across all blocks
    pub fn point_count(&self) -> usize {
        self.blocks.iter().map(Mesh::point_count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mesh> {
        self.blocks.iter()
    }
}
