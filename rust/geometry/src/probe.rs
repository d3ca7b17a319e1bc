// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Field probing: resample a volume's point arrays at arbitrary positions

use crate::topology::tetrahedralize;
use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;
use std::borrow::Cow;
use urban_wind_core::{CellKind, FieldArray, Mesh};

/// Point array marking which probed points were found inside the source
/// (1.0) and which received the zero fallback (0.0)
pub const VALID_POINT_MASK: &str = "validPointMask";

/// Barycentric weights down to this value still count as inside, so points
/// on shared faces are always found
const BARYCENTRIC_TOLERANCE: f64 = 1e-9;

/// Target number of tetrahedra per bin
const CELLS_PER_BIN: usize = 4;

const MAX_BINS_PER_AXIS: usize = 256;

/// Uniform grid over a tetrahedral mesh's bounds. Each bin lists, in
/// ascending order, the cells whose bounding box overlaps it.
pub struct CellLocator<'a> {
    mesh: &'a Mesh,
    min: Point3<f64>,
    max: Point3<f64>,
    bin_size: Vector3<f64>,
    dims: [usize; 3],
    bins: Vec<Vec<u32>>,
}

impl<'a> CellLocator<'a> {
    /// Index the tetrahedra of `mesh`. Other cells are ignored.
    pub fn new(mesh: &'a Mesh) -> Self {
        let (min, max) = mesh.bounds();
        let tets = mesh.cells.iter().filter(|c| c.kind == CellKind::Tetra).count();
        let extent = max - min;

        // Bin counts proportional to the extent along each axis
        let target = (tets / CELLS_PER_BIN).max(1) as f64;
        let volume = extent.iter().map(|e| e.max(f64::EPSILON)).product::<f64>();
        let edge = (volume / target).cbrt();
        let dims = [0, 1, 2].map(|axis| {
            let n = (extent[axis] / edge).ceil();
            if n.is_finite() {
                (n as usize).clamp(1, MAX_BINS_PER_AXIS)
            } else {
                1
            }
        });
        let bin_size = Vector3::new(
            extent.x / dims[0] as f64,
            extent.y / dims[1] as f64,
            extent.z / dims[2] as f64,
        );

        let mut locator = Self {
            mesh,
            min,
            max,
            bin_size,
            dims,
            bins: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
        };

        // PHASE 1: Bin ranges per cell
        let ranges: Vec<Option<([usize; 3], [usize; 3])>> = mesh
            .cells
            .par_iter()
            .map(|cell| {
                if cell.kind != CellKind::Tetra {
                    return None;
                }
                let mut lo = Point3::new(f64::MAX, f64::MAX, f64::MAX);
                let mut hi = Point3::new(f64::MIN, f64::MIN, f64::MIN);
                for &p in &cell.points {
                    let p = &mesh.points[p as usize];
                    lo = lo.inf(p);
                    hi = hi.sup(p);
                }
                Some((locator.bin_of(&lo), locator.bin_of(&hi)))
            })
            .collect();

        // PHASE 2: Sequential - fill bins in cell order
        for (ci, range) in ranges.into_iter().enumerate() {
            let Some((lo, hi)) = range else { continue };
            for k in lo[2]..=hi[2] {
                for j in lo[1]..=hi[1] {
                    for i in lo[0]..=hi[0] {
                        let bin = locator.flat(i, j, k);
                        locator.bins[bin].push(ci as u32);
                    }
                }
            }
        }

        tracing::debug!(
            cells = tets,
            bins = locator.bins.len(),
            dims = ?locator.dims,
            "Built cell locator"
        );
        locator
    }

    fn bin_of(&self, p: &Point3<f64>) -> [usize; 3] {
        [0, 1, 2].map(|axis| {
            if self.bin_size[axis] <= 0.0 {
                return 0;
            }
            let t = ((p[axis] - self.min[axis]) / self.bin_size[axis]).floor();
            if t <= 0.0 {
                0
            } else {
                (t as usize).min(self.dims[axis] - 1)
            }
        })
    }

    #[inline]
    fn flat(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    fn in_bounds(&self, p: &Point3<f64>) -> bool {
        let slack = (self.max - self.min).norm() * BARYCENTRIC_TOLERANCE;
        (0..3).all(|a| p[a] >= self.min[a] - slack && p[a] <= self.max[a] + slack)
    }

    /// First cell, in index order, containing `point`, with the barycentric
    /// weights of its four points
    pub fn locate(&self, point: &Point3<f64>) -> Option<(usize, [f64; 4])> {
        if self.mesh.cells.is_empty() || !self.in_bounds(point) {
            return None;
        }
        let [i, j, k] = self.bin_of(point);
        self.bins[self.flat(i, j, k)].iter().find_map(|&ci| {
            let ci = ci as usize;
            barycentric(self.mesh, ci, point).map(|weights| (ci, weights))
        })
    }
}

fn barycentric(mesh: &Mesh, cell_index: usize, point: &Point3<f64>) -> Option<[f64; 4]> {
    let cell = &mesh.cells[cell_index];
    let p = |i: usize| mesh.points[cell.points[i] as usize];
    let a = p(0);
    let m = Matrix3::from_columns(&[p(1) - a, p(2) - a, p(3) - a]);
    let l = m.try_inverse()? * (point - a);
    let weights = [1.0 - l.x - l.y - l.z, l.x, l.y, l.z];
    weights
        .iter()
        .all(|&w| w >= -BARYCENTRIC_TOLERANCE)
        .then_some(weights)
}

/// Sample every point array of `source` at the points of `target`.
///
/// The result keeps the target's points, cells and cell arrays; its point
/// arrays are the source's, interpolated inside the containing cell, plus
/// [`VALID_POINT_MASK`]. Points outside the source get zeros.
pub fn probe(target: &Mesh, source: &Mesh) -> Mesh {
    let source: Cow<'_, Mesh> = if source.cells.iter().all(|c| c.kind == CellKind::Tetra) {
        Cow::Borrowed(source)
    } else {
        Cow::Owned(tetrahedralize(source))
    };
    let locator = CellLocator::new(&source);

    let hits: Vec<Option<(usize, [f64; 4])>> =
        target.points.par_iter().map(|p| locator.locate(p)).collect();

    let mut point_data = source.point_data.empty_like(target.points.len());
    let mut mask = Vec::with_capacity(target.points.len());
    for hit in &hits {
        match hit {
            Some((ci, weights)) => {
                let cell = &source.cells[*ci];
                let pairs: [(usize, f64); 4] =
                    [0, 1, 2, 3].map(|i| (cell.points[i] as usize, weights[i]));
                point_data.push_interpolated(&source.point_data, &pairs);
                mask.push(1.0);
            }
            None => {
                point_data.push_zero();
                mask.push(0.0);
            }
        }
    }

    let missed = mask.iter().filter(|&&m| m == 0.0).count();
    if missed > 0 {
        tracing::warn!(missed, total = mask.len(), "Probe points outside the source mesh");
    }
    point_data.insert(FieldArray::scalar(VALID_POINT_MASK, mask));

    Mesh {
        points: target.points.clone(),
        cells: target.cells.clone(),
        point_data,
        cell_data: target.cell_data.clone(),
    }
}
