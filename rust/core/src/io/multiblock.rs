// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multi-block solver output
//!
//! ```json
//! { "blocks": [ { "points": [[x, y, z], ...],
//!                 "cells": [ { "kind": "hexahedron", "points": [...] }, ... ],
//!                 "point_data": { "velocity": [[u, v, w], ...], "pressure": [...] } } ] }
//! ```
//!
//! Only the requested field is parsed; every other array stays an unparsed
//! raw JSON slice and is dropped. The field is stored as `velocity`.

use crate::attributes::FieldArray;
use crate::cell::Cell;
use crate::error::{Error, Result};
use crate::mesh::{Mesh, MultiBlock};
use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::path::Path;

/// Name the selected field is stored under
pub const VELOCITY: &str = "velocity";

#[derive(Deserialize)]
struct RawDataset {
    blocks: Vec<RawBlock>,
}

#[derive(Deserialize)]
struct RawBlock {
    #[serde(default)]
    points: Vec<Point3<f64>>,
    #[serde(default)]
    cells: Vec<Cell>,
    #[serde(default)]
    point_data: FxHashMap<String, Box<RawValue>>,
}

/// Load a multi-block dataset keeping only `field_name` as the `velocity`
/// point vector array
pub fn load(path: &Path, field_name: &str) -> Result<MultiBlock> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::load(path, e.to_string()))?;
    let dataset: RawDataset =
        serde_json::from_str(&text).map_err(|e| Error::load(path, e.to_string()))?;

    let mut output = MultiBlock::new();
    for (index, raw) in dataset.blocks.into_iter().enumerate() {
        if raw.points.is_empty() {
            output.push(Mesh::new());
            continue;
        }

        let field = raw
            .point_data
            .get(field_name)
            .ok_or_else(|| Error::missing_array("load source", field_name))?;
        let values: Vec<Vector3<f64>> = serde_json::from_str(field.get()).map_err(|e| {
            Error::load(path, format!("block {index}: field '{field_name}': {e}"))
        })?;

        let mut block = Mesh {
            points: raw.points,
            cells: raw.cells,
            ..Mesh::default()
        };
        block.point_data.insert(FieldArray::vector(VELOCITY, values));
        block
            .validate()
            .map_err(|e| Error::load(path, format!("block {index}: {e}")))?;
        output.push(block);
    }

    tracing::info!(
        path = %path.display(),
        blocks = output.len(),
        points = output.point_count(),
        field = field_name,
        "Loaded multi-block dataset"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = r#"{
        "blocks": [
            {
                "points": [[0,0,0],[1,0,0],[0,1,0],[0,0,1]],
                "cells": [ { "kind": "tetra", "points": [0,1,2,3] } ],
                "point_data": {
                    "pressure": [1, 2, 3, 4],
                    "U": [[1,0,0],[1,0,0],[1,0,0],[1,0,0]]
                }
            },
            { "points": [], "cells": [] }
        ]
    }"#;

    fn write_dataset(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, DATASET).unwrap();
        path
    }

    #[test]
    fn test_only_selected_field_is_loaded() {
        let path = write_dataset("urban_wind_multiblock_select.json");
        let blocks = load(&path, "U").unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(blocks.len(), 2);
        let first = &blocks.blocks[0];
        assert_eq!(first.point_data.len(), 1);
        assert_eq!(first.point_data.vector(VELOCITY).unwrap()[2], Vector3::x());
        assert!(blocks.blocks[1].is_empty());
    }

    #[test]
    fn test_missing_field_is_reported() {
        let path = write_dataset("urban_wind_multiblock_missing.json");
        let err = load(&path, "velocity").unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, Error::MissingArray { .. }));
    }
}
