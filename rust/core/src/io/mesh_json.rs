// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Native mesh format: the serde JSON encoding of [`Mesh`]

use super::write_atomically;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load a mesh and check its invariants
pub fn load(path: &Path) -> Result<Mesh> {
    let file = File::open(path).map_err(|e| Error::load(path, e.to_string()))?;
    let mesh: Mesh = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::load(path, e.to_string()))?;
    mesh.validate()
        .map_err(|e| Error::load(path, e.to_string()))?;

    tracing::debug!(
        path = %path.display(),
        points = mesh.point_count(),
        cells = mesh.cell_count(),
        "Loaded mesh"
    );
    Ok(mesh)
}

/// Save a mesh with every point and cell array
pub fn save(mesh: &Mesh, path: &Path) -> Result<()> {
    write_atomically(path, |writer| {
        serde_json::to_writer(writer, mesh).map_err(std::io::Error::from)
    })?;

    tracing::debug!(
        path = %path.display(),
        points = mesh.point_count(),
        cells = mesh.cell_count(),
        "Saved mesh"
    );
    Ok(())
}
