// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! File readers and writers
//!
//! - [`stl`]: ASCII/binary STL surface geometry
//! - [`mesh_json`]: native JSON format holding a full [`Mesh`] with arrays
//! - [`multiblock`]: multi-block solver output, loading a single named field
//! - [`vtk`]: legacy ASCII VTK export for external viewers
//!
//! Writers never leave a partially written file behind: output goes to a
//! sibling temporary file that is renamed into place once complete.

pub mod mesh_json;
pub mod multiblock;
pub mod stl;
pub mod vtk;

use crate::error::{Error, Result};
use crate::mesh::Mesh;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Load a mesh, picking the reader from the file extension
pub fn load_mesh(path: &Path) -> Result<Mesh> {
    match extension(path).as_deref() {
        Some("stl") => stl::load(path),
        Some("vtk") => Err(Error::load(path, "legacy VTK files are export-only")),
        _ => mesh_json::load(path),
    }
}

/// Save a mesh, picking the writer from the file extension
pub fn save_mesh(mesh: &Mesh, path: &Path) -> Result<()> {
    match extension(path).as_deref() {
        Some("vtk") => vtk::save_legacy(mesh, path),
        Some("stl") => Err(Error::save(path, "STL output is not supported")),
        _ => mesh_json::save(mesh, path),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Write through `write` into a temporary sibling of `path`, then rename it
/// over `path`. On failure the temporary file is removed.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::save(path, e.to_string()))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".partial");
    let tmp_path = Path::new(&tmp_name).to_path_buf();

    let result = File::create(&tmp_path).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    });

    match result.and_then(|_| fs::rename(&tmp_path, path)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(Error::save(path, e.to_string()))
        }
    }
}
