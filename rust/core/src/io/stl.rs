// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STL surface reader (ASCII and binary, auto-detected)
//!
//! Coincident vertices are merged by exact coordinate equality so adjacent
//! facets share points. Stored facet normals are ignored.

use crate::cell::Cell;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use nalgebra::Point3;
use rustc_hash::FxHashMap;
use std::path::Path;

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

/// Load an STL file as a triangle mesh
pub fn load(path: &Path) -> Result<Mesh> {
    let bytes = std::fs::read(path).map_err(|e| Error::load(path, e.to_string()))?;
    let mesh = parse(&bytes).map_err(|reason| Error::load(path, reason))?;

    tracing::info!(
        path = %path.display(),
        points = mesh.point_count(),
        triangles = mesh.cell_count(),
        "Loaded surface geometry"
    );
    Ok(mesh)
}

/// Parse STL bytes
pub fn parse(bytes: &[u8]) -> std::result::Result<Mesh, String> {
    if is_binary(bytes) {
        parse_binary(bytes)
    } else {
        parse_ascii(bytes)
    }
}

/// Binary files may also start with "solid", so trust the size check first
fn is_binary(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_LEN + 4 {
        return false;
    }
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    if bytes.len() == HEADER_LEN + 4 + count * FACET_LEN {
        return true;
    }
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    !bytes[start..].starts_with(b"solid")
}

struct MergingBuilder {
    mesh: Mesh,
    lookup: FxHashMap<[u64; 3], u32>,
}

impl MergingBuilder {
    fn new(triangles: usize) -> Self {
        Self {
            mesh: Mesh::with_capacity(triangles / 2 + 3, triangles),
            lookup: FxHashMap::default(),
        }
    }

    fn point(&mut self, p: [f64; 3]) -> u32 {
        // +0.0 and -0.0 must merge
        let key = p.map(|c| (c + 0.0).to_bits());
        *self
            .lookup
            .entry(key)
            .or_insert_with(|| self.mesh.push_point(Point3::new(p[0], p[1], p[2])))
    }

    fn triangle(&mut self, vertices: [[f64; 3]; 3]) {
        let a = self.point(vertices[0]);
        let b = self.point(vertices[1]);
        let c = self.point(vertices[2]);
        self.mesh.push_cell(Cell::triangle(a, b, c));
    }
}

fn parse_binary(bytes: &[u8]) -> std::result::Result<Mesh, String> {
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    let body = &bytes[HEADER_LEN + 4..];
    if body.len() < count * FACET_LEN {
        return Err(format!(
            "binary STL declares {} facets but holds only {}",
            count,
            body.len() / FACET_LEN
        ));
    }

    let read_f32 = |chunk: &[u8], offset: usize| -> f64 {
        f32::from_le_bytes([
            chunk[offset],
            chunk[offset + 1],
            chunk[offset + 2],
            chunk[offset + 3],
        ]) as f64
    };

    let mut builder = MergingBuilder::new(count);
    for facet in body.chunks_exact(FACET_LEN).take(count) {
        // 12 bytes of normal, then three vertices, then 2 attribute bytes
        let mut vertices = [[0.0; 3]; 3];
        for (v, vertex) in vertices.iter_mut().enumerate() {
            for (c, coord) in vertex.iter_mut().enumerate() {
                *coord = read_f32(facet, 12 + v * 12 + c * 4);
            }
        }
        builder.triangle(vertices);
    }
    Ok(builder.mesh)
}

fn parse_ascii(bytes: &[u8]) -> std::result::Result<Mesh, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("ASCII STL is not UTF-8: {e}"))?;

    let mut builder = MergingBuilder::new(text.len() / 256);
    let mut pending: Vec<[f64; 3]> = Vec::with_capacity(3);

    for (line_no, line) in text.lines().enumerate() {
        let mut tokens = line.split_ascii_whitespace();
        match tokens.next() {
            Some("vertex") => {
                let mut coords = [0.0; 3];
                for coord in coords.iter_mut() {
                    let token = tokens
                        .next()
                        .ok_or_else(|| format!("line {}: vertex needs 3 coordinates", line_no + 1))?;
                    *coord = fast_float::parse(token)
                        .map_err(|_| format!("line {}: bad coordinate '{}'", line_no + 1, token))?;
                }
                pending.push(coords);
            }
            Some("endloop") => {
                if pending.len() != 3 {
                    return Err(format!(
                        "line {}: facet has {} vertices, expected 3",
                        line_no + 1,
                        pending.len()
                    ));
                }
                builder.triangle([pending[0], pending[1], pending[2]]);
                pending.clear();
            }
            _ => {}
        }
    }
    Ok(builder.mesh)
}
