// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for mesh model and I/O operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the mesh model and the file readers/writers
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load {}: {reason}", path.display())]
    LoadFailure { path: PathBuf, reason: String },

    #[error("Failed to save {}: {reason}", path.display())]
    SaveFailure { path: PathBuf, reason: String },

    #[error("{stage}: required array '{name}' is missing")]
    MissingArray { stage: &'static str, name: String },

    #[error("Array '{name}' is not a {expected} array")]
    ArrayKind { name: String, expected: &'static str },

    #[error("Array '{name}' has {actual} tuples, expected {expected}")]
    ArrayLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cell {cell} references point {point} but the mesh has {point_count} points")]
    InvalidCell {
        cell: usize,
        point: u32,
        point_count: usize,
    },

    #[error("Cell {cell} is a {kind} with {points} points")]
    CellArity {
        cell: usize,
        kind: &'static str,
        points: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::LoadFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn save(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::SaveFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_array(stage: &'static str, name: impl Into<String>) -> Self {
        Error::MissingArray {
            stage,
            name: name.into(),
        }
    }
}
