// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Urban Wind Core
//!
//! In-memory model for volumetric and surface meshes carrying sampled wind
//! fields, plus the file formats the pipeline reads and writes.
//!
//! - [`Mesh`]: points, typed [`Cell`]s and named per-point / per-cell arrays
//! - [`Attributes`]: ordered, uniquely named [`FieldArray`]s
//! - [`MultiBlock`]: independently indexed partitions of one dataset
//! - [`io`]: STL, native JSON, multi-block source and legacy VTK export
//!
//! ```rust,ignore
//! use urban_wind_core::{io, Mesh};
//!
//! let buildings = io::stl::load(Path::new("city.stl"))?;
//! io::save_mesh(&buildings, Path::new("city.vtk"))?;
//! ```

pub mod attributes;
pub mod cell;
pub mod error;
pub mod io;
pub mod mesh;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point3, Vector3};

pub use attributes::{Attributes, FieldArray, FieldData, FieldRange};
pub use cell::{Cell, CellKind, CellPoints, FacePoints};
pub use error::{Error, Result};
pub use mesh::{Mesh, MultiBlock};
