// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Urban Wind Geometry
//!
//! Geometric operations on unstructured meshes carrying wind fields:
//! affine transforms, half-space and oriented-box clipping, tetrahedral
//! decomposition, surface normals and roof detection, and field probing.
//!
//! Every operation takes its input by reference and returns a new [`Mesh`].
//! Per-point and per-cell work runs on the rayon pool; anything that creates
//! points is merged on one thread in cell order so numbering is repeatable.
//!
//! ```rust,ignore
//! use urban_wind_geometry::{clip, OrientedBox};
//!
//! let bounds = OrientedBox::new(center, size, 28.5);
//! let subset = clip::clip_to_oriented_box(&volume, &bounds);
//! ```

pub mod clip;
pub mod error;
pub mod measure;
pub mod normals;
pub mod plane;
pub mod probe;
pub mod roof;
pub mod topology;
pub mod transform;

pub use urban_wind_core::{Mesh, Point3, Vector3};

pub use clip::{clip_half_space, clip_to_oriented_box};
pub use error::{Error, Result};
pub use plane::{HalfSpace, OrientedBox};
pub use probe::{probe, CellLocator, VALID_POINT_MASK};
pub use roof::{extract_roofs, ROOF_THRESHOLD, Z_NORMAL};
pub use topology::{append_blocks, simplexify, tetrahedralize};
pub use transform::{transform_mesh, translate, AffineTransform, NORMALS};
