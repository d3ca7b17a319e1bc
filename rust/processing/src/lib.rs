// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Urban Wind Processing
//!
//! Turns solver velocity output into the urban wind products:
//!
//! - **Normalized**: the merged tetrahedral volume with vertical speed,
//!   horizontal speed, horizontal direction and incoming-wind bearing
//! - **RoofOffset**: those arrays sampled a fixed height above the building roofs
//! - **Subset**: the volume clipped to an oriented box
//! - **SubsetRescaled** / **RoofOffsetRescaled**: the speeds multiplied by a
//!   uniform factor
//!
//! ```rust,ignore
//! use urban_wind_processing::{pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_file("wind.json".as_ref())?;
//! pipeline::run(&config)?;
//! ```
//!
//! Derived arrays are described by [`Expr`] trees, which can also be parsed
//! from text:
//!
//! ```rust,ignore
//! let gust = Expr::parse("velocityNormXYMag * 1.4")?;
//! derive::evaluate(&mut mesh, AttributeMode::Point, "gust", &gust)?;
//! ```

pub mod config;
pub mod derive;
pub mod error;
pub mod export;
pub mod expr;
pub mod pipeline;
pub mod scale;

pub use config::{read_clip_settings, write_clip_settings, ClipBox, PipelineConfig};
pub use derive::{evaluate, normalize_velocity, AttributeMode};
pub use error::{Error, Result};
pub use export::{summarize, write_cell_statistics, Summary};
pub use expr::{Expr, Value, ValueKind};
pub use pipeline::{
    extract_subset, normalize_source, rescale_product, roof_offset, run, run_stages, Session, Stage,
};
pub use scale::rescale;
