// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The five pipeline stages
//!
//! ```text
//! source ──normalize──▶ Normalized ──roof_offset──▶ RoofOffset ──rescale──▶ RoofOffsetRescaled
//!                           │            ▲
//!                           │        buildings
//!                           └──subset──▶ Subset ──rescale──▶ SubsetRescaled
//! ```
//!
//! Each stage is a plain function from meshes to a mesh. [`Session`] chains
//! them, keeps the products of the stages it ran in memory, and loads any
//! other input product from its output path, so a single stage can be re-run
//! on its own.

use crate::config::{DerivedArray, PipelineConfig, StatisticsExport};
use crate::derive::{
    evaluate, normalize_velocity, AttributeMode, VELOCITY, VELOCITY_NORM_XY_ANGLE,
    VELOCITY_NORM_XY_MAG, VELOCITY_NORM_Z,
};
use crate::error::{Error, Result};
use crate::export::{summarize, write_cell_statistics, Summary};
use crate::expr::Expr;
use crate::scale::rescale;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};
use urban_wind_core::io::{self, multiblock, stl};
use urban_wind_core::{FieldArray, Mesh, MultiBlock};
use urban_wind_geometry::{
    append_blocks, clip_to_oriented_box, extract_roofs, probe, tetrahedralize, translate,
    OrientedBox, ROOF_THRESHOLD, VALID_POINT_MASK,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    RoofOffset,
    Subset,
    RescaleSubset,
    RescaleRoofOffset,
}

impl Stage {
    /// Execution order of a full run
    pub const ALL: [Stage; 5] = [
        Stage::Normalize,
        Stage::RoofOffset,
        Stage::Subset,
        Stage::RescaleSubset,
        Stage::RescaleRoofOffset,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::RoofOffset => "roof_offset",
            Stage::Subset => "subset",
            Stage::RescaleSubset => "rescale_subset",
            Stage::RescaleRoofOffset => "rescale_roof_offset",
        }
    }

    /// Product this stage reads, if it reads one
    pub fn input(self) -> Option<Stage> {
        match self {
            Stage::Normalize => None,
            Stage::RoofOffset | Stage::Subset => Some(Stage::Normalize),
            Stage::RescaleSubset => Some(Stage::Subset),
            Stage::RescaleRoofOffset => Some(Stage::RoofOffset),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Stage::ALL.iter().map(|s| s.name()).collect();
                Error::Config(format!("unknown stage '{s}', expected one of {}", names.join(", ")))
            })
    }
}

/// Merge the source blocks, tetrahedralize, derive the wind arrays and any
/// extra arrays.
///
/// A source without points gives an empty mesh carrying the derived arrays.
pub fn normalize_source(blocks: &MultiBlock, scale_factor: f64, extras: &[DerivedArray]) -> Result<Mesh> {
    let mut volume = tetrahedralize(&append_blocks(blocks));
    info!(
        blocks = blocks.len(),
        points = volume.point_count(),
        cells = volume.cell_count(),
        "Merged source into a tetrahedral volume"
    );

    if volume.points.is_empty() && !volume.point_data.contains(VELOCITY) {
        warn!("Source has no points");
        volume.point_data.insert(FieldArray::vector(VELOCITY, Vec::new()));
    }

    normalize_velocity(&mut volume, scale_factor)?;
    for extra in extras {
        let expr = Expr::parse(&extra.expression)?;
        evaluate(&mut volume, extra.mode, &extra.name, &expr)?;
    }
    log_ranges(&volume);
    Ok(volume)
}

/// Sample `volume` on the building roofs lifted by `offset`.
///
/// Interpolation near the edge of the volume can push the horizontal speed
/// slightly below zero, so it is clamped at zero afterwards.
pub fn roof_offset(volume: &Mesh, buildings: &Mesh, offset: f64) -> Result<Mesh> {
    volume
        .point_data
        .require_scalar(Stage::RoofOffset.name(), VELOCITY_NORM_XY_MAG)?;

    let roofs = extract_roofs(buildings, ROOF_THRESHOLD);
    let lifted = translate(&roofs, offset);
    let mut sampled = probe(&lifted, volume);
    debug!(points = sampled.point_count(), offset, "Probed roof surface");

    let clamp = Expr::number(0.0).max(Expr::array(VELOCITY_NORM_XY_MAG));
    evaluate(&mut sampled, AttributeMode::Point, VELOCITY_NORM_XY_MAG, &clamp)?;
    sampled.point_data.remove(VALID_POINT_MASK);

    log_ranges(&sampled);
    Ok(sampled)
}

/// Clip `volume` to the oriented box
pub fn extract_subset(volume: &Mesh, bounds: &OrientedBox) -> Mesh {
    let subset = clip_to_oriented_box(volume, bounds);
    info!(
        cells_in = volume.cell_count(),
        cells_out = subset.cell_count(),
        "Extracted subset"
    );
    subset
}

/// Rescale the speed arrays of a product
pub fn rescale_product(mut product: Mesh, factor: f64) -> Result<Mesh> {
    rescale(&mut product, factor)?;
    log_ranges(&product);
    Ok(product)
}

fn log_ranges(mesh: &Mesh) {
    for name in [VELOCITY_NORM_Z, VELOCITY_NORM_XY_MAG, VELOCITY_NORM_XY_ANGLE] {
        if let Some(range) = mesh.point_data.scalar_range(name) {
            info!(array = name, min = range.min, max = range.max, "Array range");
        }
    }
}

/// Runs stages against one configuration, caching their products
pub struct Session<'a> {
    config: &'a PipelineConfig,
    products: [Option<Mesh>; 5],
}

impl<'a> Session<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            products: Default::default(),
        }
    }

    /// Product of `stage`, loading it from its output path when this session
    /// has not produced it
    pub fn product(&mut self, stage: Stage) -> Result<&Mesh> {
        let slot = &mut self.products[stage.index()];
        let mesh = match slot.take() {
            Some(mesh) => mesh,
            None => {
                let path = self.config.outputs.of(stage);
                info!(stage = stage.name(), path = %path.display(), "Loading product");
                io::load_mesh(path)?
            }
        };
        Ok(slot.insert(mesh))
    }

    /// Run one stage and save its product. Failures are reported with the
    /// stage name and leave no output file behind.
    pub fn run_stage(&mut self, stage: Stage) -> Result<()> {
        let span = info_span!("stage", stage = stage.name());
        let _enter = span.enter();
        let started = Instant::now();

        let config = self.config;
        let output = self.compute(stage).map_err(|e| Error::stage(stage.name(), e))?;
        let path = config.outputs.of(stage);
        io::save_mesh(&output, path).map_err(|e| Error::stage(stage.name(), e))?;

        info!(
            points = output.point_count(),
            cells = output.cell_count(),
            path = %path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage finished"
        );
        self.products[stage.index()] = Some(output);
        Ok(())
    }

    fn compute(&mut self, stage: Stage) -> Result<Mesh> {
        let config = self.config;
        match stage {
            Stage::Normalize => {
                let blocks = multiblock::load(&config.source.path, &config.source.field)?;
                normalize_source(&blocks, config.scale_factor, &config.derived)
            }
            Stage::RoofOffset => {
                let buildings = stl::load(&config.buildings)?;
                let volume = self.product(Stage::Normalize)?;
                roof_offset(volume, &buildings, config.roof_offset)
            }
            Stage::Subset => {
                let bounds = config.subset_box()?;
                let volume = self.product(Stage::Normalize)?;
                Ok(extract_subset(volume, &bounds))
            }
            Stage::RescaleSubset => {
                let subset = self.product(Stage::Subset)?.clone();
                rescale_product(subset, config.rescale_factor)
            }
            Stage::RescaleRoofOffset => {
                let roofs = self.product(Stage::RoofOffset)?.clone();
                rescale_product(roofs, config.rescale_factor)
            }
        }
    }

    /// Write and log the statistics export requested by the configuration
    pub fn export_statistics(&mut self) -> Result<()> {
        let config = self.config;
        let Some(request) = &config.statistics else {
            return Ok(());
        };
        let stage = request.product;
        let summary = self
            .write_statistics(request)
            .map_err(|e| Error::stage("statistics", e))?;

        match summary {
            Some(summary) => info!(
                product = stage.name(),
                array = %request.array,
                min = summary.range.min,
                max = summary.range.max,
                mean = summary.mean,
                total_size = summary.total_size,
                cells = summary.cells,
                "Summary"
            ),
            None => warn!(product = stage.name(), "Nothing to summarize"),
        }
        Ok(())
    }

    fn write_statistics(&mut self, request: &StatisticsExport) -> Result<Option<Summary>> {
        let mesh = self.product(request.product)?;
        write_cell_statistics(mesh, &request.array, &request.path)?;
        summarize(mesh, &request.array)
    }
}

/// Run `stages` in order
pub fn run_stages(config: &PipelineConfig, stages: &[Stage]) -> Result<()> {
    config.validate()?;
    let mut session = Session::new(config);
    for &stage in stages {
        session.run_stage(stage)?;
    }
    session.export_statistics()
}

/// Run the whole pipeline
pub fn run(config: &PipelineConfig) -> Result<()> {
    let started = Instant::now();
    run_stages(config, &Stage::ALL)?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "Pipeline finished");
    Ok(())
}
