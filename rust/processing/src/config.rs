// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pipeline configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below. Two environment variables are read on top:
//!
//! - `URBAN_WIND_WORKER_THREADS`: size of the rayon pool (default: CPU count)
//! - `URBAN_WIND_OUTPUT_DIR`: prefix for relative output paths

use crate::derive::AttributeMode;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::pipeline::Stage;
use nom::{
    character::complete::multispace0,
    multi::many1,
    number::complete::double,
    sequence::preceded,
    IResult,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use urban_wind_core::io::write_atomically;
use urban_wind_core::{Point3, Vector3};
use urban_wind_geometry::OrientedBox;

pub const WORKER_THREADS_VAR: &str = "URBAN_WIND_WORKER_THREADS";
pub const OUTPUT_DIR_VAR: &str = "URBAN_WIND_OUTPUT_DIR";

/// Multi-block solver output and the field to extract from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub path: PathBuf,
    /// Point vector array loaded as `velocity`
    pub field: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/source.json"),
            field: urban_wind_core::io::multiblock::VELOCITY.to_string(),
        }
    }
}

/// Where each product is written. A `.vtk` extension selects legacy VTK,
/// anything else the JSON mesh format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub normalized: PathBuf,
    pub roof_offset: PathBuf,
    pub subset: PathBuf,
    pub subset_rescaled: PathBuf,
    pub roof_offset_rescaled: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            normalized: PathBuf::from("data/Normalized.json"),
            roof_offset: PathBuf::from("data/RoofOffset.json"),
            subset: PathBuf::from("data/Subset.json"),
            subset_rescaled: PathBuf::from("data/SubsetRescaled.json"),
            roof_offset_rescaled: PathBuf::from("data/RoofOffsetRescaled.json"),
        }
    }
}

impl OutputPaths {
    /// Output path of the product `stage` writes
    pub fn of(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Normalize => &self.normalized,
            Stage::RoofOffset => &self.roof_offset,
            Stage::Subset => &self.subset,
            Stage::RescaleSubset => &self.subset_rescaled,
            Stage::RescaleRoofOffset => &self.roof_offset_rescaled,
        }
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut PathBuf> {
        [
            &mut self.normalized,
            &mut self.roof_offset,
            &mut self.subset,
            &mut self.subset_rescaled,
            &mut self.roof_offset_rescaled,
        ]
        .into_iter()
    }
}

/// Oriented clip box: center, edge lengths, rotation about Z in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipBox {
    pub center: [f64; 3],
    pub size: [f64; 3],
    pub rotation: f64,
}

impl Default for ClipBox {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0, 250.0],
            size: [1000.0, 1000.0, 500.0],
            rotation: 28.5,
        }
    }
}

impl ClipBox {
    pub fn to_oriented_box(&self) -> OrientedBox {
        OrientedBox::new(
            Point3::from(self.center),
            Vector3::from(self.size),
            self.rotation,
        )
    }
}

impl From<&OrientedBox> for ClipBox {
    fn from(b: &OrientedBox) -> Self {
        Self {
            center: b.center.coords.into(),
            size: b.size.into(),
            rotation: b.rotation,
        }
    }
}

/// Extra array computed on the normalized product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedArray {
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub mode: AttributeMode,
}

/// Per-cell CSV export of one scalar array of one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsExport {
    pub product: Stage,
    pub array: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    /// Building surface geometry (STL)
    pub buildings: PathBuf,
    pub outputs: OutputPaths,
    /// Multiplier applied to `velocity` before derivation
    pub scale_factor: f64,
    /// Height above the roofs at which the field is sampled
    pub roof_offset: f64,
    pub subset: ClipBox,
    /// Clip settings file that replaces `subset` when given
    pub clip_settings: Option<PathBuf>,
    /// Multiplier for the rescaled products
    pub rescale_factor: f64,
    pub derived: Vec<DerivedArray>,
    pub statistics: Option<StatisticsExport>,
    /// Worker threads for parallel stages, from the environment only
    #[serde(skip)]
    pub worker_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            buildings: PathBuf::from("data/buildings.stl"),
            outputs: OutputPaths::default(),
            scale_factor: 2.0,
            roof_offset: 10.0,
            subset: ClipBox::default(),
            clip_settings: None,
            rescale_factor: 0.75,
            derived: Vec::new(),
            statistics: None,
            worker_threads: num_cpus::get(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON configuration file and apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| urban_wind_core::Error::load(path, e.to_string()))?;
        let mut config: PipelineConfig = serde_json::from_str(&text)
            .map_err(|e| urban_wind_core::Error::load(path, e.to_string()))?;
        config.apply_env();
        Ok(config)
    }

    /// Apply `URBAN_WIND_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Unparseable values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(threads) = lookup(WORKER_THREADS_VAR).and_then(|v| v.trim().parse().ok()) {
            self.worker_threads = threads;
        }

        if let Some(dir) = lookup(OUTPUT_DIR_VAR).filter(|v| !v.is_empty()) {
            let dir = PathBuf::from(dir);
            let statistics = self.statistics.as_mut().map(|s| &mut s.path);
            for path in self.outputs.iter_mut().chain(statistics) {
                if path.is_relative() {
                    *path = dir.join(&*path);
                }
            }
        }
    }

    /// Reject values that would make a stage meaningless
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("source.path", self.source.path.as_path()),
            ("buildings", self.buildings.as_path()),
            ("outputs.normalized", self.outputs.normalized.as_path()),
            ("outputs.roof_offset", self.outputs.roof_offset.as_path()),
            ("outputs.subset", self.outputs.subset.as_path()),
            ("outputs.subset_rescaled", self.outputs.subset_rescaled.as_path()),
            ("outputs.roof_offset_rescaled", self.outputs.roof_offset_rescaled.as_path()),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(format!("{key} must not be empty")));
            }
        }
        if self.source.field.is_empty() {
            return Err(Error::Config("source.field must not be empty".into()));
        }

        for (key, value) in [
            ("scale_factor", self.scale_factor),
            ("roof_offset", self.roof_offset),
            ("rescale_factor", self.rescale_factor),
            ("subset.rotation", self.subset.rotation),
        ] {
            if !value.is_finite() {
                return Err(Error::Config(format!("{key} must be finite, got {value}")));
            }
        }
        if self.rescale_factor == 0.0 {
            return Err(Error::Config("rescale_factor must not be zero".into()));
        }
        if self
            .subset
            .center
            .iter()
            .chain(&self.subset.size)
            .any(|v| !v.is_finite())
        {
            return Err(Error::Config("subset center and size must be finite".into()));
        }
        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be at least 1".into()));
        }

        for derived in &self.derived {
            if derived.name.is_empty() {
                return Err(Error::Config("derived array name must not be empty".into()));
            }
            Expr::parse(&derived.expression)?;
        }
        if let Some(statistics) = &self.statistics {
            if statistics.array.is_empty() || statistics.path.as_os_str().is_empty() {
                return Err(Error::Config(
                    "statistics.array and statistics.path must not be empty".into(),
                ));
            }
        }
        if let Some(path) = &self.clip_settings {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("clip_settings must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Box the subset stage clips to: the clip settings file when one is
    /// configured, `subset` otherwise
    pub fn subset_box(&self) -> Result<OrientedBox> {
        match &self.clip_settings {
            Some(path) => read_clip_settings(path),
            None => Ok(self.subset.to_oriented_box()),
        }
    }
}

pub const CLIP_SETTINGS_HEADER: &str = "Center, Size, Rotation, Type";

/// Clip type recorded in settings files. The subset stage always clips
/// plane by plane, which viewers know as type 2.
pub const CLIP_TYPE_ACCURATE: u8 = 2;

/// Write an oriented box as a header line plus
/// `cx cy cz sx sy sz rotation type`
pub fn write_clip_settings(bounds: &OrientedBox, path: &Path) -> Result<()> {
    let (c, s) = (bounds.center, bounds.size);
    write_atomically(path, |w| {
        writeln!(w, "{CLIP_SETTINGS_HEADER}")?;
        writeln!(
            w,
            "{} {} {} {} {} {} {} {}",
            c.x, c.y, c.z, s.x, s.y, s.z, bounds.rotation, CLIP_TYPE_ACCURATE
        )
    })?;
    Ok(())
}

fn clip_values(input: &str) -> IResult<&str, Vec<f64>> {
    many1(preceded(multispace0, double))(input)
}

/// Read a file written by [`write_clip_settings`]. The clip type is
/// ignored and may be left out.
pub fn read_clip_settings(path: &Path) -> Result<OrientedBox> {
    let load_error = |reason: String| Error::from(urban_wind_core::Error::load(path, reason));

    let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    let body = match text.split_once('\n') {
        Some((_, body)) => body,
        None => return Err(load_error("missing clip values after header".into())),
    };

    let (rest, values) =
        clip_values(body).map_err(|_| load_error("expected numeric clip values".into()))?;
    if !rest.trim().is_empty() {
        return Err(load_error(format!("unexpected trailing input '{}'", rest.trim())));
    }
    match values.as_slice() {
        [cx, cy, cz, sx, sy, sz, rotation] | [cx, cy, cz, sx, sy, sz, rotation, _] => Ok(OrientedBox::new(
            Point3::new(*cx, *cy, *cz),
            Vector3::new(*sx, *sy, *sz),
            *rotation,
        )),
        _ => Err(load_error(format!("expected 8 clip values, found {}", values.len()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("urban-wind-config-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "scale_factor": 3.0, "subset": { "rotation": 10.0 } }"#).unwrap();
        assert_eq!(config.scale_factor, 3.0);
        assert_eq!(config.rescale_factor, 0.75);
        assert_eq!(config.roof_offset, 10.0);
        assert_eq!(config.subset.center, [0.0, 0.0, 250.0]);
        assert_eq!(config.subset.rotation, 10.0);
        assert_eq!(config.source.field, "velocity");
        assert!(config.worker_threads >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::default();
        config.outputs.subset = PathBuf::from("/abs/Subset.json");
        config.statistics = Some(StatisticsExport {
            product: Stage::Subset,
            array: "velocityNormXYMag".into(),
            path: PathBuf::from("stats.csv"),
        });
        config.apply_env_from(|key| match key {
            WORKER_THREADS_VAR => Some("3".into()),
            OUTPUT_DIR_VAR => Some("/tmp/out".into()),
            _ => None,
        });

        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.outputs.normalized, PathBuf::from("/tmp/out/data/Normalized.json"));
        assert_eq!(config.outputs.subset, PathBuf::from("/abs/Subset.json"));
        assert_eq!(
            config.statistics.map(|s| s.path),
            Some(PathBuf::from("/tmp/out/stats.csv"))
        );
    }

    #[test]
    fn test_unparseable_thread_count_is_ignored() {
        let mut config = PipelineConfig::default();
        let before = config.worker_threads;
        config.apply_env_from(|key| (key == WORKER_THREADS_VAR).then(|| "many".to_string()));
        assert_eq!(config.worker_threads, before);
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = PipelineConfig::default();
        config.rescale_factor = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.buildings = PathBuf::new();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.derived.push(DerivedArray {
            name: "bad".into(),
            expression: "velocityNormZ +".into(),
            mode: AttributeMode::Point,
        });
        assert!(matches!(config.validate(), Err(Error::Expression { .. })));
    }

    #[test]
    fn test_clip_settings_round_trip() {
        let path = temp_path("clip.txt");
        let bounds = ClipBox::default().to_oriented_box();
        write_clip_settings(&bounds, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Center, Size, Rotation, Type\n0 0 250 1000 1000 500 28.5 2\n");
        assert_eq!(read_clip_settings(&path).unwrap(), bounds);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_clip_settings_ignore_type() {
        let path = temp_path("clip-type.txt");
        std::fs::write(&path, "Center, Size, Rotation, Type\n1 2 3 4 5 6 -15.25 4\n").unwrap();
        let bounds = read_clip_settings(&path).unwrap();
        assert_eq!(ClipBox::from(&bounds).center, [1.0, 2.0, 3.0]);
        assert_eq!(bounds.rotation, -15.25);

        std::fs::write(&path, "Center, Size, Rotation\n1 2 3 4 5 6 -15.25\n").unwrap();
        assert_eq!(read_clip_settings(&path).unwrap(), bounds);

        std::fs::write(&path, "Center, Size, Rotation\n1 2 3\n").unwrap();
        assert!(read_clip_settings(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_subset_box_prefers_clip_settings() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.subset_box().unwrap(), config.subset.to_oriented_box());

        let path = temp_path("subset-box.txt");
        let saved = OrientedBox::new(Point3::new(5.0, 6.0, 7.0), Vector3::new(8.0, 9.0, 10.0), 45.0);
        write_clip_settings(&saved, &path).unwrap();
        config = serde_json::from_value(serde_json::json!({ "clip_settings": &path })).unwrap();
        assert_eq!(config.subset_box().unwrap(), saved);
        std::fs::remove_file(&path).ok();

        assert!(matches!(
            config.subset_box(),
            Err(Error::Core(urban_wind_core::Error::LoadFailure { .. }))
        ));
    }
}
