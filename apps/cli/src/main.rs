// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Urban Wind - runs the wind processing pipeline from a JSON configuration.
//!
//! ```text
//! urban-wind <config.json> [--threads N] [--only STAGE] [--clip-settings FILE]
//! urban-wind <config.json> --save-clip-settings FILE
//! urban-wind --print-default-config
//! ```
//!
//! `--clip-settings` reads the subset box from a clip settings file instead
//! of the configuration; `--save-clip-settings` writes the configured box to
//! one and exits.
//!
//! `RUST_LOG` controls log verbosity. `URBAN_WIND_WORKER_THREADS` and
//! `URBAN_WIND_OUTPUT_DIR` override the configuration file.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use urban_wind_processing::{pipeline, write_clip_settings, PipelineConfig, Stage};

const USAGE: &str = "usage: urban-wind <config.json> [--threads N] [--only STAGE] \
[--clip-settings FILE] [--save-clip-settings FILE] [--print-default-config]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    threads: Option<usize>,
    only: Option<Stage>,
    clip_settings: Option<PathBuf>,
    save_clip_settings: Option<PathBuf>,
    print_default_config: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--threads" => {
                let value = args.next().context("--threads needs a value")?;
                let threads: usize = value
                    .parse()
                    .with_context(|| format!("invalid thread count '{value}'"))?;
                if threads == 0 {
                    bail!("--threads must be at least 1");
                }
                parsed.threads = Some(threads);
            }
            "--only" => {
                let value = args.next().context("--only needs a stage name")?;
                parsed.only = Some(value.parse()?);
            }
            "--clip-settings" => {
                let value = args.next().context("--clip-settings needs a file")?;
                parsed.clip_settings = Some(PathBuf::from(value));
            }
            "--save-clip-settings" => {
                let value = args.next().context("--save-clip-settings needs a file")?;
                parsed.save_clip_settings = Some(PathBuf::from(value));
            }
            "--print-default-config" => parsed.print_default_config = true,
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n{USAGE}"),
            path => {
                if parsed.config.replace(PathBuf::from(path)).is_some() {
                    bail!("more than one configuration file given\n{USAGE}");
                }
            }
        }
    }
    Ok(parsed)
}

fn run(args: Args) -> Result<()> {
    if args.print_default_config {
        println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        return Ok(());
    }

    let path = args.config.context(USAGE)?;
    let mut config = PipelineConfig::from_file(&path)
        .with_context(|| format!("failed to load configuration {}", path.display()))?;
    if let Some(threads) = args.threads {
        config.worker_threads = threads;
    }
    if let Some(settings) = args.clip_settings {
        config.clip_settings = Some(settings);
    }

    if let Some(target) = args.save_clip_settings {
        let bounds = config.subset_box().context("failed to resolve the subset box")?;
        write_clip_settings(&bounds, &target)
            .with_context(|| format!("failed to write {}", target.display()))?;
        tracing::info!(path = %target.display(), "Saved clip settings");
        return Ok(());
    }

    tracing::info!(
        config = %path.display(),
        source = %config.source.path.display(),
        worker_threads = config.worker_threads,
        scale_factor = config.scale_factor,
        rescale_factor = config.rescale_factor,
        "Starting Urban Wind"
    );

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build_global()
        .context("failed to build worker pool")?;

    match args.only {
        Some(stage) => pipeline::run_stages(&config, &[stage])
            .with_context(|| format!("stage {stage} failed"))?,
        None => pipeline::run(&config).context("pipeline failed")?,
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,urban_wind_processing=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = parse_args(std::env::args().skip(1)).and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_full() {
        let args = parse(&[
            "wind.json",
            "--threads",
            "4",
            "--only",
            "roof_offset",
            "--clip-settings",
            "box.txt",
        ])
        .unwrap();
        assert_eq!(
            args,
            Args {
                config: Some(PathBuf::from("wind.json")),
                threads: Some(4),
                only: Some(Stage::RoofOffset),
                clip_settings: Some(PathBuf::from("box.txt")),
                save_clip_settings: None,
                print_default_config: false,
            }
        );
    }

    #[test]
    fn test_parse_rejects() {
        assert!(parse(&["--threads", "0"]).is_err());
        assert!(parse(&["--threads"]).is_err());
        assert!(parse(&["--only", "everything"]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["a.json", "--save-clip-settings"]).is_err());
    }

    #[test]
    fn test_missing_config() {
        assert!(run(Args::default()).is_err());
    }

    #[test]
    fn test_save_clip_settings_writes_configured_box() {
        let dir = std::env::temp_dir().join(format!("urban-wind-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = dir.join("wind.json");
        std::fs::write(&config, r#"{ "subset": { "center": [1, 2, 3], "rotation": 90 } }"#).unwrap();
        let target = dir.join("box.txt");

        run(Args {
            config: Some(config),
            save_clip_settings: Some(target.clone()),
            ..Args::default()
        })
        .unwrap();

        let text = std::fs::read_to_string(&target).unwrap();
        assert_eq!(text, "Center, Size, Rotation, Type\n1 2 3 1000 1000 500 90 2\n");
        std::fs::remove_dir_all(&dir).ok();
    }
}
