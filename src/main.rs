//! wsi-reader - inspect and read whole-slide images from the command line.
//!
//! Every subcommand is a thin call into the library. Errors exit with the
//! code mapped from the error kind.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use image::ImageFormat;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_reader::{
    config::{Cli, Command, RegionArgs},
    detect, CancellationToken, Detection, OpenOptions, Region, SlideError, SlideHandle,
    TileBuffer,
};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Slide(#[from] SlideError),

    #[error("Failed to write {path}: {message}")]
    Output { path: String, message: String },

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Slide(err) => err.exit_code(),
            CliError::Output { .. } => 73,
            CliError::Worker(_) => 70,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let options = match cli.open_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Detect { path } => run_detect(&path),
        Command::Info { path, json } => run_info(&path, json, options),
        Command::Properties { path, name } => run_properties(&path, name.as_deref(), options),
        Command::Region(args) => run_region(args, options).await,
        Command::Associated { path, name, output } => {
            run_associated(&path, &name, &output, options)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so stdout stays clean for command output.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_reader=debug"
    } else {
        "wsi_reader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Metadata Commands
// =============================================================================

fn run_detect(path: &Path) -> Result<(), CliError> {
    match detect(path) {
        Detection::Recognized(format) => {
            println!("{}", format.vendor());
            Ok(())
        }
        Detection::Unrecognized(reason) => {
            println!("unrecognized: {reason}");
            Err(SlideError::UnsupportedFormat {
                path: path.display().to_string(),
                reason: reason.to_string(),
            }
            .into())
        }
    }
}

fn run_info(path: &Path, json: bool, options: OpenOptions) -> Result<(), CliError> {
    let slide = SlideHandle::open_with(path, options)?;
    let format = slide.format()?;
    let levels = slide.levels()?;
    let associated = slide.associated_image_names()?;
    let degenerate = slide.degenerate_levels()?;

    if json {
        let tiles = levels
            .iter()
            .map(|level| slide.tile_grid(level.index))
            .collect::<Result<Vec<_>, _>>()?;
        let value = serde_json::json!({
            "path": path.display().to_string(),
            "format": format,
            "vendor": format.vendor(),
            "levels": levels,
            "tiles": tiles,
            "degenerate_levels": degenerate,
            "associated_images": associated,
        });
        println!("{}", to_pretty_json(&value)?);
        return Ok(());
    }

    println!("path:    {}", path.display());
    println!("format:  {}", format.name());
    println!("vendor:  {}", format.vendor());
    println!("levels:  {}", levels.len());
    for level in levels {
        let grid = slide.tile_grid(level.index)?;
        println!(
            "  [{}] {}x{}  downsample {}  tiles {}x{} ({}x{})",
            level.index,
            level.width,
            level.height,
            level.downsample,
            grid.tile_width,
            grid.tile_height,
            grid.cols,
            grid.rows
        );
    }
    if !degenerate.is_empty() {
        println!("degenerate levels: {:?}", degenerate);
    }
    if !associated.is_empty() {
        println!("associated: {}", associated.join(", "));
    }
    Ok(())
}

fn run_properties(path: &Path, name: Option<&str>, options: OpenOptions) -> Result<(), CliError> {
    let slide = SlideHandle::open_with(path, options)?;
    match name {
        Some(name) => println!("{}", slide.property(name)?),
        None => {
            for (key, value) in slide.properties()?.iter() {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}

fn to_pretty_json(value: &serde_json::Value) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::Output {
        path: "stdout".to_string(),
        message: e.to_string(),
    })
}

// =============================================================================
// Pixel Commands
// =============================================================================

/// Read a region on a blocking worker; Ctrl-C cancels between tiles.
async fn run_region(args: RegionArgs, options: OpenOptions) -> Result<(), CliError> {
    let token = CancellationToken::new();
    let worker_token = token.clone();
    let output = args.output.clone();

    let mut worker = tokio::task::spawn_blocking(move || -> Result<(Region, TileBuffer), SlideError> {
        let slide = SlideHandle::open_with(&args.path, options)?;
        let level = match (args.level, args.downsample) {
            (Some(level), _) => level,
            (None, Some(downsample)) => slide.best_level_for_downsample(downsample)?,
            (None, None) => 0,
        };
        let region = Region::new(level, args.x, args.y, args.width, args.height);
        let pixels = slide.read_region_cancellable(&region, &worker_token)?;
        Ok((region, pixels))
    });

    let joined = tokio::select! {
        joined = &mut worker => joined,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling read");
            token.cancel();
            worker.await
        }
    };
    let (region, pixels) = joined.map_err(|e| CliError::Worker(e.to_string()))??;

    write_png(pixels, &output)?;
    info!(
        level = region.level,
        width = region.width,
        height = region.height,
        output = %output.display(),
        "Wrote region"
    );
    Ok(())
}

fn run_associated(
    path: &Path,
    name: &str,
    output: &Path,
    options: OpenOptions,
) -> Result<(), CliError> {
    let slide = SlideHandle::open_with(path, options)?;
    let image = slide.read_associated_image(name)?;
    let (width, height) = (image.width(), image.height());
    write_png(image, output)?;
    info!(name, width, height, output = %output.display(), "Wrote associated image");
    Ok(())
}

fn write_png(pixels: TileBuffer, output: &Path) -> Result<(), CliError> {
    let output_error = |message: String| CliError::Output {
        path: output.display().to_string(),
        message,
    };
    let image = pixels
        .into_image()
        .ok_or_else(|| output_error("buffer does not match its dimensions".to_string()))?;
    image
        .save_with_format(output, ImageFormat::Png)
        .map_err(|e| output_error(e.to_string()))
}
