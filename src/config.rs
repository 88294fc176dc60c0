//! Command-line configuration for the `wsi-reader` tool.
//!
//! Options can also be set through environment variables with the `WSI_`
//! prefix:
//!
//! - `WSI_TILE_CACHE` - decoded tile cache budget such as `64MB`; `0`
//!   disables the cache (default: 32MB)
//!
//! # Example
//!
//! ```text
//! wsi-reader info slide.svs --json
//! wsi-reader region slide.svs --downsample 8 --x 0 --y 0 --width 1024 --height 1024 -o out.png
//! ```

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::slide::OpenOptions;

// =============================================================================
// Default Values
// =============================================================================

/// Default decoded tile cache budget.
pub const DEFAULT_TILE_CACHE: &str = "32MB";

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-reader - inspect and read multi-resolution whole-slide images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Byte budget of the decoded tile cache (e.g. 64MB, 512KB, 0).
    #[arg(long, global = true, default_value = DEFAULT_TILE_CACHE, env = "WSI_TILE_CACHE")]
    pub tile_cache: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the vendor of a slide, or why it is not recognized
    Detect {
        /// Slide file
        path: PathBuf,
    },

    /// Print format, levels and associated images
    Info {
        /// Slide file
        path: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print slide properties
    Properties {
        /// Slide file
        path: PathBuf,

        /// Print only this property
        #[arg(long)]
        name: Option<String>,
    },

    /// Read a region of one level into a PNG
    Region(RegionArgs),

    /// Write an associated image (thumbnail, label, macro) to a PNG
    Associated {
        /// Slide file
        path: PathBuf,

        /// Associated image name
        name: String,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Arguments of the `region` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RegionArgs {
    /// Slide file
    pub path: PathBuf,

    /// Level to read from
    #[arg(long, conflicts_with = "downsample", required_unless_present = "downsample")]
    pub level: Option<usize>,

    /// Pick the best level for this downsample factor
    #[arg(long)]
    pub downsample: Option<f64>,

    /// Left edge in level coordinates
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub x: i64,

    /// Top edge in level coordinates
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub y: i64,

    /// Region width in pixels
    #[arg(long)]
    pub width: u32,

    /// Region height in pixels
    #[arg(long)]
    pub height: u32,

    /// Output PNG path
    #[arg(short, long)]
    pub output: PathBuf,
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        parse_byte_size(&self.tile_cache)
            .map_err(|e| format!("Invalid tile cache size (--tile-cache / WSI_TILE_CACHE): {e}"))?;

        match &self.command {
            Command::Region(args) => {
                if args.width == 0 || args.height == 0 {
                    return Err("Region width and height must be greater than 0".to_string());
                }
                if let Some(downsample) = args.downsample {
                    if !downsample.is_finite() || downsample <= 0.0 {
                        return Err("downsample must be a positive number".to_string());
                    }
                }
                check_png_output(&args.output)
            }
            Command::Associated { output, .. } => check_png_output(output),
            _ => Ok(()),
        }
    }

    /// Library options derived from the command line.
    pub fn open_options(&self) -> Result<OpenOptions, String> {
        Ok(OpenOptions::new().tile_cache_bytes(parse_byte_size(&self.tile_cache)?))
    }
}

fn check_png_output(path: &Path) -> Result<(), String> {
    let is_png = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if is_png {
        Ok(())
    } else {
        Err(format!("Output {} must be a .png file", path.display()))
    }
}

/// Parse a byte size such as `64MB`, `512KB`, `1GB` or `4096`.
///
/// Units are binary (1KB = 1024 bytes) and case-insensitive.
pub fn parse_byte_size(value: &str) -> Result<usize, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    if digits.is_empty() {
        return Err(format!("'{value}' does not start with a number"));
    }

    let number: usize = digits
        .parse()
        .map_err(|_| format!("'{digits}' is not a valid number"))?;
    let multiplier: usize = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        other => return Err(format!("unknown unit '{other}'")),
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("'{value}' is too large"))
}

// =============================================================================
// Tests
// =============================================================================
