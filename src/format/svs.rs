//! Aperio SVS backend.
//!
//! # SVS File Structure
//!
//! SVS files are TIFF files containing:
//! - **Pyramid levels**: IFD 0 is full resolution and must be tiled; every
//!   later tiled IFD is a smaller level
//! - **Thumbnail**: the stripped IFD directly after level 0
//! - **Label** and **Macro**: stripped IFDs whose ImageDescription names them
//!
//! # JPEGTables Handling
//!
//! Level tiles are usually abbreviated JPEG streams. The quantization and
//! Huffman tables live once in the `JPEGTables` tag and are merged into each
//! tile before decoding.
//!
//! # Metadata
//!
//! The ImageDescription of IFD 0 looks like
//!
//! ```text
//! Aperio Image Library v12.0.15
//! 46920x33600 (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499
//! ```
//!
//! Every `key = value` segment after the first `|` becomes an
//! `aperio.<key>` property.

use tracing::{debug, warn};

use crate::error::SlideError;
use crate::io::RangeReader;
use crate::slide::properties::{PROPERTY_MPP_X, PROPERTY_MPP_Y, PROPERTY_OBJECTIVE_POWER};
use crate::slide::{ParsedSlide, PropertyTable, SlideBackend};
use crate::tile::{TileBuffer, TileCoord, TileGrid};

use super::container::{TiffContainer, TiffSlide};
use super::tiff::{TiffImage, TiffTag};
use super::SlideFormat;

// =============================================================================
// SVS Metadata
// =============================================================================

/// Metadata parsed from an Aperio ImageDescription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvsMetadata {
    /// Microns per pixel
    pub mpp: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub magnification: Option<f64>,

    /// `key = value` pairs in file order, first occurrence of each key
    pub fields: Vec<(String, String)>,
}

impl SvsMetadata {
    /// Parse the pipe-separated fields of an ImageDescription.
    ///
    /// The first segment (library banner and geometry summary) is skipped.
    /// Segments without `=` or with an empty key are ignored, and values
    /// that do not parse as numbers leave `mpp` and `magnification` unset.
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata::default();

        for segment in description.split('|').skip(1) {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || metadata.fields.iter().any(|(k, _)| k == key) {
                continue;
            }

            match key {
                "MPP" => metadata.mpp = value.parse().ok(),
                "AppMag" => metadata.magnification = value.parse().ok(),
                _ => {}
            }
            metadata.fields.push((key.to_string(), value.to_string()));
        }

        metadata
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Add `aperio.*` and the derived resolution properties.
    fn apply(&self, properties: &mut PropertyTable) {
        for (key, value) in &self.fields {
            properties.insert_if_absent(format!("aperio.{key}"), value.as_str());
        }
        if let (Some(mpp), Some(raw)) = (self.mpp, self.get("MPP")) {
            if mpp > 0.0 {
                properties.insert(PROPERTY_MPP_X, raw);
                properties.insert(PROPERTY_MPP_Y, raw);
            }
        }
        if let (Some(_), Some(raw)) = (self.magnification, self.get("AppMag")) {
            properties.insert(PROPERTY_OBJECTIVE_POWER, raw);
        }
    }
}

/// Associated image named by a stripped directory's description.
fn associated_name(description: &str) -> Option<&'static str> {
    let lower = description.to_ascii_lowercase();
    if lower.contains("label") {
        Some("label")
    } else if lower.contains("macro") {
        Some("macro")
    } else {
        None
    }
}

// =============================================================================
// SVS Backend
// =============================================================================

/// Backend for Aperio SVS files.
pub struct SvsBackend {
    slide: TiffSlide,
}

impl SlideBackend for SvsBackend {
    fn parse(reader: Box<dyn RangeReader>) -> Result<ParsedSlide<Self>, SlideError> {
        let container = TiffContainer::open(reader)?;

        if !container.ifds()[0].is_tiled() {
            return Err(SlideError::CorruptContainer {
                path: container.path().to_string(),
                substructure: "IFD 0".to_string(),
                message: "level 0 of an SVS file must be tiled".to_string(),
            });
        }

        let mut levels = Vec::new();
        let mut associated: Vec<(String, TiffImage)> = Vec::new();
        for (index, ifd) in container.ifds().iter().enumerate() {
            if ifd.is_tiled() {
                levels.push(container.load_image(index)?);
                continue;
            }
            if !ifd.is_stripped() {
                debug!(ifd = index, "Skipping directory without image data");
                continue;
            }

            let description = container
                .ascii_tag(index, TiffTag::ImageDescription)?
                .unwrap_or_default();
            let name = if index == 1 {
                Some("thumbnail")
            } else {
                associated_name(&description)
            };
            let Some(name) = name else {
                debug!(ifd = index, "Skipping unnamed stripped directory");
                continue;
            };
            if associated.iter().any(|(existing, _)| existing == name) {
                warn!(ifd = index, name, "Duplicate associated image, keeping the first");
                continue;
            }
            associated.push((name.to_string(), container.load_image(index)?));
        }

        let pyramid = container.build_pyramid(levels)?;

        let mut properties = PropertyTable::new();
        container.tiff_properties(&mut properties)?;
        let metadata = properties
            .get("tiff.ImageDescription")
            .map(SvsMetadata::parse)
            .unwrap_or_default();
        metadata.apply(&mut properties);

        debug!(
            path = container.path(),
            levels = pyramid.level_count(),
            associated = associated.len(),
            "Parsed Aperio SVS"
        );
        let parsed = container.finish(SlideFormat::AperioSvs, pyramid, associated, properties)?;
        Ok(ParsedSlide {
            adapter: SvsBackend {
                slide: parsed.adapter,
            },
            levels: parsed.levels,
            properties: parsed.properties,
            degenerate: parsed.degenerate,
        })
    }

    fn format(&self) -> SlideFormat {
        self.slide.format()
    }

    fn tile_grid(&self, level: usize) -> Option<TileGrid> {
        self.slide.tile_grid(level)
    }

    fn decode_tile(&self, level: usize, coord: TileCoord) -> Result<TileBuffer, SlideError> {
        self.slide.decode_tile(level, coord)
    }

    fn associated_image_names(&self) -> Vec<String> {
        self.slide.associated_image_names()
    }

    fn read_associated_image(&self, name: &str) -> Result<TileBuffer, SlideError> {
        self.slide.read_associated_image(name)
    }

    fn close(&mut self) {
        self.slide.close();
    }
}
