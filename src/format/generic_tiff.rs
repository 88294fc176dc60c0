//! Generic tiled TIFF backend.
//!
//! Every tiled directory is a pyramid level; stripped directories are
//! ignored and there are no associated images. Levels are ordered by size,
//! so files that store the pyramid smallest-first still open with level 0
//! at full resolution.
//!
//! Resolution comes from `XResolution`/`YResolution` when `ResolutionUnit`
//! is inch or centimeter.

use tracing::debug;

use crate::error::SlideError;
use crate::io::RangeReader;
use crate::slide::properties::{PROPERTY_MPP_X, PROPERTY_MPP_Y};
use crate::slide::{ParsedSlide, PropertyTable, SlideBackend};
use crate::tile::{TileBuffer, TileCoord, TileGrid};

use super::container::{TiffContainer, TiffSlide};
use super::SlideFormat;

/// Microns per resolution unit: 2 = inch, 3 = centimeter.
fn microns_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "inch" => Some(25_400.0),
        "centimeter" => Some(10_000.0),
        _ => None,
    }
}

/// Derive `openslide.mpp-*` from the `tiff.*` resolution properties.
fn resolution_properties(properties: &mut PropertyTable) {
    let Some(scale) = properties.get("tiff.ResolutionUnit").and_then(microns_per_unit) else {
        return;
    };
    for (source, target) in [
        ("tiff.XResolution", PROPERTY_MPP_X),
        ("tiff.YResolution", PROPERTY_MPP_Y),
    ] {
        let resolution = properties.get(source).and_then(|v| v.parse::<f64>().ok());
        if let Some(resolution) = resolution.filter(|r| *r > 0.0 && r.is_finite()) {
            properties.insert(target, (scale / resolution).to_string());
        }
    }
}

/// Backend for generic tiled TIFF files.
pub struct GenericTiffBackend {
    slide: TiffSlide,
}

impl SlideBackend for GenericTiffBackend {
    fn parse(reader: Box<dyn RangeReader>) -> Result<ParsedSlide<Self>, SlideError> {
        let container = TiffContainer::open(reader)?;

        let mut levels = Vec::new();
        for (index, ifd) in container.ifds().iter().enumerate() {
            if ifd.is_tiled() {
                levels.push(container.load_image(index)?);
            } else {
                debug!(ifd = index, "Skipping untiled directory");
            }
        }
        if levels.is_empty() {
            return Err(SlideError::CorruptContainer {
                path: container.path().to_string(),
                substructure: "IFD chain".to_string(),
                message: "no tiled directories".to_string(),
            });
        }

        let pyramid = container.build_pyramid(levels)?;

        let mut properties = PropertyTable::new();
        container.tiff_properties(&mut properties)?;
        resolution_properties(&mut properties);

        debug!(
            path = container.path(),
            levels = pyramid.level_count(),
            "Parsed generic tiled TIFF"
        );
        let parsed = container.finish(SlideFormat::GenericTiff, pyramid, Vec::new(), properties)?;
        Ok(ParsedSlide {
            adapter: GenericTiffBackend {
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
