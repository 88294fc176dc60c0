//! In-memory backend for handle tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::SlideError;
use crate::format::SlideFormat;
use crate::io::RangeReader;
use crate::tile::{TileBuffer, TileCoord, TileGrid};

use super::backend::{LevelInfo, ParsedSlide, SlideBackend};
use super::properties::{PropertyTable, PROPERTY_LEVEL_COUNT, PROPERTY_VENDOR};

/// Pixel stored at `(x, y)` of `level`.
pub fn coded_pixel(level: usize, x: u32, y: u32) -> [u8; 4] {
    [x as u8, y as u8, (x >> 8) as u8 ^ (y >> 8) as u8, 200 + level as u8]
}

/// Backend whose pixels are a function of their coordinates.
pub struct SyntheticBackend {
    grids: Vec<TileGrid>,
    decodes: Arc<AtomicUsize>,
}

impl SyntheticBackend {
    pub fn new(dims: &[(u32, u32)], tile_size: u32) -> Self {
        Self {
            grids: dims
                .iter()
                .map(|&(w, h)| TileGrid::new(w, h, tile_size, tile_size))
                .collect(),
            decodes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn decode_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.decodes)
    }

    pub fn into_parsed(self) -> ParsedSlide<Self> {
        let base = self.grids[0].width as f64;
        let levels = self
            .grids
            .iter()
            .enumerate()
            .map(|(index, grid)| LevelInfo {
                index,
                width: grid.width,
                height: grid.height,
                downsample: base / grid.width as f64,
            })
            .collect();
        let mut properties = PropertyTable::new();
        properties.insert(PROPERTY_VENDOR, "synthetic");
        properties.insert(PROPERTY_LEVEL_COUNT, self.grids.len().to_string());
        ParsedSlide {
            adapter: self,
            levels,
            properties,
            degenerate: Vec::new(),
        }
    }
}

impl SlideBackend for SyntheticBackend {
    fn parse(reader: Box<dyn RangeReader>) -> Result<ParsedSlide<Self>, SlideError> {
        Err(SlideError::UnsupportedFormat {
            path: reader.identifier().to_string(),
            reason: "synthetic backend has no container".to_string(),
        })
    }

    fn format(&self) -> SlideFormat {
        SlideFormat::GenericTiff
    }

    fn tile_grid(&self, level: usize) -> Option<TileGrid> {
        self.grids.get(level).copied()
    }

    fn decode_tile(&self, level: usize, coord: TileCoord) -> Result<TileBuffer, SlideError> {
        let grid = self.grids.get(level).ok_or(SlideError::IndexOutOfRange {
            level,
            count: self.grids.len(),
        })?;
        if !grid.contains(coord) {
            return Err(SlideError::TileOutOfRange {
                level,
                col: coord.col,
                row: coord.row,
                cols: grid.cols,
                rows: grid.rows,
            });
        }
        self.decodes.fetch_add(1, Ordering::SeqCst);

        let (width, height) = grid.clipped_size(coord);
        let (ox, oy) = grid.origin(coord);
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in oy..oy + height {
            for x in ox..ox + width {
                pixels.extend_from_slice(&coded_pixel(level, x, y));
            }
        }
        TileBuffer::from_rgba(width, height, pixels).ok_or(SlideError::RegionTooLarge { width, height })
    }

    fn associated_image_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn read_associated_image(&self, name: &str) -> Result<TileBuffer, SlideError> {
        Err(SlideError::AssociatedImageNotFound(name.to_string()))
    }

    fn close(&mut self) {}
}
