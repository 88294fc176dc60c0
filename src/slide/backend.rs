//! The capability seam between the slide handle and vendor formats.
//!
//! Each supported container implements [`SlideBackend`]. The handle picks
//! one backend at open time from the detected [`SlideFormat`] and only talks
//! to it through this trait afterwards.

use serde::Serialize;

use crate::error::SlideError;
use crate::format::SlideFormat;
use crate::io::RangeReader;
use crate::tile::{TileBuffer, TileCoord, TileGrid};

use super::properties::PropertyTable;

/// Geometry of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    /// Position in the pyramid, 0 is full resolution
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Scale factor relative to level 0
    pub downsample: f64,
}

impl LevelInfo {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Everything a backend learns from parsing a container.
pub struct ParsedSlide<B> {
    pub adapter: B,
    pub levels: Vec<LevelInfo>,
    pub properties: PropertyTable,
    /// Levels that do not shrink relative to the previous level
    pub degenerate: Vec<usize>,
}

impl<B: SlideBackend + 'static> ParsedSlide<B> {
    /// Erase the concrete backend type.
    pub fn boxed(self) -> ParsedSlide<Box<dyn SlideBackend>> {
        ParsedSlide {
            adapter: Box::new(self.adapter),
            levels: self.levels,
            properties: self.properties,
            degenerate: self.degenerate,
        }
    }
}

/// Uniform interface over vendor slide formats.
///
/// Tile decodes are pure functions of the open state and their arguments,
/// and may run concurrently from many threads.
pub trait SlideBackend: Send + Sync {
    /// Parse and validate a container.
    ///
    /// Structural problems are reported as
    /// [`SlideError::CorruptContainer`] naming the substructure; well-formed
    /// files the reader cannot serve fail with [`SlideError::Parse`].
    fn parse(reader: Box<dyn RangeReader>) -> Result<ParsedSlide<Self>, SlideError>
    where
        Self: Sized;

    fn format(&self) -> SlideFormat;

    /// Tile layout of a level, `None` when the level does not exist.
    fn tile_grid(&self, level: usize) -> Option<TileGrid>;

    /// Decode one tile, clipped to the level bounds.
    fn decode_tile(&self, level: usize, coord: TileCoord) -> Result<TileBuffer, SlideError>;

    /// Names of non-pyramid images stored in the container.
    fn associated_image_names(&self) -> Vec<String>;

    fn read_associated_image(&self, name: &str) -> Result<TileBuffer, SlideError>;

    /// Release the underlying file. Calling it again has no effect.
    fn close(&mut self);
}
