//! Region geometry and tile compositing.
//!
//! A region read clips the requested rectangle to the level, fetches every
//! tile the clipped rectangle touches in row-major order, and copies the
//! overlapping part of each tile into one contiguous RGBA buffer. Pixels of
//! the request that fall outside the level keep [`BACKGROUND_PIXEL`].
//!
//! [`BACKGROUND_PIXEL`]: super::BACKGROUND_PIXEL

use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use super::buffer::TileBuffer;
use super::cancel::CancellationToken;
use crate::error::SlideError;

// =============================================================================
// Region
// =============================================================================

/// A rectangle in the pixel space of one level.
///
/// `x` and `y` may be negative or past the level edge; the part outside the
/// level is filled with background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub level: usize,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(level: usize, x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            level,
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of a `width` x `height` level.
    pub fn full_level(level: usize, (width, height): (u32, u32)) -> Self {
        Self::new(level, 0, 0, width, height)
    }

    fn empty_error(&self) -> SlideError {
        SlideError::EmptyRegion {
            level: self.level,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

// =============================================================================
// Tile grid
// =============================================================================

/// Column and row of a tile inside a level's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub col: u32,
    pub row: u32,
}

impl TileCoord {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

/// Tiling of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileGrid {
    /// Level width in pixels
    pub width: u32,
    /// Level height in pixels
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub cols: u32,
    pub rows: u32,
}

impl TileGrid {
    /// Grid covering a `width` x `height` level with the given tile size.
    ///
    /// Tile dimensions must be non-zero.
    pub fn new(width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            width,
            height,
            tile_width,
            tile_height,
            cols: width.div_ceil(tile_width),
            rows: height.div_ceil(tile_height),
        }
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.col < self.cols && coord.row < self.rows
    }

    pub fn tile_count(&self) -> u64 {
        self.cols as u64 * self.rows as u64
    }

    /// Row-major index of a tile.
    pub fn index(&self, coord: TileCoord) -> Option<usize> {
        self.contains(coord)
            .then(|| coord.row as usize * self.cols as usize + coord.col as usize)
    }

    /// Pixel origin of a tile inside the level.
    pub fn origin(&self, coord: TileCoord) -> (u32, u32) {
        (coord.col * self.tile_width, coord.row * self.tile_height)
    }

    /// Size of a tile once clipped to the level edge.
    pub fn clipped_size(&self, coord: TileCoord) -> (u32, u32) {
        let (x, y) = self.origin(coord);
        (
            self.tile_width.min(self.width.saturating_sub(x)),
            self.tile_height.min(self.height.saturating_sub(y)),
        )
    }
}

// =============================================================================
// Compositing
// =============================================================================

/// Compose a region from the tiles of one level.
///
/// `fetch` returns a decoded tile already clipped to the level. It is called
/// once per covered tile in row-major order; `cancel` is checked before each
/// call.
pub(crate) fn compose_region<F>(
    region: &Region,
    grid: &TileGrid,
    cancel: Option<&CancellationToken>,
    mut fetch: F,
) -> Result<TileBuffer, SlideError>
where
    F: FnMut(TileCoord) -> Result<Arc<TileBuffer>, SlideError>,
{
    if region.width == 0 || region.height == 0 {
        return Err(region.empty_error());
    }

    // Clipped rectangle in level coordinates, half-open
    let x0 = region.x.max(0);
    let y0 = region.y.max(0);
    let x1 = region
        .x
        .saturating_add(region.width as i64)
        .min(grid.width as i64);
    let y1 = region
        .y
        .saturating_add(region.height as i64)
        .min(grid.height as i64);
    if x0 >= x1 || y0 >= y1 {
        return Err(region.empty_error());
    }

    let mut out = TileBuffer::background(region.width, region.height).ok_or(
        SlideError::RegionTooLarge {
            width: region.width,
            height: region.height,
        },
    )?;

    // All four bounds now lie inside the level, so they fit in u32
    let (x0, y0, x1, y1) = (x0 as u32, y0 as u32, x1 as u32, y1 as u32);
    let first_col = x0 / grid.tile_width;
    let last_col = (x1 - 1) / grid.tile_width;
    let first_row = y0 / grid.tile_height;
    let last_row = (y1 - 1) / grid.tile_height;

    trace!(
        level = region.level,
        cols = last_col - first_col + 1,
        rows = last_row - first_row + 1,
        "Compositing region"
    );

    for row in first_row..=last_row {
        for col in first_col..=last_col {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(SlideError::Cancelled);
            }

            let coord = TileCoord::new(col, row);
            let tile = fetch(coord)?;
            let (tile_x, tile_y) = grid.origin(coord);

            let ix0 = x0.max(tile_x);
            let iy0 = y0.max(tile_y);
            let ix1 = x1.min(tile_x + tile.width());
            let iy1 = y1.min(tile_y + tile.height());
            if ix0 >= ix1 || iy0 >= iy1 {
                continue;
            }

            out.copy_rect(
                &tile,
                (ix0 - tile_x, iy0 - tile_y),
                (
                    (ix0 as i64 - region.x) as u32,
                    (iy0 as i64 - region.y) as u32,
                ),
                (ix1 - ix0, iy1 - iy0),
            );
        }
    }

    Ok(out)
}
