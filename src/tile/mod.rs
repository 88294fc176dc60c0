//! Decoded tiles, region compositing and the tile cache.
//!
//! ```text
//! read_region ──► compose_region ──► TileCache ──► backend decode_tile
//!                      │                 (hit)
//!                      ▼
//!                 TileBuffer (RGBA8)
//! ```
//!
//! - [`TileBuffer`]: owned RGBA pixels for a tile, region or associated image
//! - [`Region`]: a request rectangle in one level's pixel space
//! - [`TileGrid`] / [`TileCoord`]: how a level is cut into tiles
//! - [`TileCache`]: per-handle LRU of decoded tiles with a byte budget
//! - [`CancellationToken`]: cooperative cancellation for long reads

mod buffer;
mod cache;
mod cancel;
mod region;

pub use buffer::{TileBuffer, BACKGROUND_PIXEL, CHANNELS};
pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_BYTES};
pub use cancel::CancellationToken;
pub use region::{Region, TileCoord, TileGrid};

pub(crate) use region::compose_region;
