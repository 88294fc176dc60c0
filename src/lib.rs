//! # wsi-reader
//!
//! A reader for multi-resolution whole-slide images (WSI).
//!
//! A slide is a pyramid of the same scan at decreasing resolutions, cut
//! into tiles. This crate opens a slide file, reports its levels and
//! properties, and decodes tiles and arbitrary regions to RGBA.
//!
//! ## Features
//!
//! - **Formats**: Aperio SVS and generic tiled TIFF, classic or BigTIFF, either byte order
//! - **Codecs**: uncompressed, LZW, Deflate and JPEG (including abbreviated streams with shared tables)
//! - **Regions**: clipped reads with transparent fill, cancellable between tiles
//! - **Caching**: per-handle LRU of decoded tiles with a byte budget
//! - **Thread safety**: a [`SlideHandle`] can be shared across threads
//!
//! ## Architecture
//!
//! - [`io`] - positional byte-range access to the slide file
//! - [`mod@format`] - format detection, TIFF parsing, codecs and backends
//! - [`slide`] - the slide handle, backend trait and property table
//! - [`tile`] - tile buffers, region compositing, cache and cancellation
//! - [`config`] - command-line configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_reader::{detect_vendor, Region, SlideHandle};
//!
//! println!("vendor: {:?}", detect_vendor("slide.svs"));
//!
//! let slide = SlideHandle::open("slide.svs")?;
//! for (index, (width, height)) in slide.all_level_dimensions()?.into_iter().enumerate() {
//!     println!("level {index}: {width}x{height}");
//! }
//! println!("{:?}", slide.level_downsamples()?);
//! println!("{}", slide.property("openslide.vendor")?);
//!
//! let pixels = slide.read_region(&Region::new(0, 1000, 1000, 256, 256))?;
//! assert_eq!(pixels.byte_len(), 256 * 256 * 4);
//! slide.close()?;
//! # Ok::<(), wsi_reader::SlideError>(())
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use error::{ChunkError, CodecError, IoError, SlideError, TiffError};
pub use format::{
    detect, detect_reader, detect_vendor, Detection, GenericTiffBackend, SlideFormat, SvsBackend,
    UnrecognizedReason,
};
pub use io::{FileRangeReader, MemoryRangeReader, RangeReader};
pub use slide::{
    open, LevelInfo, OpenOptions, ParsedSlide, PropertyTable, SlideBackend, SlideHandle,
};
pub use tile::{
    CancellationToken, Region, TileBuffer, TileCache, TileCacheKey, TileCoord, TileGrid,
    BACKGROUND_PIXEL, CHANNELS, DEFAULT_TILE_CACHE_BYTES,
};
