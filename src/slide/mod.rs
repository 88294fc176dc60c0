//! Slide abstraction layer.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              SlideHandle                │
//! │  (levels, properties, tile cache, state)│
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideBackend trait            │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │   SvsBackend    │    │ GenericTiffBackend  │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use wsi_reader::{Region, SlideHandle};
//!
//! let slide = SlideHandle::open("slide.svs")?;
//! let level = slide.best_level_for_downsample(8.0)?;
//! let pixels = slide.read_region(&Region::new(level, 0, 0, 512, 512))?;
//! println!("{} bytes", pixels.byte_len());
//! # Ok::<(), wsi_reader::SlideError>(())
//! ```

mod backend;
mod handle;
pub mod properties;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{LevelInfo, ParsedSlide, SlideBackend};
pub use handle::{open, OpenOptions, SlideHandle};
pub use properties::PropertyTable;
