//! The open slide resource.
//!
//! A [`SlideHandle`] owns one backend plus the level metadata and property
//! table captured at open. Metadata queries are pure lookups; tile and
//! region reads go through the backend and the per-handle tile cache.
//!
//! # State
//!
//! ```text
//! open(path) ──ok──► Open ──close()/drop──► Closed
//!      │
//!      └──err──► (no handle)
//! ```
//!
//! The state sits behind a reader-writer lock. Reads hold the shared side
//! for their whole duration; `close` takes the exclusive side, so it waits
//! for in-flight reads and no read ever sees a half-closed backend.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tracing::{debug, warn};

use crate::error::SlideError;
use crate::format::{
    detect::detect_reader, Detection, GenericTiffBackend, SlideFormat, SvsBackend,
    UnrecognizedReason,
};
use crate::io::{FileRangeReader, RangeReader};
use crate::tile::{
    compose_region, CancellationToken, Region, TileBuffer, TileCache, TileCacheKey, TileCoord,
    TileGrid, DEFAULT_TILE_CACHE_BYTES,
};

use super::backend::{LevelInfo, ParsedSlide, SlideBackend};
use super::properties::PropertyTable;

/// Options for [`SlideHandle::open_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Byte budget of the decoded tile cache; 0 disables caching
    pub tile_cache_bytes: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            tile_cache_bytes: DEFAULT_TILE_CACHE_BYTES,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tile_cache_bytes(mut self, bytes: usize) -> Self {
        self.tile_cache_bytes = bytes;
        self
    }
}

enum HandleState {
    Open(Box<dyn SlideBackend>),
    Closed,
}

/// An open whole-slide image.
///
/// `Send + Sync`: share it behind an `Arc` to read tiles from many threads.
pub struct SlideHandle {
    path: PathBuf,
    format: SlideFormat,
    levels: Vec<LevelInfo>,
    properties: PropertyTable,
    degenerate: Vec<usize>,
    cache: TileCache,
    state: RwLock<HandleState>,
}

impl std::fmt::Debug for SlideHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlideHandle")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("levels", &self.levels.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SlideHandle {
    /// Open a slide with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        Self::open_with(path, OpenOptions::default())
    }

    /// Detect the format of `path` and parse it with the matching backend.
    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self, SlideError> {
        let path = path.as_ref();
        let reader = FileRangeReader::open(path)?;
        let identifier = reader.identifier().to_string();

        let format = match detect_reader(&reader) {
            Detection::Recognized(format) => format,
            Detection::Unrecognized(UnrecognizedReason::Io(err)) => return Err(SlideError::Io(err)),
            Detection::Unrecognized(UnrecognizedReason::UnreadableDirectory(err)) => {
                return Err(SlideError::from_tiff(&identifier, "IFD 0", err))
            }
            Detection::Unrecognized(reason) => {
                return Err(SlideError::UnsupportedFormat {
                    path: identifier,
                    reason: reason.to_string(),
                })
            }
        };

        let reader: Box<dyn RangeReader> = Box::new(reader);
        let parsed = match format {
            SlideFormat::AperioSvs => SvsBackend::parse(reader)?.boxed(),
            SlideFormat::GenericTiff => GenericTiffBackend::parse(reader)?.boxed(),
        };
        Ok(Self::from_parsed(path, parsed, options))
    }

    /// Wrap an already parsed backend.
    pub(crate) fn from_parsed(
        path: impl Into<PathBuf>,
        parsed: ParsedSlide<Box<dyn SlideBackend>>,
        options: OpenOptions,
    ) -> Self {
        let path = path.into();
        let format = parsed.adapter.format();
        for &level in &parsed.degenerate {
            warn!(
                path = %path.display(),
                level,
                "Slide has a degenerate level"
            );
        }
        debug!(
            path = %path.display(),
            format = format.name(),
            levels = parsed.levels.len(),
            properties = parsed.properties.len(),
            cache_bytes = options.tile_cache_bytes,
            "Opened slide"
        );

        Self {
            path,
            format,
            levels: parsed.levels,
            properties: parsed.properties,
            degenerate: parsed.degenerate,
            cache: TileCache::with_capacity(options.tile_cache_bytes),
            state: RwLock::new(HandleState::Open(parsed.adapter)),
        }
    }

    // Backend calls never leave the state half-updated, so a poisoned lock
    // is still usable.
    fn read_state(&self) -> RwLockReadGuard<'_, HandleState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), SlideError> {
        match *self.read_state() {
            HandleState::Open(_) => Ok(()),
            HandleState::Closed => Err(SlideError::ClosedHandle),
        }
    }

    fn level(&self, index: usize) -> Result<&LevelInfo, SlideError> {
        self.ensure_open()?;
        self.levels.get(index).ok_or(SlideError::IndexOutOfRange {
            level: index,
            count: self.levels.len(),
        })
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    pub fn format(&self) -> Result<SlideFormat, SlideError> {
        self.ensure_open()?;
        Ok(self.format)
    }

    /// Vendor name, as in `openslide.vendor`.
    pub fn vendor(&self) -> Result<&'static str, SlideError> {
        self.format().map(|format| format.vendor())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.read_state(), HandleState::Closed)
    }

    // -------------------------------------------------------------------------
    // Levels
    // -------------------------------------------------------------------------

    pub fn level_count(&self) -> Result<usize, SlideError> {
        self.ensure_open()?;
        Ok(self.levels.len())
    }

    pub fn level_dimensions(&self, level: usize) -> Result<(u32, u32), SlideError> {
        self.level(level).map(LevelInfo::dimensions)
    }

    pub fn level_downsample(&self, level: usize) -> Result<f64, SlideError> {
        self.level(level).map(|info| info.downsample)
    }

    /// Dimensions of every level, full resolution first.
    pub fn all_level_dimensions(&self) -> Result<Vec<(u32, u32)>, SlideError> {
        self.ensure_open()?;
        Ok(self.levels.iter().map(LevelInfo::dimensions).collect())
    }

    pub fn level_downsamples(&self) -> Result<Vec<f64>, SlideError> {
        self.ensure_open()?;
        Ok(self.levels.iter().map(|info| info.downsample).collect())
    }

    pub fn levels(&self) -> Result<&[LevelInfo], SlideError> {
        self.ensure_open()?;
        Ok(&self.levels)
    }

    /// Levels that are no smaller than the level before them.
    pub fn degenerate_levels(&self) -> Result<&[usize], SlideError> {
        self.ensure_open()?;
        Ok(&self.degenerate)
    }

    /// Tile layout of a level.
    pub fn tile_grid(&self, level: usize) -> Result<TileGrid, SlideError> {
        let state = self.read_state();
        let backend = backend(&state)?;
        backend.tile_grid(level).ok_or(SlideError::IndexOutOfRange {
            level,
            count: self.levels.len(),
        })
    }

    /// The level with the greatest downsample not above `downsample`.
    ///
    /// Ties go to the smallest index. Targets below every level (and NaN)
    /// give level 0.
    pub fn best_level_for_downsample(&self, downsample: f64) -> Result<usize, SlideError> {
        self.ensure_open()?;
        Ok(best_level(&self.levels, downsample))
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// Property keys in sorted order.
    pub fn property_names(&self) -> Result<Vec<&str>, SlideError> {
        self.ensure_open()?;
        Ok(self.properties.names().collect())
    }

    pub fn property(&self, name: &str) -> Result<&str, SlideError> {
        self.ensure_open()?;
        self.properties
            .get(name)
            .ok_or_else(|| SlideError::PropertyNotFound(name.to_string()))
    }

    /// Alias of [`SlideHandle::property`].
    pub fn get_property_value(&self, name: &str) -> Result<&str, SlideError> {
        self.property(name)
    }

    pub fn properties(&self) -> Result<&PropertyTable, SlideError> {
        self.ensure_open()?;
        Ok(&self.properties)
    }

    // -------------------------------------------------------------------------
    // Pixels
    // -------------------------------------------------------------------------

    /// Decode one tile of a level, clipped to the level edge.
    pub fn decode_tile(&self, level: usize, coord: TileCoord) -> Result<TileBuffer, SlideError> {
        let state = self.read_state();
        let backend = backend(&state)?;
        if level >= self.levels.len() {
            return Err(SlideError::IndexOutOfRange {
                level,
                count: self.levels.len(),
            });
        }
        let tile = self.cached_tile(backend, level, coord)?;
        Ok(Arc::try_unwrap(tile).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Read a rectangle of one level into an RGBA buffer.
    ///
    /// The part of the request outside the level is transparent black.
    pub fn read_region(&self, region: &Region) -> Result<TileBuffer, SlideError> {
        self.read_region_inner(region, None)
    }

    /// Like [`SlideHandle::read_region`], checking `cancel` before every
    /// tile decode.
    pub fn read_region_cancellable(
        &self,
        region: &Region,
        cancel: &CancellationToken,
    ) -> Result<TileBuffer, SlideError> {
        self.read_region_inner(region, Some(cancel))
    }

    fn read_region_inner(
        &self,
        region: &Region,
        cancel: Option<&CancellationToken>,
    ) -> Result<TileBuffer, SlideError> {
        let state = self.read_state();
        let backend = backend(&state)?;
        let grid = backend
            .tile_grid(region.level)
            .ok_or(SlideError::IndexOutOfRange {
                level: region.level,
                count: self.levels.len(),
            })?;

        debug!(
            level = region.level,
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "Reading region"
        );
        compose_region(region, &grid, cancel, |coord| {
            self.cached_tile(backend, region.level, coord)
        })
    }

    fn cached_tile(
        &self,
        backend: &dyn SlideBackend,
        level: usize,
        coord: TileCoord,
    ) -> Result<Arc<TileBuffer>, SlideError> {
        let key = TileCacheKey::new(level, coord);
        if let Some(tile) = self.cache.get(&key) {
            return Ok(tile);
        }
        let tile = Arc::new(backend.decode_tile(level, coord)?);
        self.cache.put(key, Arc::clone(&tile));
        Ok(tile)
    }

    /// Names of the associated images (`thumbnail`, `label`, `macro`).
    pub fn associated_image_names(&self) -> Result<Vec<String>, SlideError> {
        let state = self.read_state();
        Ok(backend(&state)?.associated_image_names())
    }

    pub fn read_associated_image(&self, name: &str) -> Result<TileBuffer, SlideError> {
        let state = self.read_state();
        backend(&state)?.read_associated_image(name)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Release the file and cached tiles.
    ///
    /// Waits for in-flight reads. Closing twice returns
    /// [`SlideError::ClosedHandle`].
    pub fn close(&self) -> Result<(), SlideError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, HandleState::Closed) {
            HandleState::Open(mut backend) => {
                backend.close();
                self.cache.clear();
                debug!(path = %self.path.display(), "Closed slide");
                Ok(())
            }
            HandleState::Closed => Err(SlideError::ClosedHandle),
        }
    }
}

impl Drop for SlideHandle {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let HandleState::Open(backend) = state {
            backend.close();
        }
        *state = HandleState::Closed;
    }
}

fn backend<'a>(state: &'a RwLockReadGuard<'_, HandleState>) -> Result<&'a dyn SlideBackend, SlideError> {
    match &**state {
        HandleState::Open(backend) => Ok(backend.as_ref()),
        HandleState::Closed => Err(SlideError::ClosedHandle),
    }
}

fn best_level(levels: &[LevelInfo], downsample: f64) -> usize {
    let mut best = 0;
    for level in levels {
        if level.downsample <= downsample && level.downsample > levels[best].downsample {
            best = level.index;
        }
    }
    best
}

/// Open a slide with default options.
pub fn open(path: impl AsRef<Path>) -> Result<SlideHandle, SlideError> {
    SlideHandle::open(path)
}
