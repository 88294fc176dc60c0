//! LRU cache for decoded tiles.
//!
//! Tiles are keyed by `(level, col, row)` within one slide handle. The
//! cache tracks the total decoded size and evicts least-recently-used
//! tiles when the byte budget is exceeded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::trace;

use super::buffer::TileBuffer;
use super::region::TileCoord;

/// Default cache budget: 32MB
pub const DEFAULT_TILE_CACHE_BYTES: usize = 32 * 1024 * 1024;

/// Cache key for decoded tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub level: usize,
    pub col: u32,
    pub row: u32,
}

impl TileCacheKey {
    pub fn new(level: usize, coord: TileCoord) -> Self {
        Self {
            level,
            col: coord.col,
            row: coord.row,
        }
    }
}

struct CacheState {
    entries: LruCache<TileCacheKey, Arc<TileBuffer>>,
    current_size: usize,
}

/// Byte-bounded LRU of decoded tiles.
///
/// A budget of 0 disables caching: `get` always misses and `put` is a no-op.
pub struct TileCache {
    state: Mutex<CacheState>,
    max_size: usize,
}

impl TileCache {
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                current_size: 0,
            }),
            max_size,
        }
    }

    // The state is only mutated under the lock and is consistent after
    // every statement, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a tile, marking it as recently used.
    pub fn get(&self, key: &TileCacheKey) -> Option<Arc<TileBuffer>> {
        if self.max_size == 0 {
            return None;
        }
        let hit = self.lock().entries.get(key).cloned();
        if hit.is_some() {
            trace!(level = key.level, col = key.col, row = key.row, "Tile cache hit");
        }
        hit
    }

    /// Store a tile, evicting older tiles until the budget holds.
    ///
    /// Tiles larger than the whole budget are not stored.
    pub fn put(&self, key: TileCacheKey, tile: Arc<TileBuffer>) {
        let size = tile.byte_len();
        if size > self.max_size {
            return;
        }

        let mut state = self.lock();
        if let Some(old) = state.entries.put(key, tile) {
            state.current_size = state.current_size.saturating_sub(old.byte_len());
        }
        state.current_size += size;

        while state.current_size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.current_size = state.current_size.saturating_sub(evicted.byte_len());
                }
                None => break,
            }
        }
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.current_size = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total decoded bytes currently held.
    pub fn size(&self) -> usize {
        self.lock().current_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_BYTES)
    }
}
