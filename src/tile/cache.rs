//! Cache of encoded output tiles.
//!
//! Entries are keyed by `(slide_id, layer, row, col)` in output tile space,
//! which is unrelated to the container's own tile keys. The cache is bounded
//! both by total encoded size in bytes and by entry count; the least
//! recently used entries are evicted first.
//!
//! [`TileCache::get_or_try_insert_with`] collapses concurrent misses for the
//! same key into a single computation.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{Notify, RwLock};

/// Default cache capacity: 100MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Default maximum number of entries
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for encoded output tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub slide_id: Arc<str>,

    /// Pyramid layer (0 = full resolution)
    pub layer: u32,

    /// Output tile row (0-indexed from top)
    pub row: u32,

    /// Output tile column (0-indexed from left)
    pub col: u32,
}

impl TileCacheKey {
    pub fn new(slide_id: impl Into<Arc<str>>, layer: u32, row: u32, col: u32) -> Self {
        Self {
            slide_id: slide_id.into(),
            layer,
            row,
            col,
        }
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// State of a computation other callers may be waiting on.
struct InFlight<E> {
    notify: Notify,
    result: OnceLock<Result<Bytes, E>>,
}

type InFlightMap<E> = Mutex<HashMap<TileCacheKey, Arc<InFlight<E>>>>;

fn lock_in_flight<E>(
    map: &InFlightMap<E>,
) -> MutexGuard<'_, HashMap<TileCacheKey, Arc<InFlight<E>>>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held by the caller computing a key.
///
/// Dropping it unregisters the computation and wakes every follower, also
/// when the leader's future is dropped before finishing. Followers that
/// find no result then retry and one of them takes over.
struct Leader<'a, E> {
    in_flight: &'a InFlightMap<E>,
    key: TileCacheKey,
    state: Arc<InFlight<E>>,
}

impl<E> Drop for Leader<'_, E> {
    fn drop(&mut self) {
        {
            let mut in_flight = lock_in_flight(self.in_flight);
            if in_flight
                .get(&self.key)
                .is_some_and(|state| Arc::ptr_eq(state, &self.state))
            {
                in_flight.remove(&self.key);
            }
        }
        self.state.notify.notify_waiters();
    }
}

/// LRU cache for encoded tiles with size-based capacity.
///
/// Thread-safe; share it across tasks via `Arc`.
pub struct TileCache<E = crate::error::TileError> {
    cache: RwLock<LruCache<TileCacheKey, Bytes>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: RwLock<usize>,

    in_flight: InFlightMap<E>,
}

impl<E: Clone> TileCache<E> {
    /// Create a new tile cache with default capacity (100MB, 10 000 entries).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a new tile cache with specified capacity and maximum entries.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(max_entries)),
            max_size,
            current_size: RwLock::new(0),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get a tile from the cache, marking it as recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Check if a tile is in the cache without updating LRU order.
    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        let cache = self.cache.read().await;
        cache.contains(key)
    }

    /// Store a tile in the cache.
    ///
    /// Least-recently-used entries are evicted until the cache is back
    /// within its byte capacity. An entry larger than the whole capacity is
    /// not retained.
    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        let data_size = data.len();
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        // `push` hands back either the replaced value or the entry evicted
        // by the entry cap
        if let Some((_, evicted)) = cache.push(key, data) {
            *current_size = current_size.saturating_sub(evicted.len());
        }
        *current_size += data_size;

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current_size = current_size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
    }

    /// Return the cached tile for `key`, or compute and cache it.
    ///
    /// Concurrent callers missing on the same key share one computation;
    /// followers receive the leader's result. The boolean is `true` when the
    /// tile came from the cache. Errors are handed to every waiter but are
    /// never cached. If the computing caller is dropped mid-flight, a waiting
    /// caller runs its own computation instead.
    pub async fn get_or_try_insert_with<F, Fut>(
        &self,
        key: TileCacheKey,
        compute: F,
    ) -> Result<(Bytes, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        if let Some(data) = self.get(&key).await {
            return Ok((data, true));
        }

        let state = loop {
            let (state, leader) = {
                let mut in_flight = lock_in_flight(&self.in_flight);
                match in_flight.get(&key) {
                    Some(state) => (Arc::clone(state), false),
                    None => {
                        let state = Arc::new(InFlight {
                            notify: Notify::new(),
                            result: OnceLock::new(),
                        });
                        in_flight.insert(key.clone(), Arc::clone(&state));
                        (state, true)
                    }
                }
            };
            if leader {
                break state;
            }

            let notified = state.notify.notified();
            if let Some(result) = state.result.get() {
                return result.clone().map(|data| (data, false));
            }
            notified.await;
            if let Some(result) = state.result.get() {
                return result.clone().map(|data| (data, false));
            }
            // The leader went away without a result
        };

        let leader = Leader {
            in_flight: &self.in_flight,
            key: key.clone(),
            state,
        };

        // Another leader may have finished since the fast-path miss
        if let Some(data) = self.get(&key).await {
            return Ok((data, true));
        }

        let result = compute().await;
        if let Ok(ref data) = result {
            self.put(key, data.clone()).await;
        }
        let _ = leader.state.result.set(result.clone());
        drop(leader);

        result.map(|data| (data, false))
    }

    /// Remove a tile from the cache.
    pub async fn remove(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let data = cache.pop(key)?;
        *current_size = current_size.saturating_sub(data.len());
        Some(data)
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    /// Get the current number of cached tiles.
    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }

    pub async fn is_empty(&self) -> bool {
        let cache = self.cache.read().await;
        cache.is_empty()
    }

    /// Get the current total size of cached tiles in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// Get the maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl<E: Clone> Default for TileCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
