//! Slide Registry for managing slide lifecycle and caching.
//!
//! The registry provides:
//! - LRU caching of opened slides to avoid re-reading the directory
//! - Singleflight pattern to prevent duplicate opens for the same slide
//!
//! A slide is closed when it is evicted and the last in-flight request
//! holding it completes.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use lru::LruCache;
use tokio::sync::{Notify, RwLock};
use tracing::info;

use crate::error::{IoError, TileError};
use crate::io::RangeReader;

use super::reader::Slide;
use super::source::SlideSource;

/// Default capacity for slide cache (number of slides).
const DEFAULT_SLIDE_CACHE_CAPACITY: usize = 100;

type SlideResult<R> = Result<Arc<Slide<R>>, TileError>;

/// Registry for managing slide lifecycle and caching.
pub struct SlideRegistry<S: SlideSource> {
    /// The source for creating range readers
    source: S,

    /// Cached slides indexed by slide ID
    cache: RwLock<LruCache<String, Arc<Slide<S::Reader>>>>,

    /// In-flight opens for singleflight pattern
    in_flight: InFlightMap<S::Reader>,
}

/// State for an in-flight slide open operation.
struct InFlightState<R: RangeReader + 'static> {
    notify: Notify,
    result: OnceLock<SlideResult<R>>,
}

type InFlightMap<R> = Mutex<HashMap<String, Arc<InFlightState<R>>>>;

fn lock_in_flight<R: RangeReader + 'static>(
    map: &InFlightMap<R>,
) -> MutexGuard<'_, HashMap<String, Arc<InFlightState<R>>>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held by the task opening a slide; dropping it, even mid-open,
/// unregisters the open and wakes everyone waiting on it.
struct OpenGuard<'a, R: RangeReader + 'static> {
    in_flight: &'a InFlightMap<R>,
    slide_id: &'a str,
    state: Arc<InFlightState<R>>,
}

impl<R: RangeReader + 'static> Drop for OpenGuard<'_, R> {
    fn drop(&mut self) {
        {
            let mut in_flight = lock_in_flight(self.in_flight);
            if in_flight
                .get(self.slide_id)
                .is_some_and(|state| Arc::ptr_eq(state, &self.state))
            {
                in_flight.remove(self.slide_id);
            }
        }
        self.state.notify.notify_waiters();
    }
}

impl<S: SlideSource> SlideRegistry<S> {
    /// Create a new SlideRegistry caching up to 100 slides.
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, DEFAULT_SLIDE_CACHE_CAPACITY)
    }

    /// Create a new SlideRegistry caching up to `capacity` slides.
    pub fn with_capacity(source: S, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            cache: RwLock::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get a slide, opening it if not already cached.
    ///
    /// Concurrent requests for a slide that is not cached share a single
    /// open. Failed opens are not cached. If the opening request is dropped
    /// before it finishes, a waiting request performs the open instead.
    pub async fn get_slide(&self, slide_id: &str) -> SlideResult<S::Reader> {
        // Fast path: check cache
        {
            let mut cache = self.cache.write().await;
            if let Some(slide) = cache.get(slide_id) {
                return Ok(slide.clone());
            }
        }

        let state = loop {
            let (state, leader) = {
                let mut in_flight = lock_in_flight(&self.in_flight);
                match in_flight.get(slide_id) {
                    Some(state) => (Arc::clone(state), false),
                    None => {
                        let state = Arc::new(InFlightState {
                            notify: Notify::new(),
                            result: OnceLock::new(),
                        });
                        in_flight.insert(slide_id.to_string(), Arc::clone(&state));
                        (state, true)
                    }
                }
            };
            if leader {
                break state;
            }

            let notified = state.notify.notified();
            if let Some(result) = state.result.get() {
                return result.clone();
            }
            notified.await;
            if let Some(result) = state.result.get() {
                return result.clone();
            }
            // The opener was dropped before finishing; retry
        };

        let guard = OpenGuard {
            in_flight: &self.in_flight,
            slide_id,
            state,
        };

        // A previous open may have completed since the fast-path miss
        let cached = self.cache.write().await.get(slide_id).cloned();
        if let Some(slide) = cached {
            return Ok(slide);
        }

        let result = self.open_slide(slide_id).await;
        if let Ok(ref slide) = result {
            let mut cache = self.cache.write().await;
            cache.put(slide_id.to_string(), slide.clone());
        }
        let _ = guard.state.result.set(result.clone());
        drop(guard);

        result
    }

    async fn open_slide(&self, slide_id: &str) -> SlideResult<S::Reader> {
        let reader = self.source.create_reader(slide_id).await.map_err(|e| match e {
            IoError::NotFound(_) => TileError::SlideNotFound {
                slide_id: slide_id.to_string(),
            },
            other => TileError::Io(other),
        })?;

        let slide = Slide::open(reader).await?;
        let (width, height) = slide.dimensions();
        info!(
            slide_id,
            width,
            height,
            tiles = slide.index().tile_count(),
            overlap = slide.index().overlap(),
            "Opened slide"
        );
        Ok(Arc::new(slide))
    }

    /// Remove a slide from the cache.
    pub async fn invalidate(&self, slide_id: &str) {
        let mut cache = self.cache.write().await;
        cache.pop(slide_id);
    }

    /// Clear all cached slides.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    /// Get the number of cached slides.
    pub async fn cached_count(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
