use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

use super::directory::Directory;
use super::reader::ArchiveHead;
use crate::error::ArchiveError;

/// Where parsed archive structures live between requests.
///
/// - `Disabled`: every request re-reads the header and any leaf directories
///   it walks through. Nothing is shared between requests.
/// - `Memory`: an LRU of archive heads (header + root directory) and leaf
///   directories, keyed by archive identifier and byte window. Concurrent
///   cold lookups of the same key share one origin read.
///
/// Tile bytes are never cached here.
#[derive(Clone, Default)]
pub enum DirectoryCache {
    #[default]
    Disabled,
    Memory(Arc<MemoryDirectoryCache>),
}

impl DirectoryCache {
    /// Build a cache holding up to `capacity` entries; 0 disables caching.
    pub fn with_capacity(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(capacity) => {
                DirectoryCache::Memory(Arc::new(MemoryDirectoryCache::new(capacity)))
            }
            None => DirectoryCache::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, DirectoryCache::Memory(_))
    }

    /// Get the head of `archive`, running `fetch` on a miss.
    pub async fn head<F, Fut>(
        &self,
        archive: &str,
        fetch: F,
    ) -> Result<Arc<ArchiveHead>, ArchiveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ArchiveHead, ArchiveError>>,
    {
        match self {
            DirectoryCache::Disabled => fetch().await.map(Arc::new),
            DirectoryCache::Memory(cache) => {
                let key = CacheKey::Head(archive.to_string());
                let value = cache
                    .get_or_fetch(key, move || async move {
                        fetch().await.map(|h| Cached::Head(Arc::new(h)))
                    })
                    .await?;
                match value {
                    Cached::Head(head) => Ok(head),
                    Cached::Leaf(_) => Err(ArchiveError::corrupt("cache entry kind mismatch")),
                }
            }
        }
    }

    /// Get the leaf directory at `offset..offset + length` of `archive`,
    /// running `fetch` on a miss.
    pub async fn leaf<F, Fut>(
        &self,
        archive: &str,
        offset: u64,
        length: u64,
        fetch: F,
    ) -> Result<Arc<Directory>, ArchiveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Directory, ArchiveError>>,
    {
        match self {
            DirectoryCache::Disabled => fetch().await.map(Arc::new),
            DirectoryCache::Memory(cache) => {
                let key = CacheKey::Leaf {
                    archive: archive.to_string(),
                    offset,
                    length,
                };
                let value = cache
                    .get_or_fetch(key, move || async move {
                        fetch().await.map(|d| Cached::Leaf(Arc::new(d)))
                    })
                    .await?;
                match value {
                    Cached::Leaf(dir) => Ok(dir),
                    Cached::Head(_) => Err(ArchiveError::corrupt("cache entry kind mismatch")),
                }
            }
        }
    }

    /// Drop every cached structure belonging to `archive`.
    pub async fn invalidate(&self, archive: &str) {
        if let DirectoryCache::Memory(cache) = self {
            cache.invalidate(archive).await;
        }
    }

    /// Number of cached entries (always 0 when disabled).
    pub async fn len(&self) -> usize {
        match self {
            DirectoryCache::Disabled => 0,
            DirectoryCache::Memory(cache) => cache.cache.read().await.len(),
        }
    }
}

// =============================================================================
// Memory Cache
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Head(String),
    Leaf {
        archive: String,
        offset: u64,
        length: u64,
    },
}

impl CacheKey {
    fn archive(&self) -> &str {
        match self {
            CacheKey::Head(archive) => archive,
            CacheKey::Leaf { archive, .. } => archive,
        }
    }
}

#[derive(Clone)]
enum Cached {
    Head(Arc<ArchiveHead>),
    Leaf(Arc<Directory>),
}

/// LRU of parsed archive structures with singleflight fetches.
pub struct MemoryDirectoryCache {
    cache: RwLock<LruCache<CacheKey, Cached>>,
    /// In-flight fetches for singleflight pattern
    in_flight: Mutex<HashMap<CacheKey, Arc<OnceCell<Cached>>>>,
}

impl MemoryDirectoryCache {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get an entry from cache or fetch it.
    ///
    /// Concurrent callers for the same key share one fetch. If that fetch
    /// fails or its caller is dropped mid-read, the next waiter runs its own.
    async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> Result<Cached, ArchiveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Cached, ArchiveError>>,
    {
        if let Some(value) = self.cached(&key).await {
            return Ok(value);
        }

        let cell = self.in_flight_cell(&key);
        let slot = &key;
        let result = cell
            .get_or_try_init(|| async move {
                // The previous holder may have finished between our cache
                // check and joining the cell
                if let Some(value) = self.cached(slot).await {
                    return Ok(value);
                }
                let value = fetch().await?;
                debug!(archive = slot.archive(), "Cached archive structure");
                self.cache.write().await.put(slot.clone(), value.clone());
                Ok(value)
            })
            .await
            .cloned();

        self.finish(&key, &cell);
        result
    }

    async fn cached(&self, key: &CacheKey) -> Option<Cached> {
        self.cache.write().await.get(key).cloned()
    }

    /// The shared slot for `key`, created if no fetch is running.
    fn in_flight_cell(&self, key: &CacheKey) -> Arc<OnceCell<Cached>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Release the slot for `key` if it is still `cell`.
    fn finish(&self, key: &CacheKey, cell: &Arc<OnceCell<Cached>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(key).is_some_and(|current| Arc::ptr_eq(current, cell)) {
            in_flight.remove(key);
        }
    }

    async fn invalidate(&self, archive: &str) {
        let mut cache = self.cache.write().await;
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|(key, _)| key.archive() == archive)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            cache.pop(key);
        }
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| key.archive() != archive);
        debug!(archive, dropped = stale.len(), "Invalidated cached archive structures");
    }
}
