use lru::LruCache;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

use crate::models::{ImageData, ImageKey};

struct CacheEntry {
    image: Arc<ImageData>,
    cost: u64,
}

struct CacheInner {
    entries: LruCache<ImageKey, CacheEntry>,
    total_cost: u64,
    cost_limit: u64,
}

/// Byte-cost bounded lookup table from image keys to downloaded images.
///
/// Entries are replaced whole, never mutated in place. Once the running
/// cost total exceeds the budget, least-recently-used entries are dropped
/// until it fits again. All operations are synchronous and never block on
/// anything but the short internal lock.
pub struct MemoryCache {
    inner: Mutex<CacheInner>,
}

impl MemoryCache {
    pub fn new(cost_limit: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                total_cost: 0,
                cost_limit,
            }),
        }
    }

    /// Look up a cached image, marking it most recently used.
    pub fn get(&self, key: &ImageKey) -> Option<Arc<ImageData>> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.get(key).map(|entry| entry.image.clone())
    }

    /// Insert or replace the entry for `key`, then evict least-recently-used
    /// entries while the running total exceeds the budget.
    ///
    /// An image whose own cost exceeds the entire budget is not retained.
    pub fn put(&self, key: ImageKey, image: Arc<ImageData>, cost: u64) {
        let mut inner = self.inner.lock().unwrap();

        if cost > inner.cost_limit {
            debug!(
                "Image {} ({} bytes) exceeds the whole cache budget ({} bytes), not retained",
                key, cost, inner.cost_limit
            );
            return;
        }

        if let Some(old) = inner.entries.pop(&key) {
            inner.total_cost -= old.cost;
        }

        trace!("Caching image {} ({} bytes)", key, cost);
        inner.entries.put(key, CacheEntry { image, cost });
        inner.total_cost += cost;

        Self::evict_over_budget(&mut inner);
    }

    /// Explicit invalidation; the next request for `key` fetches fresh.
    pub fn remove(&self, key: &ImageKey) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.pop(key) {
            Some(entry) => {
                inner.total_cost -= entry.cost;
                debug!("Invalidated cached image {}", key);
                true
            }
            None => false,
        }
    }

    /// Non-promoting presence check.
    pub fn contains(&self, key: &ImageKey) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.entries.contains(key)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.total_cost = 0;
        debug!("Cleared image memory cache");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_cost(&self) -> u64 {
        self.inner.lock().unwrap().total_cost
    }

    /// Shrink or grow the byte budget; shrinking evicts immediately.
    pub fn set_cost_limit(&self, cost_limit: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.cost_limit = cost_limit;
        Self::evict_over_budget(&mut inner);
    }

    fn evict_over_budget(inner: &mut CacheInner) {
        while inner.total_cost > inner.cost_limit {
            match inner.entries.pop_lru() {
                Some((key, entry)) => {
                    inner.total_cost -= entry.cost;
                    debug!("Evicted image {} ({} bytes) over cache budget", key, entry.cost);
                }
                None => break,
            }
        }
    }
}
