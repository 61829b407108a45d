use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use futures::future::join_all;
use once_cell::sync::Lazy;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use crate::cache::MemoryCache;
use crate::config::LoaderConfig;
use crate::models::{ImageCallback, ImageKey, ImageResult, LoaderStats};
use crate::services::inflight::InflightRegistry;
use crate::utils::errors::ImageError;
use crate::workers::Fetcher;

#[derive(Default)]
struct StatsCounters {
    memory_hits: AtomicU64,
    coalesced: AtomicU64,
    downloads: AtomicU64,
    failures: AtomicU64,
}

/// Image loading front door: answers from the memory cache when it can,
/// otherwise joins or starts a shared download for the key.
///
/// Cheap to clone; clones share the cache, registry and counters. All
/// de-duplication happens across everyone holding a clone, so one instance
/// per process is the intended shape - either injected by the application
/// or obtained via [`ImageService::shared`].
///
/// `request_image` must be called from within a tokio runtime, since
/// downloads are spawned onto it.
#[derive(Clone)]
pub struct ImageService {
    fetcher: Fetcher,
    cache: Arc<MemoryCache>,
    inflight: Arc<InflightRegistry>,
    stats: Arc<StatsCounters>,
}

impl ImageService {
    pub fn new(config: LoaderConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(&config.network)?,
            cache: Arc::new(MemoryCache::new(config.cache.max_cost)),
            inflight: Arc::new(InflightRegistry::new()),
            stats: Arc::new(StatsCounters::default()),
        })
    }

    /// Process-wide instance with default configuration, created on first
    /// use. Callers that want their own cache budget or timeouts construct
    /// and pass around their own service instead.
    pub fn shared() -> &'static ImageService {
        static SHARED: Lazy<ImageService> = Lazy::new(|| {
            ImageService::new(LoaderConfig::default())
                .expect("failed to initialize shared image service")
        });
        &SHARED
    }

    /// Request the image at `url`, delivering the outcome to `callback`
    /// exactly once - unless the whole download is cancelled first, in
    /// which case the callback is dropped uninvoked.
    ///
    /// Cache hits and invalid URLs complete synchronously on the caller;
    /// everything else completes later on a runtime task.
    pub fn request_image<F>(&self, url: &str, callback: F)
    where
        F: FnOnce(ImageResult) + Send + 'static,
    {
        let key = match ImageKey::parse(url) {
            Ok(key) => key,
            Err(err) => {
                debug!("Rejecting image request: {}", err);
                callback(Err(err));
                return;
            }
        };
        self.request(key, Box::new(callback));
    }

    /// Keyed variant of [`request_image`](Self::request_image) for callers
    /// that already hold a parsed key.
    pub fn request(&self, key: ImageKey, callback: ImageCallback) {
        if let Some(image) = self.cache.get(&key) {
            self.stats.memory_hits.fetch_add(1, Ordering::Relaxed);
            trace!("Memory cache hit for {}", key);
            callback(Ok(image));
            return;
        }

        if !self.inflight.begin_or_join(&key, callback) {
            self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.stats.downloads.fetch_add(1, Ordering::Relaxed);
        debug!("Starting download for {}", key);

        let service = self.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = match service.fetcher.fetch(&task_key).await {
                Ok((image, cost)) => {
                    service.cache.put(task_key.clone(), image.clone(), cost);
                    Ok(image)
                }
                Err(err) => {
                    service.stats.failures.fetch_add(1, Ordering::Relaxed);
                    error!("Failed to download image {}: {}", task_key, err);
                    Err(err)
                }
            };
            service.inflight.complete(&task_key, result);
        });

        self.inflight.attach_handle(&key, handle.abort_handle());
    }

    /// Async form of [`request_image`](Self::request_image). Resolves
    /// `Err(Cancelled)` when the shared download is cancelled underneath
    /// this waiter.
    pub async fn load_image(&self, url: &str) -> ImageResult {
        let (tx, rx) = oneshot::channel();
        self.request_image(url, move |result| {
            let _ = tx.send(result);
        });

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ImageError::Cancelled),
        }
    }

    /// Cancel the download for `url`, if one is running. Every current
    /// waiter receives nothing; callers that still want the image must
    /// request it again.
    pub fn cancel(&self, url: &str) {
        if let Ok(key) = ImageKey::parse(url) {
            self.inflight.cancel(&key);
        }
    }

    /// Drop the cached entry for `url` so the next request fetches fresh.
    pub fn invalidate(&self, url: &str) {
        if let Ok(key) = ImageKey::parse(url) {
            self.cache.remove(&key);
        }
    }

    /// Whether `url` is currently served from cache.
    pub fn contains(&self, url: &str) -> bool {
        match ImageKey::parse(url) {
            Ok(key) => self.cache.contains(&key),
            Err(_) => false,
        }
    }

    /// Whether a download for `url` is currently running.
    pub fn is_pending(&self, url: &str) -> bool {
        match ImageKey::parse(url) {
            Ok(key) => self.inflight.is_pending(&key),
            Err(_) => false,
        }
    }

    pub fn pending_downloads(&self) -> usize {
        self.inflight.pending_count()
    }

    /// Load several images, sharing downloads with any other caller as
    /// usual. Returns one result per URL, in order.
    pub async fn prefetch(&self, urls: &[String]) -> Vec<ImageResult> {
        let futures = urls.iter().map(|url| self.load_image(url));
        join_all(futures).await
    }

    /// Fire-and-forget variant of [`prefetch`](Self::prefetch).
    pub async fn warm_cache(&self, urls: &[String]) {
        let _ = self.prefetch(urls).await;
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Adjust the cache byte budget at runtime; shrinking evicts
    /// immediately.
    pub fn set_cache_cost_limit(&self, bytes: u64) {
        debug!("Setting image cache budget to {} bytes", bytes);
        self.cache.set_cost_limit(bytes);
    }

    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            memory_hits: self.stats.memory_hits.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
            downloads: self.stats.downloads.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            cached_images: self.cache.len(),
            cached_bytes: self.cache.total_cost(),
        }
    }
}
