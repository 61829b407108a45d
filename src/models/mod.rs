use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::utils::errors::ImageError;

/// Canonical identifier for one remote image.
///
/// Keys are derived from the canonical URL serialization (scheme, host,
/// path and query), so differently-written addresses that normalize to the
/// same resource share a cache entry and an in-flight download.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

impl ImageKey {
    /// Parse and normalize a raw URL string into a key.
    ///
    /// Only HTTP(S) addresses are fetchable; anything else is rejected as
    /// `ImageError::InvalidKey`.
    pub fn parse(raw: &str) -> Result<Self, ImageError> {
        let url =
            Url::parse(raw).map_err(|e| ImageError::InvalidKey(format!("{}: {}", raw, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ImageError::InvalidKey(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                raw
            )));
        }

        Ok(Self(url.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ImageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Downloaded image payload plus the basics a UI needs to place it.
///
/// The payload keeps the encoded bytes as received; decoding happened once
/// to validate them and read the dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

impl ImageData {
    /// Byte weight used for cache cost accounting.
    pub fn cost(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Outcome delivered to every waiter of a request, exactly once.
pub type ImageResult = Result<Arc<ImageData>, ImageError>;

/// Completion callback registered with [`crate::ImageService::request_image`].
pub type ImageCallback = Box<dyn FnOnce(ImageResult) + Send + 'static>;

/// Point-in-time counters for one image service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Requests answered synchronously from the memory cache.
    pub memory_hits: u64,
    /// Requests that joined an already-running download instead of
    /// starting their own.
    pub coalesced: u64,
    /// Downloads actually started.
    pub downloads: u64,
    /// Downloads that ended in a transport or decode failure.
    pub failures: u64,
    /// Entries currently cached.
    pub cached_images: usize,
    /// Total byte cost currently cached.
    pub cached_bytes: u64,
}

impl fmt::Display for LoaderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Memory hits: {}, Coalesced: {}, Downloads: {}, Failures: {}, Cached: {} images ({} bytes)",
            self.memory_hits,
            self.coalesced,
            self.downloads,
            self.failures,
            self.cached_images,
            self.cached_bytes
        )
    }
}
