// Asynchronous artwork download and caching for media UIs
// De-duplicates concurrent fetches per URL and keeps downloaded images
// under a byte-cost budget in memory.

mod cache;
mod config;
mod constants;
mod models;
mod services;
mod utils;
mod workers;

pub use cache::MemoryCache;
pub use config::{CacheConfig, LoaderConfig, NetworkConfig};
pub use models::{ImageCallback, ImageData, ImageKey, ImageResult, LoaderStats};
pub use services::{ImageService, InflightRegistry};
pub use utils::errors::ImageError;
pub use workers::Fetcher;
