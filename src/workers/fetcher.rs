use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use image::{ImageFormat, ImageReader};
use reqwest::Client;
use tracing::trace;

use crate::config::NetworkConfig;
use crate::models::{ImageData, ImageKey};
use crate::utils::errors::ImageError;

/// Performs exactly one network retrieval and decode per call.
///
/// The fetcher knows nothing about the cache or the in-flight registry;
/// the service layer wires its outcome into both. Retry, if wanted, is the
/// caller's business.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    /// GET the image behind `key` and validate the bytes decode.
    ///
    /// Transport-layer errors and non-2xx statuses surface as
    /// [`ImageError::Transport`]; bytes that are not a readable image as
    /// [`ImageError::Decode`]. The returned cost is the encoded byte
    /// length.
    pub async fn fetch(&self, key: &ImageKey) -> Result<(Arc<ImageData>, u64), ImageError> {
        let response = self
            .client
            .get(key.as_str())
            .send()
            .await
            .map_err(|e| ImageError::Transport(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| ImageError::Transport(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::Transport(e.to_string()))?;

        // Decoding can chew CPU on large artwork, keep it off the I/O threads.
        let data = bytes.to_vec();
        let image = tokio::task::spawn_blocking(move || decode_image(data))
            .await
            .map_err(|e| ImageError::Decode(format!("Decode task failed: {}", e)))??;

        let cost = image.cost();
        trace!(
            "Downloaded {} ({} bytes, {}x{} {})",
            key,
            cost,
            image.width,
            image.height,
            image.format
        );

        Ok((Arc::new(image), cost))
    }
}

fn decode_image(data: Vec<u8>) -> Result<ImageData, ImageError> {
    let reader = ImageReader::new(Cursor::new(&data))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| ImageError::Decode("Unrecognized image format".to_string()))?;

    let decoded = reader
        .decode()
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    Ok(ImageData {
        width: decoded.width(),
        height: decoded.height(),
        format: format_name(format).to_string(),
        data,
    })
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Ico => "ico",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Avif => "avif",
        _ => "unknown",
    }
}
