//! Shared helpers for integration tests

#![allow(dead_code)]

use artloader::{ImageService, LoaderConfig};

/// Encode a small in-memory PNG to serve from mock endpoints.
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([120, 80, 40, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("encode test png");
    out
}

/// Build a service with the given cache byte budget.
pub fn test_service(max_cost: u64) -> ImageService {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let mut config = LoaderConfig::default();
    config.cache.max_cost = max_cost;
    ImageService::new(config).expect("build test service")
}
