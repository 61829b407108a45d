pub mod image_service;
pub mod inflight;

pub use image_service::ImageService;
pub use inflight::InflightRegistry;
