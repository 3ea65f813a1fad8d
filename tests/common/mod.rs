//! Shared helpers for integration tests

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, RgbaImage};
use nobg::{
    BackgroundRemover, ImageFile, MockEngine, ProcessingSession, RemovalConfig, SessionConfig,
};
use std::sync::{Arc, Mutex};

/// Gradient test image encoded in `format`
pub fn create_test_image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut image = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let intensity = ((x + y) % 100) as u8;
        *pixel = image::Rgba([intensity, 128, 255 - intensity, 255]);
    }
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).to_rgb8()),
        _ => DynamicImage::ImageRgba8(image),
    };

    let mut buffer = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

pub fn png_file(name: &str) -> ImageFile {
    ImageFile::new(name, "image/png", create_test_image_bytes(32, 24, ImageFormat::Png))
}

pub fn jpeg_file(name: &str) -> ImageFile {
    ImageFile::new(name, "image/jpeg", create_test_image_bytes(32, 24, ImageFormat::Jpeg))
}

pub fn text_file(name: &str) -> ImageFile {
    ImageFile::new(name, "text/plain", b"hello".to_vec())
}

pub fn remover(engine: Arc<MockEngine>) -> Arc<BackgroundRemover> {
    Arc::new(BackgroundRemover::new(engine, RemovalConfig::default()))
}

pub fn session(engine: Arc<MockEngine>) -> ProcessingSession {
    ProcessingSession::new(remover(engine), SessionConfig::default())
}

/// Collects `(progress, label)` pairs reported through a callback
#[derive(Clone, Default)]
pub struct ProgressLog {
    entries: Arc<Mutex<Vec<(u8, String)>>>,
}

impl ProgressLog {
    pub fn callback(&self) -> impl Fn(u8, &str) + Send + Sync + 'static {
        let entries = self.entries.clone();
        move |progress: u8, label: &str| entries.lock().unwrap().push((progress, label.to_string()))
    }

    pub fn entries(&self) -> Vec<(u8, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn values(&self) -> Vec<u8> {
        self.entries().into_iter().map(|(value, _)| value).collect()
    }
}
