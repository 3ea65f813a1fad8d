//! Result views: before/after comparison and download actions

use crate::{
    analytics::{AnalyticsEvent, EventSink},
    config::OutputFormat,
    error::Result,
    export::{format_processing_time, save_image},
    session::{ProcessedImage, ProcessingSession},
};
use image::{imageops::FilterType, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Side of one checkerboard tile in pixels
pub const CHECKER_SIZE: u32 = 20;
/// Width of the divider line in pixels
pub const DIVIDER_WIDTH: u32 = 2;

const CHECKER_DARK: Rgba<u8> = Rgba([0xe5, 0xe5, 0xe5, 0xff]);
const CHECKER_LIGHT: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
const DIVIDER_COLOR: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);

/// Before/after slider position in percent
///
/// The first interaction emits `comparison_slider_used`; later ones don't.
pub struct ComparisonSlider {
    position: f32,
    interacted: bool,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ComparisonSlider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparisonSlider")
            .field("position", &self.position)
            .field("interacted", &self.interacted)
            .finish_non_exhaustive()
    }
}

impl ComparisonSlider {
    /// Slider centred at 50%
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            position: 50.0,
            interacted: false,
            sink,
        }
    }

    #[must_use]
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Move the slider, clamped to 0–100
    pub fn set_position(&mut self, position: f32) {
        if !self.interacted {
            self.interacted = true;
            self.sink.capture(AnalyticsEvent::comparison_slider_used());
        }
        self.position = if position.is_nan() {
            self.position
        } else {
            position.clamp(0.0, 100.0)
        };
    }
}

/// View over one processed image
pub struct ResultsView {
    image: Arc<ProcessedImage>,
    slider: ComparisonSlider,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ResultsView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultsView")
            .field("filename", &self.image.filename)
            .field("slider", &self.slider)
            .finish_non_exhaustive()
    }
}

impl ResultsView {
    /// Show a result; emits `image_result_viewed`
    pub fn new(image: Arc<ProcessedImage>, sink: Arc<dyn EventSink>) -> Self {
        sink.capture(AnalyticsEvent::image_result_viewed(image.processing_time_ms));
        Self {
            slider: ComparisonSlider::new(sink.clone()),
            image,
            sink,
        }
    }

    #[must_use]
    pub fn image(&self) -> &ProcessedImage {
        &self.image
    }

    pub fn slider_mut(&mut self) -> &mut ComparisonSlider {
        &mut self.slider
    }

    #[must_use]
    pub fn processing_time_text(&self) -> String {
        format!(
            "Processed in {}",
            format_processing_time(self.image.processing_time_ms)
        )
    }

    /// Save the processed image in `format` into `dir`
    ///
    /// # Errors
    /// - Export or write failures
    pub async fn download<P: AsRef<Path>>(&self, format: OutputFormat, dir: P) -> Result<PathBuf> {
        self.sink
            .capture(AnalyticsEvent::image_downloaded(&format.to_string()));
        save_image(&self.image.processed, &self.image.filename, format, dir).await
    }

    /// Leave the view and clear the session
    pub fn process_new(self, session: &ProcessingSession) {
        self.sink.capture(AnalyticsEvent::process_new_image_clicked());
        session.clear_all();
    }

    /// Compose the comparison at the current slider position
    ///
    /// # Errors
    /// - Either image fails to decode
    pub fn render_comparison(&self) -> Result<RgbaImage> {
        render_comparison(&self.image, self.slider.position())
    }
}

/// Checkerboard colour at a pixel
fn checker(x: u32, y: u32) -> Rgba<u8> {
    let half = CHECKER_SIZE / 2;
    let right = x % CHECKER_SIZE >= half;
    let bottom = y % CHECKER_SIZE >= half;
    if right == bottom {
        CHECKER_LIGHT
    } else {
        CHECKER_DARK
    }
}

fn blend_over(top: Rgba<u8>, bottom: Rgba<u8>) -> Rgba<u8> {
    let alpha = u32::from(top[3]);
    let mix = |t: u8, b: u8| ((u32::from(t) * alpha + u32::from(b) * (255 - alpha) + 127) / 255) as u8;
    Rgba([
        mix(top[0], bottom[0]),
        mix(top[1], bottom[1]),
        mix(top[2], bottom[2]),
        255,
    ])
}

/// Compose original (left of the divider) and processed over a checkerboard
/// (right of it) at `position` percent of the width
///
/// The processed image is scaled to the original's size when they differ.
///
/// # Errors
/// - Either image fails to decode
pub fn render_comparison(image: &ProcessedImage, position: f32) -> Result<RgbaImage> {
    let original = image.original.decode_image()?.to_rgba8();
    let (width, height) = original.dimensions();

    let mut processed = image.processed.decode_image()?.to_rgba8();
    if processed.dimensions() != (width, height) {
        processed = image::imageops::resize(&processed, width, height, FilterType::Triangle);
    }

    let position = if position.is_nan() { 50.0 } else { position.clamp(0.0, 100.0) };
    let divider = (width as f32 * position / 100.0).round() as u32;
    let divider_start = divider.saturating_sub(DIVIDER_WIDTH / 2);
    let divider_end = (divider_start + DIVIDER_WIDTH).min(width);

    Ok(RgbaImage::from_fn(width, height, |x, y| {
        if x >= divider_start && x < divider_end {
            DIVIDER_COLOR
        } else if x < divider {
            *original.get_pixel(x, y)
        } else {
            blend_over(*processed.get_pixel(x, y), checker(x, y))
        }
    }))
}
