//! Deterministic engine for tests and demos
//!
//! Cuts out a centred ellipse instead of running a model. Failure modes,
//! output shape, load events and delays are configurable so every adapter
//! and session path can be exercised without model weights.

use super::{ByteProgress, EngineConfig, EngineInput, EngineOutput, SegmentationEngine};
use crate::{
    error::{NoBgError, Result},
    services::OutputFormatHandler,
};
use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// Which output shape the mock returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    /// Encoded bytes in the configured output format
    #[default]
    Blob,
    /// An RGBA surface
    Canvas,
    /// Raw RGBA pixels
    Pixels,
    /// Raw pixels with a buffer one byte short
    TruncatedPixels,
}

/// Mock segmentation engine
#[derive(Debug, Clone)]
pub struct MockEngine {
    behavior: MockBehavior,
    load_events: Vec<(String, u64, u64)>,
    preload_failures: Arc<AtomicUsize>,
    fail_encoded: bool,
    fail_decoded: bool,
    preload_delay: Duration,
    inference_delay: Duration,
    preload_calls: Arc<AtomicUsize>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockEngine {
    /// Mock that loads one model file in four steps and returns a blob
    #[must_use]
    pub fn new() -> Self {
        let total = 4_000_000;
        let load_events = (0..=4)
            .map(|step| ("onnx/model_fp16.onnx".to_string(), step * total / 4, total))
            .collect();

        Self {
            behavior: MockBehavior::default(),
            load_events,
            preload_failures: Arc::new(AtomicUsize::new(0)),
            fail_encoded: false,
            fail_decoded: false,
            preload_delay: Duration::ZERO,
            inference_delay: Duration::ZERO,
            preload_calls: Arc::new(AtomicUsize::new(0)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Replace the byte-progress events emitted during preload
    #[must_use]
    pub fn with_load_events<K: Into<String>>(mut self, events: Vec<(K, u64, u64)>) -> Self {
        self.load_events = events
            .into_iter()
            .map(|(key, current, total)| (key.into(), current, total))
            .collect();
        self
    }

    /// Fail the next `times` preload calls
    #[must_use]
    pub fn failing_preload(self, times: usize) -> Self {
        self.preload_failures.store(times, Ordering::SeqCst);
        self
    }

    /// Reject encoded input so callers fall back to a decoded image
    #[must_use]
    pub fn failing_encoded(mut self) -> Self {
        self.fail_encoded = true;
        self
    }

    /// Reject every input
    #[must_use]
    pub fn failing_inference(mut self) -> Self {
        self.fail_encoded = true;
        self.fail_decoded = true;
        self
    }

    #[must_use]
    pub fn with_preload_delay(mut self, delay: Duration) -> Self {
        self.preload_delay = delay;
        self
    }

    #[must_use]
    pub fn with_inference_delay(mut self, delay: Duration) -> Self {
        self.inference_delay = delay;
        self
    }

    /// Number of `preload` calls received
    #[must_use]
    pub fn preload_calls(&self) -> usize {
        self.preload_calls.load(Ordering::SeqCst)
    }

    /// Recorded calls, oldest first
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    fn record_call(&self, call: String) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(call);
        }
    }

    /// Keep a centred ellipse, clear everything else
    fn cut_out(image: &DynamicImage) -> RgbaImage {
        let mut rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let (rx, ry) = (cx.max(1.0), cy.max(1.0));

        for (x, y, pixel) in rgba.enumerate_pixels_mut() {
            let dx = (x as f32 + 0.5 - cx) / rx;
            let dy = (y as f32 + 0.5 - cy) / ry;
            if dx * dx + dy * dy > 1.0 {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        }

        rgba
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SegmentationEngine for MockEngine {
    async fn preload(&self, config: &EngineConfig, progress: Option<ByteProgress>) -> Result<()> {
        self.preload_calls.fetch_add(1, Ordering::SeqCst);
        self.record_call(format!("preload:{}", config.variant));

        if !self.preload_delay.is_zero() {
            tokio::time::sleep(self.preload_delay).await;
        }

        let failing = self
            .preload_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NoBgError::model("Mock model download failed"));
        }

        if let Some(callback) = progress {
            for (key, current, total) in &self.load_events {
                callback(key, *current, *total);
            }
        }

        Ok(())
    }

    async fn remove_background(
        &self,
        input: EngineInput,
        config: &EngineConfig,
    ) -> Result<EngineOutput> {
        self.record_call(format!("remove_background:{}", input.kind()));

        if !self.inference_delay.is_zero() {
            tokio::time::sleep(self.inference_delay).await;
        }

        let rejected = match input {
            EngineInput::Encoded(_) => self.fail_encoded,
            EngineInput::Decoded(_) => self.fail_decoded,
        };
        if rejected {
            return Err(NoBgError::inference(format!(
                "Mock engine rejected {} input",
                input.kind()
            )));
        }

        let cut_out = Self::cut_out(&input.to_image()?);
        let (width, height) = cut_out.dimensions();

        match self.behavior {
            MockBehavior::Blob => {
                let bytes = OutputFormatHandler::encode(
                    &DynamicImage::ImageRgba8(cut_out),
                    config.output_format,
                    config.output_quality,
                )?;
                Ok(EngineOutput::Blob {
                    mime: config.output_format.mime_type().to_string(),
                    bytes,
                })
            },
            MockBehavior::Canvas => Ok(EngineOutput::Canvas(cut_out)),
            MockBehavior::Pixels => Ok(EngineOutput::Pixels {
                width,
                height,
                data: cut_out.into_raw(),
            }),
            MockBehavior::TruncatedPixels => {
                let mut data = cut_out.into_raw();
                data.pop();
                Ok(EngineOutput::Pixels {
                    width,
                    height,
                    data,
                })
            },
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([200, 100, 50, 255])))
    }

    #[tokio::test]
    async fn test_preload_reports_events() {
        let engine = MockEngine::new().with_load_events(vec![("a", 1, 2), ("a", 2, 2)]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ByteProgress = Arc::new(move |key: &str, current: u64, total: u64| {
            sink.lock().unwrap().push((key.to_string(), current, total));
        });

        engine
            .preload(&EngineConfig::default(), Some(progress))
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(engine.preload_calls(), 1);
    }

    #[tokio::test]
    async fn test_preload_failures_are_counted_down() {
        let engine = MockEngine::new().failing_preload(1);
        let config = EngineConfig::default();
        assert!(engine.preload(&config, None).await.is_err());
        assert!(engine.preload(&config, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_cut_out_clears_corners() {
        let engine = MockEngine::new().with_behavior(MockBehavior::Canvas);
        let output = engine
            .remove_background(EngineInput::Decoded(solid_image()), &EngineConfig::default())
            .await
            .unwrap();

        match output {
            EngineOutput::Canvas(canvas) => {
                assert_eq!(canvas.get_pixel(0, 0)[3], 0);
                assert_eq!(canvas.get_pixel(5, 5)[3], 255);
            },
            other => panic!("Expected canvas, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_failing_encoded_accepts_decoded() {
        let engine = MockEngine::new().failing_encoded();
        let config = EngineConfig::default();
        let file = crate::services::ImageFile::new("x.png", "image/png", vec![1, 2, 3]);

        assert!(engine
            .remove_background(EngineInput::Encoded(file), &config)
            .await
            .is_err());
        assert!(engine
            .remove_background(EngineInput::Decoded(solid_image()), &config)
            .await
            .is_ok());
        assert_eq!(
            engine.call_history(),
            vec!["remove_background:encoded", "remove_background:decoded"]
        );
    }
}
