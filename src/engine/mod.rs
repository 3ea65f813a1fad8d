//! Segmentation engine boundary
//!
//! The engine is the part that actually knows how to find the foreground:
//! it fetches model weights and turns an image into a cut-out. Everything
//! above it (adapter, session, views) only talks to the `SegmentationEngine`
//! trait.

mod mock;
#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub mod preprocessing;

pub use mock::{MockBehavior, MockEngine};
#[cfg(feature = "onnx")]
pub use onnx::OnnxEngine;

use crate::{
    config::{OutputFormat, RemovalConfig},
    error::Result,
    services::ImageFile,
};
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use std::sync::Arc;

/// Byte-level load progress: `(key, current, total)`.
///
/// `key` names the resource being fetched (one per model file), so several
/// keys may report interleaved.
pub type ByteProgress = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Settings handed to the engine on every call
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Model repository URL
    pub model: String,
    /// Model variant (fp16, fp32)
    pub variant: String,
    /// Verbose engine diagnostics
    pub debug: bool,
    /// Encoding of `EngineOutput::Blob` results
    pub output_format: OutputFormat,
    /// Encoder quality for lossy formats (0-100)
    pub output_quality: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&RemovalConfig::default())
    }
}

impl From<&RemovalConfig> for EngineConfig {
    fn from(config: &RemovalConfig) -> Self {
        Self {
            model: config.model_url.clone(),
            variant: config.model_variant.clone(),
            debug: config.debug,
            output_format: config.output_format,
            output_quality: config.output_quality,
        }
    }
}

/// Image handed to the engine
#[derive(Debug, Clone)]
pub enum EngineInput {
    /// The file as the user supplied it
    Encoded(ImageFile),
    /// An already decoded image
    Decoded(DynamicImage),
}

impl EngineInput {
    /// Short name used in logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EngineInput::Encoded(_) => "encoded",
            EngineInput::Decoded(_) => "decoded",
        }
    }

    /// Decode the input into an image
    ///
    /// # Errors
    /// - Encoded content is not a decodable image
    pub fn to_image(&self) -> Result<DynamicImage> {
        match self {
            EngineInput::Encoded(file) => file.decode(),
            EngineInput::Decoded(image) => Ok(image.clone()),
        }
    }
}

/// Shapes an engine may return its result in
#[derive(Debug, Clone)]
pub enum EngineOutput {
    /// Encoded image bytes with their MIME type
    Blob { mime: String, bytes: Vec<u8> },
    /// A drawn RGBA surface
    Canvas(RgbaImage),
    /// Raw RGBA pixels, row-major, 4 bytes per pixel
    Pixels {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
}

impl EngineOutput {
    /// Short name used in logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EngineOutput::Blob { .. } => "blob",
            EngineOutput::Canvas(_) => "canvas",
            EngineOutput::Pixels { .. } => "pixels",
        }
    }
}

/// Background segmentation engine
#[async_trait]
pub trait SegmentationEngine: Send + Sync {
    /// Fetch and initialize model weights
    ///
    /// May be called more than once; implementations treat repeated calls
    /// as cheap once the weights are loaded.
    ///
    /// # Errors
    /// - Weights cannot be fetched or the model cannot be initialized
    async fn preload(&self, config: &EngineConfig, progress: Option<ByteProgress>) -> Result<()>;

    /// Remove the background from an image
    ///
    /// # Errors
    /// - Input cannot be decoded by the engine
    /// - Inference failures
    async fn remove_background(
        &self,
        input: EngineInput,
        config: &EngineConfig,
    ) -> Result<EngineOutput>;

    /// Engine name used in logs
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_from_removal_config() {
        let removal = RemovalConfig::builder()
            .model_variant("fp32")
            .output_format(OutputFormat::Png)
            .build()
            .unwrap();
        let config = EngineConfig::from(&removal);
        assert_eq!(config.variant, "fp32");
        assert_eq!(config.output_format, OutputFormat::Png);
        assert_eq!(config.model, removal.model_url);
    }

    #[test]
    fn test_decoded_input_to_image() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(3, 2));
        let input = EngineInput::Decoded(image);
        assert_eq!(input.kind(), "decoded");
        assert_eq!(input.to_image().unwrap().width(), 3);
    }
}
