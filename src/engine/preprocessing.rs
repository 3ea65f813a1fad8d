//! Tensor preparation and mask post-processing for the ONNX engine
//!
//! Images are resized keeping their aspect ratio, centred on a square
//! canvas, normalized and laid out as NCHW. The model's single-channel mask
//! is mapped back through the same transform and applied as alpha.

use crate::error::{NoBgError, Result};
use image::{DynamicImage, ImageBuffer, Rgba, RgbImage, RgbaImage};
use ndarray::Array4;
use serde::Deserialize;

/// Model input geometry and normalization
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input edge in pixels
    pub target_size: u32,
    /// Per-channel mean in the 0-1 range
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation in the 0-1 range
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: 1024,
            normalization_mean: [128.0 / 255.0; 3],
            normalization_std: [256.0 / 255.0; 3],
        }
    }
}

#[derive(Deserialize)]
struct HfSize {
    height: u32,
    width: u32,
}

#[derive(Deserialize)]
struct HfPreprocessorConfig {
    size: HfSize,
    image_mean: [f32; 3],
    image_std: [f32; 3],
}

impl PreprocessingConfig {
    /// Parse a `HuggingFace` `preprocessor_config.json`
    ///
    /// Mean and std are stored there in the 0-255 range.
    ///
    /// # Errors
    /// - Invalid JSON or missing fields
    /// - Non-square input size
    pub fn from_huggingface_json(content: &str) -> Result<Self> {
        let raw: HfPreprocessorConfig = serde_json::from_str(content).map_err(|e| {
            NoBgError::model(format!("Failed to parse preprocessor_config.json: {e}"))
        })?;

        if raw.size.height != raw.size.width || raw.size.width == 0 {
            return Err(NoBgError::model(format!(
                "Expected a square model input, got {}x{}",
                raw.size.width, raw.size.height
            )));
        }

        Ok(Self {
            target_size: raw.size.width,
            normalization_mean: raw.image_mean.map(|v| v / 255.0),
            normalization_std: raw.image_std.map(|v| v / 255.0),
        })
    }
}

/// Placement of the resized image on the square canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    /// Fit `(width, height)` inside a `target_size` square
    #[must_use]
    pub fn fit(width: u32, height: u32, target_size: u32) -> Self {
        let target = target_size as f32;
        let scale = (target / width.max(1) as f32).min(target / height.max(1) as f32);

        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
        }
    }
}

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Turn an image into a normalized `1x3xSxS` tensor
    #[must_use]
    pub fn preprocess(image: &DynamicImage, config: &PreprocessingConfig) -> (Letterbox, Array4<f32>) {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let target = config.target_size;
        let letterbox = Letterbox::fit(width, height, target);

        let resized = image::imageops::resize(
            &rgb,
            letterbox.scaled_width,
            letterbox.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas: RgbImage = ImageBuffer::from_pixel(target, target, image::Rgb([255, 255, 255]));
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        (letterbox, Self::canvas_to_tensor(&canvas, config))
    }

    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let size = config.target_size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = (f32::from(pixel[channel]) / 255.0 - config.normalization_mean[channel])
                    / config.normalization_std[channel];
                if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *slot = value;
                }
            }
        }

        tensor
    }

    /// Map the model mask back onto the original image and apply it as alpha
    ///
    /// # Errors
    /// - Output tensor is not `1x1xHxW`
    pub fn apply_mask(
        image: &DynamicImage,
        mask: &Array4<f32>,
        letterbox: &Letterbox,
    ) -> Result<RgbaImage> {
        let shape = mask.shape();
        if shape.first() != Some(&1) || shape.get(1) != Some(&1) {
            return Err(NoBgError::inference(format!(
                "Invalid output tensor shape: {shape:?}"
            )));
        }
        let mask_height = shape.get(2).copied().unwrap_or(0);
        let mask_width = shape.get(3).copied().unwrap_or(0);

        let source = image.to_rgba8();
        let (width, height) = source.dimensions();
        let mut result = RgbaImage::new(width, height);

        for (x, y, pixel) in source.enumerate_pixels() {
            let mask_x = (x as f32 * letterbox.scale).round() as usize + letterbox.offset_x as usize;
            let mask_y = (y as f32 * letterbox.scale).round() as usize + letterbox.offset_y as usize;

            let value = if mask_x < mask_width && mask_y < mask_height {
                mask.get([0, 0, mask_y, mask_x]).copied().unwrap_or(0.0)
            } else {
                0.0
            };
            let alpha = (value.clamp(0.0, 1.0) * 255.0) as u8;

            let out = if alpha > 0 {
                Rgba([pixel[0], pixel[1], pixel[2], alpha.min(pixel[3])])
            } else {
                Rgba([0, 0, 0, 0])
            };
            result.put_pixel(x, y, out);
        }

        Ok(result)
    }
}
