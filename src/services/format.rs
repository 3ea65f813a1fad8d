//! Output format handling service
//!
//! Converts and encodes images for the three export formats. Kept apart from
//! the adapter and exporter so both share one encoder path.

use crate::{
    config::OutputFormat,
    error::{NoBgError, Result},
};
use image::{DynamicImage, ImageBuffer, RgbaImage};
use std::io::Cursor;

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Convert an RGBA image to the pixel layout of the target format
    ///
    /// JPEG has no alpha channel; the channel is dropped.
    #[must_use]
    pub fn convert_format(rgba_image: RgbaImage, format: OutputFormat) -> DynamicImage {
        match format {
            OutputFormat::Png | OutputFormat::WebP => DynamicImage::ImageRgba8(rgba_image),
            OutputFormat::Jpeg => {
                let (width, height) = rgba_image.dimensions();
                let mut rgb_image = ImageBuffer::new(width, height);

                for (x, y, pixel) in rgba_image.enumerate_pixels() {
                    rgb_image.put_pixel(x, y, image::Rgb([pixel[0], pixel[1], pixel[2]]));
                }

                DynamicImage::ImageRgb8(rgb_image)
            },
        }
    }

    /// Encode an image into the bytes of the given format
    ///
    /// `quality` applies to JPEG only. WebP is encoded losslessly and PNG is
    /// always lossless.
    ///
    /// # Errors
    /// - Encoder failures from the `image` crate
    pub fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        let converted = Self::convert_format(image.to_rgba8(), format);
        let mut cursor = Cursor::new(Vec::new());

        match format {
            OutputFormat::Png | OutputFormat::WebP => {
                converted
                    .write_to(&mut cursor, format.image_format())
                    .map_err(|e| Self::encode_error(format, &e))?;
            },
            OutputFormat::Jpeg => {
                let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut cursor,
                    quality.clamp(1, 100),
                );
                encoder
                    .encode_image(&converted.to_rgb8())
                    .map_err(|e| Self::encode_error(format, &e))?;
            },
        }

        Ok(cursor.into_inner())
    }

    fn encode_error(format: OutputFormat, error: &image::ImageError) -> NoBgError {
        NoBgError::processing_stage_error(
            "encode",
            &format!("Failed to encode as {}: {}", format, error),
            None,
        )
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png | OutputFormat::WebP => true,
            OutputFormat::Jpeg => false,
        }
    }

    /// Warn when a format will flatten the removed background
    pub fn validate_for_background_removal(format: OutputFormat) {
        if !Self::supports_transparency(format) {
            log::warn!(
                "Output format {} does not support transparency. The removed background will appear as a solid color.",
                format
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};

    #[test]
    fn test_convert_format_jpeg_drops_alpha() {
        let rgba_image = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128]));
        let converted = OutputFormatHandler::convert_format(rgba_image, OutputFormat::Jpeg);

        match converted {
            DynamicImage::ImageRgb8(_) => {},
            _ => panic!("Expected RGB8 image for JPEG format"),
        }
    }

    #[test]
    fn test_encoded_formats_are_detectable() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 200])));

        for format in OutputFormat::ALL {
            let bytes = OutputFormatHandler::encode(&image, format, 100).unwrap();
            assert_eq!(image::guess_format(&bytes).unwrap(), format.image_format());
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!(decoded.dimensions(), (4, 3));
        }
    }

    #[test]
    fn test_webp_keeps_alpha() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 0])));
        let bytes = OutputFormatHandler::encode(&image, OutputFormat::WebP, 100).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_supports_transparency() {
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::Png));
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::WebP));
        assert!(!OutputFormatHandler::supports_transparency(OutputFormat::Jpeg));
    }
}
