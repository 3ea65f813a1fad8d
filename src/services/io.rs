//! Image file intake
//!
//! `ImageFile` is the in-memory stand-in for a dropped or picked file: a
//! name, a MIME type and the raw bytes. `ImageIOService` reads files from
//! disk and sniffs their type.

use crate::{
    data_url::DataUrl,
    error::{NoBgError, Result},
};
use image::DynamicImage;
use std::path::Path;

/// MIME type used when nothing better can be determined
pub const UNKNOWN_MIME: &str = "application/octet-stream";

/// A user-supplied file held in memory
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    name: String,
    mime: String,
    bytes: Vec<u8>,
}

impl ImageFile {
    /// Create a file from its parts without sniffing the type
    pub fn new<N: Into<String>, M: Into<String>>(name: N, mime: M, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Create a file and detect its MIME type from content and name
    pub fn from_bytes<N: Into<String>>(name: N, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = ImageIOService::detect_mime(&name, &bytes).to_string();
        Self { name, mime, bytes }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the file declares an image MIME type
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    /// Encode the file contents as a data URL
    #[must_use]
    pub fn to_data_url(&self) -> DataUrl {
        DataUrl::new(self.mime.clone(), self.bytes.clone())
    }

    /// Decode the file into an in-memory image
    ///
    /// # Errors
    /// - Content is not a decodable image
    pub fn decode(&self) -> Result<DynamicImage> {
        ImageIOService::load_from_bytes(&self.name, &self.bytes)
    }
}

impl std::fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Service for reading image files and detecting their type
pub struct ImageIOService;

impl ImageIOService {
    /// Read a file from disk into an `ImageFile`
    ///
    /// # Errors
    /// - File does not exist or cannot be read
    pub async fn read_file<P: AsRef<Path>>(path: P) -> Result<ImageFile> {
        let path_ref = path.as_ref();
        let bytes = tokio::fs::read(path_ref)
            .await
            .map_err(|e| NoBgError::file_io_error("read image file", path_ref, &e))?;

        let name = path_ref
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        log::debug!("Read {} ({} bytes)", path_ref.display(), bytes.len());
        Ok(ImageFile::from_bytes(name, bytes))
    }

    /// Detect a MIME type from magic bytes, falling back to the extension
    #[must_use]
    pub fn detect_mime(name: &str, bytes: &[u8]) -> &'static str {
        if let Ok(format) = image::guess_format(bytes) {
            if let Some(mime) = Self::format_mime(format) {
                return mime;
            }
        }
        Self::mime_from_extension(name).unwrap_or(UNKNOWN_MIME)
    }

    /// Map a file name's extension to an image MIME type
    #[must_use]
    pub fn mime_from_extension(name: &str) -> Option<&'static str> {
        let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "gif" => Some("image/gif"),
            "webp" => Some("image/webp"),
            "bmp" => Some("image/bmp"),
            "tif" | "tiff" => Some("image/tiff"),
            _ => None,
        }
    }

    fn format_mime(format: image::ImageFormat) -> Option<&'static str> {
        match format {
            image::ImageFormat::Jpeg => Some("image/jpeg"),
            image::ImageFormat::Png => Some("image/png"),
            image::ImageFormat::Gif => Some("image/gif"),
            image::ImageFormat::WebP => Some("image/webp"),
            image::ImageFormat::Bmp => Some("image/bmp"),
            image::ImageFormat::Tiff => Some("image/tiff"),
            _ => None,
        }
    }

    /// Decode image bytes, trying content detection first and the file
    /// extension second
    ///
    /// # Errors
    /// - Both detection methods fail
    pub fn load_from_bytes(name: &str, bytes: &[u8]) -> Result<DynamicImage> {
        match image::load_from_memory(bytes) {
            Ok(img) => Ok(img),
            Err(content_err) => {
                log::debug!(
                    "Content-based decoding failed for {}: {}. Attempting extension-based decoding.",
                    name,
                    content_err
                );

                let format = Path::new(name)
                    .extension()
                    .and_then(image::ImageFormat::from_extension);

                match format {
                    Some(format) => image::load_from_memory_with_format(bytes, format).map_err(|e| {
                        NoBgError::processing_stage_error(
                            "image decode",
                            &format!(
                                "content error: {content_err}, extension ({format:?}) error: {e}"
                            ),
                            Some(&format!("{}, {} bytes", name, bytes.len())),
                        )
                    }),
                    None => Err(NoBgError::processing_stage_error(
                        "image decode",
                        &content_err.to_string(),
                        Some(&format!("{}, {} bytes", name, bytes.len())),
                    )),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_content_wins_over_extension() {
        let file = ImageFile::from_bytes("photo.jpg", png_bytes());
        assert_eq!(file.mime(), "image/png");
        assert!(file.is_image());
    }

    #[test]
    fn test_extension_fallback() {
        let file = ImageFile::from_bytes("broken.WEBP", vec![0, 1, 2]);
        assert_eq!(file.mime(), "image/webp");
    }

    #[test]
    fn test_unknown_type_is_not_image() {
        let file = ImageFile::from_bytes("notes.txt", b"hello".to_vec());
        assert_eq!(file.mime(), UNKNOWN_MIME);
        assert!(!file.is_image());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let file = ImageFile::new("x.png", "image/png", vec![9, 9, 9]);
        assert!(file.decode().is_err());
    }

    #[tokio::test]
    async fn test_read_file_missing() {
        let err = ImageIOService::read_file("/definitely/not/here.png")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read image file"));
    }
}
