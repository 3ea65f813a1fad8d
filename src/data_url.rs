//! Base64 data URLs (`data:<mime>;base64,<payload>`)
//!
//! Processed and original images travel between the session, the views and
//! the exporter as data URLs, the same currency a browser `<img>` accepts.

use crate::error::{NoBgError, Result};
use base64::{engine::general_purpose, Engine};
use image::DynamicImage;
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// An in-memory image encoded as a data URL
#[derive(Clone, PartialEq, Eq)]
pub struct DataUrl {
    mime: String,
    bytes: Vec<u8>,
}

impl DataUrl {
    /// Create a data URL from a MIME type and raw bytes
    pub fn new<S: Into<String>>(mime: S, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Encode an image in the given format and wrap it as a data URL
    ///
    /// # Errors
    /// - Encoding failures from the `image` crate
    pub fn from_image(
        image: &DynamicImage,
        format: crate::config::OutputFormat,
        quality: u8,
    ) -> Result<Self> {
        let bytes = crate::services::OutputFormatHandler::encode(image, format, quality)?;
        Ok(Self::new(format.mime_type(), bytes))
    }

    /// Parse a data URL string
    ///
    /// Only the base64 form is accepted. MIME parameters other than
    /// `;base64` (e.g. `;charset=utf-8`) are dropped.
    ///
    /// # Errors
    /// - Missing `data:` scheme or comma separator
    /// - Missing `;base64` marker
    /// - Invalid base64 payload
    pub fn parse(input: &str) -> Result<Self> {
        let rest = input
            .strip_prefix(SCHEME)
            .ok_or_else(|| NoBgError::data_url("missing 'data:' scheme"))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| NoBgError::data_url("missing ',' separator"))?;

        let header = header
            .strip_suffix(BASE64_MARKER)
            .ok_or_else(|| NoBgError::data_url("only base64 data URLs are supported"))?;

        let mime = header.split(';').next().unwrap_or_default().trim();
        let mime = if mime.is_empty() {
            "text/plain".to_string()
        } else {
            mime.to_ascii_lowercase()
        };

        let bytes = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| NoBgError::data_url(format!("invalid base64 payload: {e}")))?;

        Ok(Self { mime, bytes })
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
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decoded payload size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the payload into an image at its natural size
    ///
    /// # Errors
    /// - Payload is not a decodable image
    pub fn decode_image(&self) -> Result<DynamicImage> {
        image::load_from_memory(&self.bytes).map_err(|e| {
            NoBgError::processing_stage_error(
                "data URL decode",
                &e.to_string(),
                Some(&format!("{}, {} bytes", self.mime, self.bytes.len())),
            )
        })
    }
}

impl fmt::Display for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}{}{BASE64_MARKER},{}",
            self.mime,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

impl fmt::Debug for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataUrl")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl FromStr for DataUrl {
    type Err = NoBgError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_matches_browser_output() {
        let url = DataUrl::new("image/png", b"hello".to_vec());
        assert_eq!(url.to_string(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_parse_with_parameters() {
        let url = DataUrl::parse("data:Image/PNG;charset=utf-8;base64,aGVsbG8=").unwrap();
        assert_eq!(url.mime(), "image/png");
        assert_eq!(url.bytes(), b"hello");
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(DataUrl::parse("image/png;base64,aGVsbG8=").is_err());
        assert!(DataUrl::parse("data:image/png;base64").is_err());
        assert!(DataUrl::parse("data:image/png,hello").is_err());
        assert!(DataUrl::parse("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn test_empty_mime_defaults_to_text() {
        let url = DataUrl::parse("data:;base64,").unwrap();
        assert_eq!(url.mime(), "text/plain");
        assert!(url.is_empty());
    }

    #[test]
    fn test_decode_image_failure_mentions_mime() {
        let url = DataUrl::new("image/png", vec![1, 2, 3]);
        let err = url.decode_image().unwrap_err();
        assert!(err.to_string().contains("image/png"));
    }
}
