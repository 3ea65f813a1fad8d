//! Export of processed images
//!
//! Re-encodes a processed data URL into one of the export formats at its
//! natural size and writes it to disk under a derived `no-bg-` filename.

use crate::{
    config::OutputFormat,
    data_url::DataUrl,
    error::{NoBgError, Result},
    services::OutputFormatHandler,
    tracing_config::spans,
};
use std::path::{Path, PathBuf};

/// Filename prefix of every export
pub const EXPORT_PREFIX: &str = "no-bg-";

/// Quality used for lossy exports
pub const EXPORT_QUALITY: u8 = 100;

/// An encoded export ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    pub filename: String,
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
}

impl ExportedImage {
    #[must_use]
    pub fn mime(&self) -> &'static str {
        self.format.mime_type()
    }

    #[must_use]
    pub fn to_data_url(&self) -> DataUrl {
        DataUrl::new(self.mime(), self.bytes.clone())
    }
}

/// Derive the export filename from the original one
///
/// The last extension is replaced, inner dots are kept:
/// `photo.JPG` becomes `no-bg-photo.webp` and `archive.tar.png` becomes
/// `no-bg-archive.tar.png`.
#[must_use]
pub fn derive_filename(original: &str, format: OutputFormat) -> String {
    let stem = match original.rfind('.') {
        Some(dot) if dot + 1 < original.len() && !original[dot + 1..].contains('/') => {
            &original[..dot]
        },
        _ => original,
    };
    format!("{EXPORT_PREFIX}{stem}.{}", format.extension())
}

/// Decode `data_url` and re-encode it as `format`
///
/// JPEG is written at quality 100 with alpha dropped; WebP is lossless.
///
/// # Errors
/// - Malformed image payload
/// - Encoder failure
pub fn export_image(
    data_url: &DataUrl,
    filename: &str,
    format: OutputFormat,
) -> Result<ExportedImage> {
    let export_name = derive_filename(filename, format);
    let _span = spans::export(format.extension(), &export_name).entered();

    let image = data_url
        .decode_image()
        .map_err(|e| NoBgError::export(format!("Cannot decode processed image: {e}")))?;
    OutputFormatHandler::validate_for_background_removal(format);
    let bytes = OutputFormatHandler::encode(&image, format, EXPORT_QUALITY)?;

    log::debug!(
        "Exported {} ({}x{}, {} bytes)",
        export_name,
        image.width(),
        image.height(),
        bytes.len()
    );

    Ok(ExportedImage {
        filename: export_name,
        format,
        bytes,
    })
}

/// Export and write the file into `dir`, creating the directory if needed
///
/// # Errors
/// - Export failures from [`export_image`]
/// - Directory or file cannot be written
pub async fn save_image<P: AsRef<Path>>(
    data_url: &DataUrl,
    filename: &str,
    format: OutputFormat,
    dir: P,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let exported = export_image(data_url, filename, format)?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| NoBgError::file_io_error("create output directory", dir, &e))?;

    let path = dir.join(&exported.filename);
    tokio::fs::write(&path, &exported.bytes)
        .await
        .map_err(|e| NoBgError::file_io_error("write export", &path, &e))?;

    tracing::info!(path = %path.display(), format = %format, "Saved image");
    Ok(path)
}

/// Human-readable processing time: `850ms` or `2.3s`
#[must_use]
pub fn format_processing_time(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}
