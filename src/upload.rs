//! Upload zone intake policy
//!
//! Decides which dropped or picked files reach the session and produces the
//! status texts shown around the progress bar.

use crate::{
    analytics::{AnalyticsEvent, EventSink, UploadMethod},
    services::{ImageFile, UNKNOWN_MIME},
};
use std::sync::Arc;

/// MIME types the upload zone accepts, with their extensions
pub const ACCEPTED_TYPES: &[(&str, &[&str])] = &[
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("image/gif", &["gif"]),
    ("image/webp", &["webp"]),
];

/// Why an intake produced no file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The zone is disabled while an image is processing
    Busy,
    /// None of the files has an accepted type
    Unsupported(Vec<String>),
    Empty,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "an image is already being processed"),
            Self::Unsupported(names) => {
                write!(f, "unsupported file type: {}", names.join(", "))
            },
            Self::Empty => write!(f, "no file selected"),
        }
    }
}

/// Upload zone
pub struct UploadZone {
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for UploadZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadZone").finish_non_exhaustive()
    }
}

impl UploadZone {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Whether `file` has one of the accepted MIME types
    ///
    /// A file with no known type is matched on its extension instead.
    #[must_use]
    pub fn is_accepted(file: &ImageFile) -> bool {
        if ACCEPTED_TYPES.iter().any(|(mime, _)| *mime == file.mime()) {
            return true;
        }
        if !file.mime().is_empty() && file.mime() != UNKNOWN_MIME {
            return false;
        }

        let Some((_, ext)) = file.name().rsplit_once('.') else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        ACCEPTED_TYPES
            .iter()
            .any(|(_, extensions)| extensions.contains(&ext.as_str()))
    }

    /// Pick the single file to process from a drop or picker selection
    ///
    /// Emits `image_uploaded` for the accepted file.
    ///
    /// # Errors
    /// - [`Rejection::Busy`] while processing
    /// - [`Rejection::Empty`] or [`Rejection::Unsupported`] when nothing fits
    pub fn accept(
        &self,
        files: Vec<ImageFile>,
        method: UploadMethod,
        processing: bool,
    ) -> Result<ImageFile, Rejection> {
        if processing {
            return Err(Rejection::Busy);
        }
        if files.is_empty() {
            return Err(Rejection::Empty);
        }

        let (accepted, rejected): (Vec<_>, Vec<_>) =
            files.into_iter().partition(Self::is_accepted);
        if !rejected.is_empty() {
            log::debug!(
                "Rejected {} file(s): {}",
                rejected.len(),
                rejected
                    .iter()
                    .map(ImageFile::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let Some(file) = accepted.into_iter().next() else {
            return Err(Rejection::Unsupported(
                rejected.iter().map(|f| f.name().to_string()).collect(),
            ));
        };

        self.sink.capture(AnalyticsEvent::image_uploaded(
            file.mime(),
            file.size(),
            method,
        ));
        Ok(file)
    }

    /// Headline of the zone
    #[must_use]
    pub fn headline(processing: bool, drag_active: bool) -> &'static str {
        if processing {
            "Processing image..."
        } else if drag_active {
            "Drop image here"
        } else {
            "Drop image here or click to select"
        }
    }

    /// Text above the progress bar
    #[must_use]
    pub fn progress_text(progress: u8) -> String {
        if progress > 0 {
            format!("Processing... {progress}%")
        } else {
            "Loading model...".to_string()
        }
    }

    #[must_use]
    pub fn supported_formats_text() -> &'static str {
        "Supports JPG, PNG, GIF, and WEBP files"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::RecordingSink;
    use serde_json::Value;

    fn file(name: &str, mime: &str) -> ImageFile {
        ImageFile::new(name, mime, vec![0; 16])
    }

    #[test]
    fn test_accepts_first_supported_file() {
        let sink = RecordingSink::new();
        let zone = UploadZone::new(Arc::new(sink.clone()));

        let picked = zone
            .accept(
                vec![
                    file("notes.txt", "text/plain"),
                    file("a.PNG", "image/png"),
                    file("b.webp", "image/webp"),
                ],
                UploadMethod::DragDrop,
                false,
            )
            .unwrap();

        assert_eq!(picked.name(), "a.PNG");
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "image_uploaded");
        assert_eq!(events[0].property("file_size"), Some(&Value::from(16u64)));
        assert_eq!(events[0].property("upload_method"), Some(&Value::from("drag_drop")));
    }

    #[test]
    fn test_rejects_while_processing() {
        let sink = RecordingSink::new();
        let zone = UploadZone::new(Arc::new(sink.clone()));

        let result = zone.accept(vec![file("a.png", "image/png")], UploadMethod::FilePicker, true);

        assert_eq!(result.unwrap_err(), Rejection::Busy);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_rejects_unsupported_types() {
        let zone = UploadZone::new(Arc::new(RecordingSink::new()));

        let result = zone.accept(
            vec![
                file("scan.bmp", "image/bmp"),
                file("notes.png", "text/plain"),
                file("blob", UNKNOWN_MIME),
            ],
            UploadMethod::FilePicker,
            false,
        );
        assert_eq!(
            result.unwrap_err(),
            Rejection::Unsupported(vec!["scan.bmp".into(), "notes.png".into(), "blob".into()])
        );
        assert_eq!(
            zone.accept(vec![], UploadMethod::FilePicker, false).unwrap_err(),
            Rejection::Empty
        );
    }

    #[test]
    fn test_accepts_on_type_or_extension() {
        assert!(UploadZone::is_accepted(&file("x.png", "image/jpeg")));
        assert!(UploadZone::is_accepted(&file("photo.jfif", "image/jpeg")));
        assert!(UploadZone::is_accepted(&file("camera", "image/webp")));
        assert!(UploadZone::is_accepted(&file("clip.GIF", UNKNOWN_MIME)));
        assert!(UploadZone::is_accepted(&file("pic.jpeg", "")));
        assert!(!UploadZone::is_accepted(&file("pic.jpeg", "image/bmp")));
    }

    #[test]
    fn test_png_saved_as_jpg_is_accepted() {
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgba8(4, 4)
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        let renamed = ImageFile::from_bytes("photo.jpg", bytes.into_inner());
        assert_eq!(renamed.mime(), "image/png");

        let zone = UploadZone::new(Arc::new(RecordingSink::new()));
        let picked = zone
            .accept(vec![renamed], UploadMethod::DragDrop, false)
            .unwrap();
        assert_eq!(picked.name(), "photo.jpg");
    }

    #[test]
    fn test_status_texts() {
        assert_eq!(UploadZone::headline(true, true), "Processing image...");
        assert_eq!(UploadZone::headline(false, true), "Drop image here");
        assert_eq!(UploadZone::headline(false, false), "Drop image here or click to select");
        assert_eq!(UploadZone::progress_text(0), "Loading model...");
        assert_eq!(UploadZone::progress_text(42), "Processing... 42%");
        assert_eq!(
            UploadZone::supported_formats_text(),
            "Supports JPG, PNG, GIF, and WEBP files"
        );
    }
}
