#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # nobg
//!
//! Drop an image, remove its background with an AI segmentation model,
//! compare the result against the original and export it as PNG, JPEG or
//! WebP.
//!
//! The model itself runs in an external engine behind the
//! [`SegmentationEngine`] trait. Everything around it lives here: file
//! intake, the init-once model preload, staged progress reporting, the
//! processing session state machine, comparison rendering and export.
//!
//! ## Features
//!
//! - **Init-once preload**: weights are fetched and cached once per adapter,
//!   concurrent callers share the same load
//! - **Staged progress**: byte-level download progress mapped onto a
//!   0–100 scale with stage labels
//! - **Session state**: a `watch` channel publishes phase, progress and the
//!   current result so any view can follow along
//! - **Export**: lossless PNG/WebP and full-quality JPEG with `no-bg-` names
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nobg::{BackgroundRemover, ImageIOService, OnnxEngine, ProcessingOptions, RemovalConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = Arc::new(OnnxEngine::new()?);
//! let remover = BackgroundRemover::new(engine, RemovalConfig::default());
//!
//! let file = ImageIOService::read_file("photo.jpg").await?;
//! let options = ProcessingOptions::with_callback(|progress, label| {
//!     println!("{progress:>3}% {label}");
//! });
//! let processed = remover.process(&file, &options).await?;
//! nobg::save_image(&processed, file.name(), nobg::OutputFormat::Png, "out").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Sessions
//!
//! ```rust,no_run
//! use nobg::{BackgroundRemover, MockEngine, ProcessingSession, RemovalConfig, SessionConfig};
//! use std::sync::Arc;
//!
//! # async fn example(files: Vec<nobg::ImageFile>) {
//! let remover = BackgroundRemover::new(Arc::new(MockEngine::new()), RemovalConfig::default());
//! let session = ProcessingSession::new(Arc::new(remover), SessionConfig::default());
//!
//! let mut state = session.subscribe();
//! tokio::spawn(async move {
//!     while state.changed().await.is_ok() {
//!         let snapshot = state.borrow().clone();
//!         println!("{:?} {}% {}", snapshot.phase, snapshot.progress, snapshot.status);
//!     }
//! });
//!
//! let outcome = session.process_files(files).await;
//! println!("{outcome:?}");
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime engine with model download and caching
//! - `cli` (default): Command-line interface and progress bars
//! - `tracing-json`: JSON log output for the CLI

pub mod adapter;
pub mod analytics;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod data_url;
pub mod download;
pub mod engine;
pub mod error;
pub mod export;
pub mod results;
pub mod services;
pub mod session;
pub mod tracing_config;
pub mod upload;

use std::sync::Arc;
use tokio::io::AsyncRead;

// Public API exports
pub use adapter::{normalize_output, BackgroundRemover, ProcessingOptions};
pub use analytics::{
    sink_from_config, AnalyticsEvent, EventSink, HttpSink, NoOpSink, RecordingSink, TracingSink,
    UploadMethod,
};
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{
    AnalyticsConfig, NobgConfig, OutputFormat, ProgressBands, RemovalConfig, SessionConfig,
};
pub use data_url::DataUrl;
pub use download::{validate_model_url, ModelDownloader};
#[cfg(feature = "onnx")]
pub use engine::OnnxEngine;
pub use engine::{
    ByteProgress, EngineConfig, EngineInput, EngineOutput, MockBehavior, MockEngine,
    SegmentationEngine,
};
pub use error::{NoBgError, Result};
pub use export::{derive_filename, export_image, format_processing_time, save_image, ExportedImage};
pub use results::{render_comparison, ComparisonSlider, ResultsView};
pub use services::{
    FnProgressReporter, ImageFile, ImageIOService, NoOpProgressReporter,
    OutputFormatHandler, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use session::{ProcessedImage, ProcessingSession, SessionOutcome, SessionPhase, SessionState};
pub use upload::{Rejection, UploadZone};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};

/// Remove the background from an in-memory image file
///
/// Builds a one-shot [`BackgroundRemover`] around `engine`; keep a remover
/// around instead when processing more than one image so the model is
/// only loaded once.
///
/// # Examples
///
/// ```rust,no_run
/// use nobg::{remove_background_from_bytes, MockEngine, RemovalConfig};
/// use std::sync::Arc;
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let processed = remove_background_from_bytes(
///     "upload.png",
///     upload,
///     Arc::new(MockEngine::new()),
///     &RemovalConfig::default(),
/// )
/// .await?;
/// println!("{} bytes of {}", processed.len(), processed.mime());
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    name: &str,
    bytes: Vec<u8>,
    engine: Arc<dyn SegmentationEngine>,
    config: &RemovalConfig,
) -> Result<DataUrl> {
    let file = ImageFile::from_bytes(name, bytes);
    let remover = BackgroundRemover::new(engine, config.clone());
    remover.process(&file, &ProcessingOptions::new()).await
}

/// Remove the background from an async reader stream
///
/// The stream is read to the end before processing.
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    name: &str,
    mut reader: R,
    engine: Arc<dyn SegmentationEngine>,
    config: &RemovalConfig,
) -> Result<DataUrl> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| NoBgError::processing(format!("Failed to read from stream: {}", e)))?;

    remove_background_from_bytes(name, buffer, engine, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png_bytes() -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255])));
        OutputFormatHandler::encode(&image, OutputFormat::Png, 100).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_background_from_reader() {
        let reader = std::io::Cursor::new(png_bytes());
        let processed = remove_background_from_reader(
            "a.png",
            reader,
            Arc::new(MockEngine::new()),
            &RemovalConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(processed.mime(), "image/webp");
        assert!(processed.decode_image().is_ok());
    }
}
