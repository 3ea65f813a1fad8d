//! Background-removal adapter
//!
//! Wraps a `SegmentationEngine` behind a small, uniform surface:
//!
//! - `preload()` fetches the model weights once per adapter
//! - `process()` runs one image through the engine and resolves to a data URL
//!
//! While processing, the adapter reports `(percent, label)` pairs. Model
//! loading fills the load band (0-70 by default); the remaining stages are
//! fixed points followed by short holds so each label stays readable.

use crate::{
    config::{OutputFormat, ProgressBands, RemovalConfig},
    data_url::DataUrl,
    engine::{ByteProgress, EngineConfig, EngineInput, EngineOutput, SegmentationEngine},
    error::{NoBgError, Result},
    services::{
        FnProgressReporter, ImageFile, ImageIOService, NoOpProgressReporter, ProcessingStage,
        ProgressReporter, ProgressTracker,
    },
    tracing_config::{events, spans},
};
use image::{DynamicImage, RgbaImage};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::Instrument;

/// Per-call options for `BackgroundRemover::process`
#[derive(Clone, Default)]
pub struct ProcessingOptions {
    /// Receives progress updates
    pub on_progress: Option<Arc<dyn ProgressReporter>>,
}

impl ProcessingOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reporter(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            on_progress: Some(reporter),
        }
    }

    /// Report progress to a `(percent, label)` closure
    #[must_use]
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(u8, &str) + Send + Sync + 'static,
    {
        Self::with_reporter(Arc::new(FnProgressReporter::new(callback)))
    }

    fn reporter(&self) -> Arc<dyn ProgressReporter> {
        self.on_progress
            .clone()
            .unwrap_or_else(|| Arc::new(NoOpProgressReporter))
    }
}

impl std::fmt::Debug for ProcessingOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingOptions")
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Shared progress state for one run
///
/// The byte-progress callback must be `'static`, so the tracker lives behind
/// an `Arc<Mutex<_>>` that the callback and the adapter both hold.
#[derive(Clone)]
struct RunProgress {
    tracker: Arc<Mutex<ProgressTracker>>,
    bands: ProgressBands,
}

impl RunProgress {
    fn new(reporter: Arc<dyn ProgressReporter>, bands: ProgressBands) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(ProgressTracker::new(reporter))),
            bands,
        }
    }

    fn stage(&self, stage: ProcessingStage) {
        let percent = stage.progress_percentage(&self.bands);
        events::stage(percent, stage.description());
        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.report(stage, percent);
        }
    }

    fn complete(&self) {
        if let Ok(tracker) = self.tracker.lock() {
            tracker.report_completion();
        }
    }

    fn error(&self, message: &str) {
        if let Ok(tracker) = self.tracker.lock() {
            tracker.report_error(message);
        }
    }

    /// Map engine byte counts onto the load band
    ///
    /// Keys (model files) are summed, so the band tracks total bytes across
    /// every file seen so far rather than restarting per file.
    fn byte_progress(&self) -> ByteProgress {
        let tracker = self.tracker.clone();
        let bands = self.bands;
        let files: Mutex<BTreeMap<String, (u64, u64)>> = Mutex::new(BTreeMap::new());
        Arc::new(move |key: &str, current: u64, total: u64| {
            let Ok(mut files) = files.lock() else {
                return;
            };
            files.insert(key.to_string(), (current.min(total), total));
            let (loaded, size) = files
                .values()
                .fold((0u64, 0u64), |(loaded, size), (current, total)| {
                    (loaded + current, size + total)
                });
            drop(files);

            let percent = bands.map_load(loaded, size);
            log::trace!(
                "Loading {}: {}/{} bytes, {}/{} overall -> {}%",
                key,
                current,
                total,
                loaded,
                size,
                percent
            );
            if let Ok(mut tracker) = tracker.lock() {
                tracker.report(ProcessingStage::LoadingModel, percent);
            }
        })
    }
}

/// Uniform wrapper around a segmentation engine
pub struct BackgroundRemover {
    engine: Arc<dyn SegmentationEngine>,
    config: RemovalConfig,
    engine_config: EngineConfig,
    preloaded: OnceCell<()>,
}

impl std::fmt::Debug for BackgroundRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemover")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .field("preloaded", &self.is_preloaded())
            .finish()
    }
}

impl BackgroundRemover {
    #[must_use]
    pub fn new(engine: Arc<dyn SegmentationEngine>, config: RemovalConfig) -> Self {
        let engine_config = EngineConfig::from(&config);
        Self {
            engine,
            config,
            engine_config,
            preloaded: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Whether the model weights have been loaded
    #[must_use]
    pub fn is_preloaded(&self) -> bool {
        self.preloaded.initialized()
    }

    /// Load the model weights once
    ///
    /// Concurrent callers wait on the same load. A failed load leaves the
    /// adapter unloaded, so the next call tries again.
    ///
    /// # Errors
    /// - The engine's preload error, unchanged
    pub async fn preload(&self) -> Result<()> {
        self.preload_inner(None).await
    }

    /// `preload` with load progress reported through `options`
    ///
    /// # Errors
    /// - The engine's preload error, unchanged
    pub async fn preload_with_progress(&self, options: &ProcessingOptions) -> Result<()> {
        let progress = RunProgress::new(options.reporter(), self.config.bands);
        self.preload_inner(Some(progress.byte_progress())).await
    }

    async fn preload_inner(&self, progress: Option<ByteProgress>) -> Result<()> {
        self.preloaded
            .get_or_try_init(|| async {
                let span = spans::model_preload(&self.engine_config.model, &self.engine_config.variant);
                let start = instant::Instant::now();
                self.engine
                    .preload(&self.engine_config, progress)
                    .instrument(span)
                    .await?;
                events::performance_metric("model_preload", start.elapsed().as_millis() as u64);
                Ok::<(), NoBgError>(())
            })
            .await
            .map(|_| ())
    }

    /// Remove the background from one image file
    ///
    /// # Errors
    /// - Any failure, wrapped as `NoBgError::Removal`
    pub async fn process(&self, file: &ImageFile, options: &ProcessingOptions) -> Result<DataUrl> {
        let span = spans::file_processing(file.name(), file.mime(), file.size());
        let progress = RunProgress::new(options.reporter(), self.config.bands);

        match self.run(file, &progress).instrument(span).await {
            Ok(data_url) => Ok(data_url),
            Err(e) => {
                let error = NoBgError::removal(e);
                progress.error(&error.to_string());
                events::error_with_context(&error, "background removal");
                Err(error)
            },
        }
    }

    async fn run(&self, file: &ImageFile, progress: &RunProgress) -> Result<DataUrl> {
        if !self.is_preloaded() {
            self.preload_inner(Some(progress.byte_progress())).await?;
        }

        progress.stage(ProcessingStage::Preparing);
        progress.stage(ProcessingStage::Analyzing);

        let output = self.remove_with_fallback(file).await?;
        log::debug!("Engine returned {} output", output.kind());
        let data_url = normalize_output(output)?;

        progress.stage(ProcessingStage::Finalizing);
        tokio::time::sleep(self.config.finalize_hold()).await;
        progress.stage(ProcessingStage::Complete);
        tokio::time::sleep(self.config.complete_hold()).await;
        progress.complete();

        Ok(data_url)
    }

    /// Try the raw file first, then a decoded image
    async fn remove_with_fallback(&self, file: &ImageFile) -> Result<EngineOutput> {
        let primary = self
            .engine
            .remove_background(EngineInput::Encoded(file.clone()), &self.engine_config)
            .await;

        match primary {
            Ok(output) => Ok(output),
            Err(primary_error) => {
                tracing::warn!(
                    error = %primary_error,
                    file = %file.name(),
                    "Direct processing failed, retrying with decoded image"
                );
                let decoded = file.decode()?;
                self.engine
                    .remove_background(EngineInput::Decoded(decoded), &self.engine_config)
                    .await
            },
        }
    }
}

/// Convert any engine output shape into one data URL
///
/// Blobs keep their MIME type; canvases and pixel buffers are encoded as PNG.
///
/// # Errors
/// - Pixel buffer length is not `width * height * 4`
/// - PNG encoding failures
pub fn normalize_output(output: EngineOutput) -> Result<DataUrl> {
    match output {
        EngineOutput::Blob { mime, bytes } => {
            if bytes.is_empty() {
                return Err(NoBgError::processing("Engine returned an empty image"));
            }
            let mime = if mime.is_empty() {
                ImageIOService::detect_mime("", &bytes).to_string()
            } else {
                mime
            };
            Ok(DataUrl::new(mime, bytes))
        },
        EngineOutput::Canvas(canvas) => {
            DataUrl::from_image(&DynamicImage::ImageRgba8(canvas), OutputFormat::Png, 100)
        },
        EngineOutput::Pixels {
            width,
            height,
            data,
        } => {
            let expected = u64::from(width) * u64::from(height) * 4;
            if data.len() as u64 != expected {
                return Err(NoBgError::processing(format!(
                    "Pixel buffer has {} bytes, expected {} for {}x{} RGBA",
                    data.len(),
                    expected,
                    width,
                    height
                )));
            }
            let image = RgbaImage::from_raw(width, height, data)
                .ok_or_else(|| NoBgError::processing("Pixel buffer does not fit its dimensions"))?;
            DataUrl::from_image(&DynamicImage::ImageRgba8(image), OutputFormat::Png, 100)
        },
    }
}
