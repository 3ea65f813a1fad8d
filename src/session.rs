//! Processing session: the state coordinator between intake and views
//!
//! A session runs one image at a time through the adapter and publishes its
//! state on a `watch` channel so views can re-render on every change:
//!
//! ```text
//! Idle -> Reading -> Processing -> Settling -> Idle (with result)
//! ```

use crate::{
    adapter::{BackgroundRemover, ProcessingOptions},
    config::SessionConfig,
    data_url::DataUrl,
    services::{ImageFile, ProgressReporter, ProgressUpdate},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::watch;

/// Where a session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Turning the file into a data URL
    Reading,
    /// Waiting on the adapter
    Processing,
    /// Short pause after completion
    Settling,
}

/// Result of one successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub original: DataUrl,
    pub processed: DataUrl,
    pub filename: String,
    pub processing_time_ms: u64,
}

/// Snapshot of session state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub processing: bool,
    pub progress: u8,
    pub status: String,
    /// At most one entry: the current result
    pub results: Vec<Arc<ProcessedImage>>,
    /// Message of the last failed run, cleared when a new run starts
    pub last_error: Option<String>,
}

impl SessionState {
    /// The current result, if any
    #[must_use]
    pub fn current(&self) -> Option<&Arc<ProcessedImage>> {
        self.results.first()
    }
}

/// How a call to `process_files` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(Arc<ProcessedImage>),
    /// No image among the files; state untouched
    NoImage,
    /// The run failed; the message is also stored as `last_error`
    Failed(String),
    /// Another run is active; state untouched
    Busy,
}

/// Writes adapter progress into session state
struct StateReporter {
    state: Arc<watch::Sender<SessionState>>,
}

impl ProgressReporter for StateReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.state.send_modify(|state| {
            state.progress = update.progress;
            state.status = update.description;
        });
    }
}

/// Resets progress and releases the busy flag on every exit path,
/// including the `process_files` future being dropped mid-run.
struct RunGuard<'a> {
    state: &'a watch::Sender<SessionState>,
    busy: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|state| {
            state.phase = SessionPhase::Idle;
            state.processing = false;
            state.progress = 0;
            state.status.clear();
        });
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Per-session state coordinator
pub struct ProcessingSession {
    remover: Arc<BackgroundRemover>,
    config: SessionConfig,
    state: Arc<watch::Sender<SessionState>>,
    busy: AtomicBool,
}

impl std::fmt::Debug for ProcessingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSession")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ProcessingSession {
    #[must_use]
    pub fn new(remover: Arc<BackgroundRemover>, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            remover,
            config,
            state: Arc::new(state),
            busy: AtomicBool::new(false),
        }
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.state.borrow().processing
    }

    /// Drop the current result and the last error
    pub fn clear_all(&self) {
        self.state.send_modify(|state| {
            state.results.clear();
            state.last_error = None;
        });
    }

    /// Process the first image among `files`
    ///
    /// Non-image files are skipped. Failures are logged and reported through
    /// the outcome and `last_error`; this never returns an error to the caller.
    pub async fn process_files(&self, files: Vec<ImageFile>) -> SessionOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Ignoring files while another image is processing");
            return SessionOutcome::Busy;
        }

        let skipped = files.iter().filter(|file| !file.is_image()).count();
        let Some(file) = files.into_iter().find(ImageFile::is_image) else {
            self.busy.store(false, Ordering::SeqCst);
            tracing::debug!(skipped, "No image among dropped files");
            return SessionOutcome::NoImage;
        };
        if skipped > 0 {
            tracing::debug!(skipped, "Skipped non-image files");
        }

        let _guard = RunGuard {
            state: &self.state,
            busy: &self.busy,
        };
        self.state.send_modify(|state| {
            state.phase = SessionPhase::Reading;
            state.processing = true;
            state.progress = 0;
            state.status.clear();
            state.last_error = None;
        });

        let start = tokio::time::Instant::now();
        let original = file.to_data_url();

        self.set_phase(SessionPhase::Processing);
        let options = ProcessingOptions::with_reporter(Arc::new(StateReporter {
            state: self.state.clone(),
        }));

        if let Err(e) = self.remover.preload_with_progress(&options).await {
            tracing::warn!(error = %e, "Failed to preload model");
        }

        let processed = match self.remover.process(&file, &options).await {
            Ok(processed) => processed,
            Err(e) => {
                let message = e.to_string();
                tracing::error!(file = %file.name(), error = %message, "Error processing image");
                self.state.send_modify(|state| state.last_error = Some(message.clone()));
                return SessionOutcome::Failed(message);
            },
        };
        let processing_time_ms = start.elapsed().as_millis() as u64;

        self.set_phase(SessionPhase::Settling);
        tokio::time::sleep(self.config.settle_delay()).await;

        let result = Arc::new(ProcessedImage {
            original,
            processed,
            filename: file.name().to_string(),
            processing_time_ms,
        });
        self.state
            .send_modify(|state| state.results = vec![result.clone()]);

        tracing::info!(
            file = %result.filename,
            processing_time_ms,
            "Background removed"
        );
        SessionOutcome::Completed(result)
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.state.send_modify(|state| state.phase = phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputFormat, RemovalConfig};
    use crate::engine::MockEngine;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::time::Duration;

    fn png_file(name: &str) -> ImageFile {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 6, Rgba([1, 2, 3, 255])));
        let bytes = DataUrl::from_image(&image, OutputFormat::Png, 100)
            .unwrap()
            .into_bytes();
        ImageFile::new(name, "image/png", bytes)
    }

    fn session(engine: MockEngine) -> ProcessingSession {
        let remover = BackgroundRemover::new(Arc::new(engine), RemovalConfig::default());
        ProcessingSession::new(Arc::new(remover), SessionConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_run_stores_one_result() {
        let session = session(MockEngine::new());

        let outcome = session.process_files(vec![png_file("a.png")]).await;
        assert!(matches!(outcome, SessionOutcome::Completed(_)));

        let outcome = session.process_files(vec![png_file("b.png")]).await;
        assert!(matches!(outcome, SessionOutcome::Completed(_)));

        let state = session.snapshot();
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.results[0].filename, "b.png");
        assert!(!state.processing);
        assert_eq!(state.progress, 0);
        assert_eq!(state.status, "");
        assert_eq!(state.phase, SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_image_keeps_idle() {
        let session = session(MockEngine::new());
        let mut rx = session.subscribe();

        let outcome = session
            .process_files(vec![ImageFile::new("notes.txt", "text/plain", b"hi".to_vec())])
            .await;

        assert_eq!(outcome, SessionOutcome::NoImage);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(session.snapshot(), SessionState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_resets_state() {
        let session = session(MockEngine::new().failing_inference());

        let outcome = session.process_files(vec![png_file("a.png")]).await;

        let SessionOutcome::Failed(message) = outcome else {
            panic!("expected failure");
        };
        assert!(message.starts_with("Failed to remove background: "));
        let state = session.snapshot();
        assert!(state.results.is_empty());
        assert!(!state.processing);
        assert_eq!(state.progress, 0);
        assert_eq!(state.status, "");
        assert_eq!(state.last_error.as_deref(), Some(message.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_failure_continues() {
        let engine = Arc::new(MockEngine::new().failing_preload(1));
        let remover = BackgroundRemover::new(engine.clone(), RemovalConfig::default());
        let session = ProcessingSession::new(Arc::new(remover), SessionConfig::default());

        let outcome = session.process_files(vec![png_file("a.png")]).await;

        assert!(matches!(outcome, SessionOutcome::Completed(_)));
        assert_eq!(engine.preload_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all() {
        let session = session(MockEngine::new());
        session.process_files(vec![png_file("a.png")]).await;
        session.clear_all();
        assert!(session.snapshot().results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_future_resets_state() {
        let session = session(MockEngine::new().with_inference_delay(Duration::from_secs(5)));

        let run = session.process_files(vec![png_file("a.png")]);
        let timed_out = tokio::time::timeout(Duration::from_millis(100), run).await;
        assert!(timed_out.is_err());

        let state = session.snapshot();
        assert!(!state.processing);
        assert_eq!(state.progress, 0);
        assert!(state.results.is_empty());
        assert!(matches!(
            session.process_files(vec![]).await,
            SessionOutcome::NoImage
        ));
    }
}
