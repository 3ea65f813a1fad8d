//! Progress reporting service
//!
//! The adapter reports `(percent, label)` pairs through a `ProgressReporter`.
//! The session turns them into watch-channel state that frontends render.

use crate::config::ProgressBands;
use instant::Instant;
use std::sync::Arc;

/// Stages of a single background removal run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Fetching and initializing the model weights
    LoadingModel,
    /// Handing the image to the engine
    Preparing,
    /// Running segmentation
    Analyzing,
    /// Normalizing the engine output
    Finalizing,
    /// Result ready
    Complete,
}

impl ProcessingStage {
    /// Human-readable label shown next to the progress bar
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::LoadingModel => "Loading AI model…",
            ProcessingStage::Preparing => "Preparing image…",
            ProcessingStage::Analyzing => "Analyzing image…",
            ProcessingStage::Finalizing => "Finalizing result…",
            ProcessingStage::Complete => "Complete!",
        }
    }

    /// Lowest percentage this stage reports under the given bands
    #[must_use]
    pub fn progress_percentage(&self, bands: &ProgressBands) -> u8 {
        match self {
            ProcessingStage::LoadingModel => bands.load_start,
            ProcessingStage::Preparing => bands.prepare,
            ProcessingStage::Analyzing => bands.analyze,
            ProcessingStage::Finalizing => bands.finalize,
            ProcessingStage::Complete => ProgressBands::COMPLETE,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since the run started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, progress: u8, start_time: Instant) -> Self {
        Self {
            stage,
            progress,
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Trait for reporting progress during background removal
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report that the run finished
    fn report_completion(&self, total_ms: u64) {
        let _ = total_ms;
    }

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str) {
        let _ = (stage, error);
    }
}

/// Reporter that discards all updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}
}

/// Adapts a `(percent, label)` closure into a reporter
pub struct FnProgressReporter<F>(F);

impl<F> FnProgressReporter<F>
where
    F: Fn(u8, &str) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

impl<F> ProgressReporter for FnProgressReporter<F>
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report_progress(&self, update: ProgressUpdate) {
        (self.0)(update.progress, &update.description);
    }
}

/// Tracks timing and stage for one run and forwards updates to a reporter.
///
/// Values within a stage never go backwards: a lower value than the last one
/// reported for the same stage is raised to it.
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
    last_progress: u8,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
            last_progress: 0,
        }
    }

    /// Report a stage at an explicit percentage
    pub fn report(&mut self, stage: ProcessingStage, progress: u8) {
        let progress = if self.current_stage == Some(stage) {
            progress.max(self.last_progress)
        } else {
            progress
        };
        self.current_stage = Some(stage);
        self.last_progress = progress;
        self.reporter
            .report_progress(ProgressUpdate::new(stage, progress, self.start_time));
    }

    /// Report a stage at its band's fixed percentage
    pub fn report_stage(&mut self, stage: ProcessingStage, bands: &ProgressBands) {
        self.report(stage, stage.progress_percentage(bands));
    }

    /// Report completion of the run
    pub fn report_completion(&self) {
        self.reporter.report_completion(self.elapsed_ms());
    }

    /// Report an error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::LoadingModel);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }

    #[must_use]
    pub fn last_progress(&self) -> u8 {
        self.last_progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestProgressReporter {
        updates: Mutex<Vec<(u8, String)>>,
        errors: Mutex<Vec<(ProcessingStage, String)>>,
    }

    impl ProgressReporter for TestProgressReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.updates
                .lock()
                .unwrap()
                .push((update.progress, update.description));
        }

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(ProcessingStage::LoadingModel.description(), "Loading AI model…");
        assert_eq!(ProcessingStage::Complete.description(), "Complete!");
    }

    #[test]
    fn test_stage_percentages_follow_bands() {
        let bands = ProgressBands::default();
        assert_eq!(ProcessingStage::Preparing.progress_percentage(&bands), 70);
        assert_eq!(ProcessingStage::Analyzing.progress_percentage(&bands), 75);
        assert_eq!(ProcessingStage::Finalizing.progress_percentage(&bands), 95);
        assert_eq!(ProcessingStage::Complete.progress_percentage(&bands), 100);
    }

    #[test]
    fn test_tracker_clamps_within_stage() {
        let reporter = Arc::new(TestProgressReporter::default());
        let mut tracker = ProgressTracker::new(reporter.clone());

        tracker.report(ProcessingStage::LoadingModel, 40);
        tracker.report(ProcessingStage::LoadingModel, 10);
        tracker.report_stage(ProcessingStage::Preparing, &ProgressBands::default());

        let updates = reporter.updates.lock().unwrap().clone();
        let values: Vec<u8> = updates.iter().map(|(p, _)| *p).collect();
        assert_eq!(values, vec![40, 40, 70]);
        assert_eq!(updates[2].1, "Preparing image…");
    }

    #[test]
    fn test_tracker_error_uses_current_stage() {
        let reporter = Arc::new(TestProgressReporter::default());
        let mut tracker = ProgressTracker::new(reporter.clone());
        tracker.report_stage(ProcessingStage::Analyzing, &ProgressBands::default());
        tracker.report_error("engine crashed");

        let errors = reporter.errors.lock().unwrap();
        assert_eq!(errors[0].0, ProcessingStage::Analyzing);
    }

    #[test]
    fn test_fn_reporter() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = FnProgressReporter::new(move |p, label: &str| {
            sink.lock().unwrap().push(format!("{p}:{label}"));
        });
        reporter.report_progress(ProgressUpdate::new(
            ProcessingStage::Complete,
            100,
            Instant::now(),
        ));
        assert_eq!(seen.lock().unwrap()[0], "100:Complete!");
    }
}
