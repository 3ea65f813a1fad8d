//! Shared services used by the adapter, session and exporter

pub mod format;
pub mod io;
pub mod progress;

pub use format::OutputFormatHandler;
pub use io::{ImageFile, ImageIOService, UNKNOWN_MIME};
pub use progress::{
    FnProgressReporter, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
