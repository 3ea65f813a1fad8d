//! Error types for background removal, export and session operations

use thiserror::Error;

/// Result type alias for nobg operations
pub type Result<T> = std::result::Result<T, NoBgError>;

/// Error types produced by the library
#[derive(Error, Debug)]
pub enum NoBgError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Network errors while fetching model files or sending analytics
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unsupported file or output format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Malformed data URL
    #[error("Invalid data URL: {0}")]
    DataUrl(String),

    /// Model fetching or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Segmentation engine errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Processing errors inside a pipeline stage
    #[error("Processing error: {0}")]
    Processing(String),

    /// Uniform error surfaced by the background-removal adapter
    #[error("Failed to remove background: {0}")]
    Removal(String),

    /// Export (re-encode and save) errors
    #[error("Export failed: {0}")]
    Export(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NoBgError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new data URL error
    pub fn data_url<S: Into<String>>(msg: S) -> Self {
        Self::DataUrl(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new export error
    pub fn export<S: Into<String>>(msg: S) -> Self {
        Self::Export(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap any failure into the adapter's uniform removal error.
    ///
    /// An error that is already a `Removal` is passed through so the prefix
    /// never appears twice.
    #[must_use]
    pub fn removal(cause: Self) -> Self {
        match cause {
            Self::Removal(_) => cause,
            other => Self::Removal(other.to_string()),
        }
    }

    /// Create network error with a context message
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = NoBgError::invalid_config("bands out of order");
        assert_eq!(err.to_string(), "Invalid configuration: bands out of order");
    }

    #[test]
    fn test_removal_prefix() {
        let err = NoBgError::removal(NoBgError::inference("session crashed"));
        assert_eq!(
            err.to_string(),
            "Failed to remove background: Inference error: session crashed"
        );
    }

    #[test]
    fn test_removal_is_not_wrapped_twice() {
        let inner = NoBgError::Removal("boom".to_string());
        let err = NoBgError::removal(inner);
        assert_eq!(err.to_string(), "Failed to remove background: boom");
    }

    #[test]
    fn test_contextual_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = NoBgError::file_io_error("write export", Path::new("/out/no-bg-a.png"), &io_error);
        let message = err.to_string();
        assert!(message.contains("write export"));
        assert!(message.contains("/out/no-bg-a.png"));

        let err = NoBgError::config_value_error("quality", 150, "0-100");
        assert!(err.to_string().contains("150"));
        assert!(err.to_string().contains("0-100"));

        let err = NoBgError::processing_stage_error("reading", "empty file", Some("a.png"));
        assert!(err.to_string().contains("reading"));
        assert!(err.to_string().contains("a.png"));
    }
}
