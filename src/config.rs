//! Configuration types for background removal, sessions and analytics

use crate::error::{NoBgError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default model repository (`ISNet` general purpose)
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/imgly/isnet-general-onnx";

/// Project tag attached to every analytics event
pub const DEFAULT_ANALYTICS_PROJECT: &str = "remove-bg";

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency)
    #[serde(alias = "jpg")]
    Jpeg,
    /// WebP with alpha channel transparency
    WebP,
}

impl OutputFormat {
    /// All formats offered as download actions, in display order
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Png, OutputFormat::Jpeg, OutputFormat::WebP];

    /// MIME type used in data URLs
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// File extension (without the dot) used for exported files
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Look up a format from a MIME type
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Matching `image` crate format
    #[must_use]
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::WebP => write!(f, "webp"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = NoBgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            other => Err(NoBgError::unsupported_format(format!(
                "{other} (expected png, jpeg or webp)"
            ))),
        }
    }
}

/// Percentage bands used by the adapter when reporting progress.
///
/// The defaults assume model loading dominates the cost of a first run.
/// They are hand-tuned, not measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressBands {
    /// First value of the model loading band
    pub load_start: u8,
    /// Last value of the model loading band
    pub load_end: u8,
    /// Value reported while the image is prepared
    pub prepare: u8,
    /// Value reported when inference starts
    pub analyze: u8,
    /// Value reported when the result is being finalized
    pub finalize: u8,
}

impl Default for ProgressBands {
    fn default() -> Self {
        Self {
            load_start: 0,
            load_end: 70,
            prepare: 70,
            analyze: 75,
            finalize: 95,
        }
    }
}

impl ProgressBands {
    /// Value reported once processing completes
    pub const COMPLETE: u8 = 100;

    /// Validate that the bands are ordered and stay within 0-100
    pub fn validate(&self) -> Result<()> {
        let ordered = self.load_start <= self.load_end
            && self.load_end <= self.prepare
            && self.prepare <= self.analyze
            && self.analyze <= self.finalize
            && self.finalize <= Self::COMPLETE;

        if ordered {
            Ok(())
        } else {
            Err(NoBgError::invalid_config(format!(
                "Progress bands must satisfy load_start <= load_end <= prepare <= analyze <= finalize <= 100, got {}/{}/{}/{}/{}",
                self.load_start, self.load_end, self.prepare, self.analyze, self.finalize
            )))
        }
    }

    /// Map a byte count linearly onto the model loading band
    #[must_use]
    pub fn map_load(&self, current: u64, total: u64) -> u8 {
        if total == 0 {
            return self.load_start;
        }
        let span = u64::from(self.load_end.saturating_sub(self.load_start));
        let offset = (current.min(total) * span + total / 2) / total;
        self.load_start.saturating_add(offset as u8).min(self.load_end)
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Model repository URL
    pub model_url: String,

    /// Model variant to fetch (fp16, fp32)
    pub model_variant: String,

    /// Enable debug mode (additional logging)
    pub debug: bool,

    /// Encoding the engine produces its result in
    pub output_format: OutputFormat,

    /// Engine output quality (0-100)
    pub output_quality: u8,

    /// Progress percentage bands
    pub bands: ProgressBands,

    /// Pause after reporting the finalize stage (milliseconds)
    pub finalize_hold_ms: u64,

    /// Pause after reporting completion (milliseconds)
    pub complete_hold_ms: u64,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_string(),
            model_variant: "fp16".to_string(),
            debug: false,
            output_format: OutputFormat::WebP,
            output_quality: 100,
            bands: ProgressBands::default(),
            finalize_hold_ms: 300,
            complete_hold_ms: 200,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.output_quality > 100 {
            return Err(NoBgError::config_value_error(
                "output quality",
                self.output_quality,
                "0-100",
            ));
        }
        if self.model_url.trim().is_empty() {
            return Err(NoBgError::invalid_config("Model URL cannot be empty"));
        }
        if !matches!(self.model_variant.as_str(), "fp16" | "fp32") {
            return Err(NoBgError::invalid_config(format!(
                "Unknown model variant '{}' (expected fp16 or fp32)",
                self.model_variant
            )));
        }
        self.bands.validate()
    }

    #[must_use]
    pub fn finalize_hold(&self) -> Duration {
        Duration::from_millis(self.finalize_hold_ms)
    }

    #[must_use]
    pub fn complete_hold(&self) -> Duration {
        Duration::from_millis(self.complete_hold_ms)
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.model_url = url.into();
        self
    }

    #[must_use]
    pub fn model_variant<S: Into<String>>(mut self, variant: S) -> Self {
        self.config.model_variant = variant.into();
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn output_quality(mut self, quality: u8) -> Self {
        self.config.output_quality = quality.clamp(0, 100);
        self
    }

    #[must_use]
    pub fn bands(mut self, bands: ProgressBands) -> Self {
        self.config.bands = bands;
        self
    }

    /// Set both holds at once
    #[must_use]
    pub fn holds(mut self, finalize: Duration, complete: Duration) -> Self {
        self.config.finalize_hold_ms = finalize.as_millis() as u64;
        self.config.complete_hold_ms = complete.as_millis() as u64;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Unordered progress bands
    /// - Empty model URL or unknown variant
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for a processing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause between completion and publishing the result (milliseconds)
    pub settle_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Configuration for the analytics event sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Send events at all
    pub enabled: bool,
    /// Capture endpoint; events are only logged when unset
    pub endpoint: Option<String>,
    /// API key sent with each event
    pub api_key: Option<String>,
    /// Project tag attached to every event
    pub project: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            project: DEFAULT_ANALYTICS_PROJECT.to_string(),
        }
    }
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NobgConfig {
    pub removal: RemovalConfig,
    pub session: SessionConfig,
    pub analytics: AnalyticsConfig,
}

impl NobgConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing sections and fields fall back to their defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON
    /// - Values fail validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .map_err(|e| NoBgError::file_io_error("read config file", path_ref, &e))?;
        Self::from_json_str(&content)
    }

    /// Parse configuration from a JSON string
    ///
    /// # Errors
    /// - Invalid JSON
    /// - Values fail validation
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| NoBgError::invalid_config(format!("Failed to parse config: {e}")))?;
        config.removal.validate()?;
        Ok(config)
    }
}
