//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliOutputFormat};
use crate::{config::OutputFormat, download::validate_model_url, NobgConfig};
use anyhow::{Context, Result};

/// Convert CLI arguments to a [`NobgConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Load `--config` (or defaults) and apply flag overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<NobgConfig> {
        let mut config = match &cli.config {
            Some(path) => NobgConfig::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => NobgConfig::default(),
        };

        if let Some(model) = &cli.model {
            validate_model_url(model).context("Invalid model URL")?;
            config.removal.model_url = model.clone();
        }
        if let Some(variant) = &cli.variant {
            config.removal.model_variant = variant.clone();
        }
        if cli.verbose >= 2 {
            config.removal.debug = true;
        }
        if let Some(endpoint) = &cli.analytics_endpoint {
            config.analytics.enabled = true;
            config.analytics.endpoint = Some(endpoint.clone());
        }

        if !(0.0..=100.0).contains(&cli.slider) {
            anyhow::bail!("--slider must be between 0 and 100, got {}", cli.slider);
        }

        config.removal.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Formats to export for a `--format` choice
    pub(crate) fn export_formats(format: CliOutputFormat) -> Vec<OutputFormat> {
        match format {
            CliOutputFormat::Png => vec![OutputFormat::Png],
            CliOutputFormat::Jpeg => vec![OutputFormat::Jpeg],
            CliOutputFormat::Webp => vec![OutputFormat::WebP],
            CliOutputFormat::All => OutputFormat::ALL.to_vec(),
        }
    }
}
