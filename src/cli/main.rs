//! nobg CLI
//!
//! Command-line shell around the session: picks the image, shows progress,
//! writes the exports and the optional comparison image.

use super::config::CliConfigBuilder;
use crate::{
    adapter::BackgroundRemover,
    analytics::{sink_from_config, EventSink, UploadMethod},
    cache::{format_size, ModelCache, CACHE_DIR_ENV},
    download::{validate_model_url, ModelDownloader},
    engine::{ByteProgress, OnnxEngine},
    results::ResultsView,
    services::{ImageFile, ImageIOService},
    session::{ProcessingSession, SessionOutcome, SessionState},
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    upload::{Rejection, UploadZone},
    NobgConfig,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

/// How long to wait for analytics still in flight before exiting
const ANALYTICS_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Remove image backgrounds with an AI model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "nobg")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files; the first supported image is processed
    #[arg(value_name = "INPUT", required_unless_present_any = &["only_download", "clear_cache", "show_cache_dir"])]
    pub input: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Export format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Model repository URL [default: https://huggingface.co/imgly/isnet-general-onnx]
    #[arg(short, long)]
    pub model: Option<String>,

    /// Model variant (fp16, fp32) [default: fp16]
    #[arg(long)]
    pub variant: Option<String>,

    /// Also write a before/after comparison PNG to this path
    #[arg(long, value_name = "FILE")]
    pub compare: Option<PathBuf>,

    /// Divider position of the comparison image in percent
    #[arg(long, value_name = "N", default_value_t = 50.0)]
    pub slider: f32,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Send analytics events to this capture endpoint
    #[arg(long, value_name = "URL")]
    pub analytics_endpoint: Option<String>,

    /// Download the model but don't process any images
    #[arg(long)]
    pub only_download: bool,

    /// Show current cache directory
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Remove all cached models
    #[arg(long)]
    pub clear_cache: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
    /// One file per format
    All,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, TracingFormat::Console)
        .context("Failed to initialize tracing")?;

    if cli.show_cache_dir {
        return show_current_cache_dir();
    }

    if cli.clear_cache {
        return clear_cache_models();
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    if cli.only_download {
        return download_model_only(&config.removal.model_url, &config.removal.model_variant).await;
    }

    let span = spans::session(&session_id, &config.removal.model_url);
    process(&cli, &config).instrument(span).await
}

/// Process the inputs and write the requested outputs
async fn process(cli: &Cli, config: &NobgConfig) -> Result<()> {
    info!("Input(s): {}", display_inputs(&cli.input));

    let mut files = Vec::with_capacity(cli.input.len());
    for path in &cli.input {
        match ImageIOService::read_file(path).await {
            Ok(file) => files.push(file),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    let sink = sink_from_config(&config.analytics);
    let result = run(cli, config, files, sink.clone()).await;
    sink.flush(ANALYTICS_FLUSH_TIMEOUT).await;
    result
}

async fn run(
    cli: &Cli,
    config: &NobgConfig,
    files: Vec<ImageFile>,
    sink: Arc<dyn EventSink>,
) -> Result<()> {
    let engine = Arc::new(OnnxEngine::new().context("Failed to create ONNX engine")?);
    let remover = Arc::new(BackgroundRemover::new(engine, config.removal.clone()));
    let session = ProcessingSession::new(remover, config.session.clone());

    let zone = UploadZone::new(sink.clone());
    let file = zone
        .accept(files, UploadMethod::FilePicker, session.is_processing())
        .map_err(|rejection| match rejection {
            Rejection::Unsupported(_) => anyhow::anyhow!(
                "No image to process: {rejection} ({})",
                UploadZone::supported_formats_text()
            ),
            _ => anyhow::anyhow!("No image to process: {rejection}"),
        })?;

    let outcome = run_with_progress(&session, file).await;

    let result = match outcome {
        SessionOutcome::Completed(result) => result,
        SessionOutcome::Failed(message) => anyhow::bail!(message),
        SessionOutcome::NoImage => anyhow::bail!("No image among the inputs"),
        SessionOutcome::Busy => anyhow::bail!("Another image is already being processed"),
    };

    let mut view = ResultsView::new(result, sink);
    for format in CliConfigBuilder::export_formats(cli.format) {
        let path = view
            .download(format, &cli.output)
            .await
            .with_context(|| format!("Failed to export {format}"))?;
        println!("✅ Saved {}", path.display());
    }

    if let Some(compare_path) = &cli.compare {
        view.slider_mut().set_position(cli.slider);
        let canvas = view
            .render_comparison()
            .context("Failed to render comparison")?;
        if let Some(parent) = compare_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        canvas
            .save_with_format(compare_path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", compare_path.display()))?;
        println!("🔍 Comparison written to {}", compare_path.display());
    }

    println!("⏱️  {}", view.processing_time_text());
    Ok(())
}

fn display_inputs(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run the session while a progress bar follows its state
async fn run_with_progress(session: &ProcessingSession, file: ImageFile) -> SessionOutcome {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    bar.set_message(file.name().to_string());

    let render = tokio::spawn(follow_state(session.subscribe(), bar.clone()));
    let outcome = session.process_files(vec![file]).await;
    render.abort();

    match &outcome {
        SessionOutcome::Completed(_) => bar.finish_with_message("Complete!"),
        _ => bar.abandon(),
    }
    outcome
}

async fn follow_state(mut state: watch::Receiver<SessionState>, bar: ProgressBar) {
    while state.changed().await.is_ok() {
        let snapshot = state.borrow_and_update().clone();
        if !snapshot.processing {
            continue;
        }
        bar.set_position(u64::from(snapshot.progress));
        let message = if snapshot.status.is_empty() {
            UploadZone::progress_text(snapshot.progress)
        } else {
            snapshot.status
        };
        bar.set_message(message);
    }
}

/// Download model only without processing images
async fn download_model_only(model_url: &str, variant: &str) -> Result<()> {
    validate_model_url(model_url).context("Invalid model URL")?;

    println!("📦 Downloading model from: {}", model_url);

    let downloader = ModelDownloader::new().context("Failed to create model downloader")?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:30} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let progress_bar = bar.clone();
    let progress: ByteProgress = Arc::new(move |key: &str, current: u64, total: u64| {
        progress_bar.set_message(key.to_string());
        progress_bar.set_length(total);
        progress_bar.set_position(current);
    });

    let model_dir = downloader
        .ensure_model(model_url, variant, Some(progress))
        .await
        .context("Failed to download model")?;
    bar.finish_and_clear();

    println!("✅ Model ready ({variant})");
    println!("   Cache location: {}", model_dir.display());
    Ok(())
}

/// Clear cached models
fn clear_cache_models() -> Result<()> {
    let cache = ModelCache::new().context("Failed to create model cache")?;

    println!("🗑️  Clearing model cache...");
    let removed_models = cache
        .clear_all_models()
        .context("Failed to clear cache")?;

    if removed_models.is_empty() {
        println!("💡 Cache was already empty");
    } else {
        println!("✅ Removed {} model(s):", removed_models.len());
        for model_id in &removed_models {
            println!("   • {}", model_id);
        }
    }
    println!("   Cache location: {}", cache.cache_dir().display());

    Ok(())
}

/// Show the current cache directory and its models
fn show_current_cache_dir() -> Result<()> {
    let cache = ModelCache::new().context("Failed to access cache directory")?;

    println!("📁 Current cache directory:");
    println!("   Path: {}", cache.cache_dir().display());
    if std::env::var(CACHE_DIR_ENV).is_ok() {
        println!("   Source: {CACHE_DIR_ENV} environment variable");
    } else {
        println!("   Source: platform cache directory");
    }

    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;
    for model in models {
        println!(
            "   • {} [{}] {}",
            model.model_id,
            model.variants.join(", "),
            format_size(model.size_bytes)
        );
    }

    println!("\n💡 To use a custom cache directory set {CACHE_DIR_ENV}");
    Ok(())
}
