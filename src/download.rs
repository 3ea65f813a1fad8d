//! Model downloading from `HuggingFace` repositories
//!
//! Files are streamed into a temporary directory and moved into the cache
//! once every file of the requested variant has arrived.

use crate::cache::ModelCache;
use crate::engine::ByteProgress;
use crate::error::{NoBgError, Result};
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

const HUGGINGFACE_PREFIX: &str = "https://huggingface.co/";

/// Configuration files fetched with every variant
const REQUIRED_FILES: &[&str] = &["config.json", "preprocessor_config.json"];

/// Model downloader with byte-level progress
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader for the default cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to open the model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader for a given cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| NoBgError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Make sure a model variant is in the cache, downloading it if needed
    ///
    /// Progress is reported per file, keyed by the file's relative path.
    /// Files already in the cache report a single completed step.
    ///
    /// # Errors
    /// - Invalid or unsupported URL
    /// - Network errors during download
    /// - File system errors while caching
    pub async fn ensure_model(
        &self,
        url: &str,
        variant: &str,
        progress: Option<ByteProgress>,
    ) -> Result<PathBuf> {
        validate_model_url(url)?;
        let model_id = ModelCache::url_to_model_id(url);
        let final_dir = self.cache.get_model_path(&model_id);
        let variant_file = ModelCache::variant_file(variant);

        if self.cache.is_variant_cached(&model_id, variant) {
            log::debug!("Model already cached: {} ({})", model_id, variant);
            if let Some(callback) = &progress {
                for file in Self::download_order(&variant_file) {
                    let size = fs::metadata(final_dir.join(file)).map_or(0, |m| m.len());
                    callback(file, size, size);
                }
            }
            return Ok(final_dir);
        }

        log::info!("Downloading model {} ({}) from {}", model_id, variant, url);
        let temp_dir = Self::create_temp_download_dir(&model_id, variant)?;

        let raw_base = format!("{}/resolve/main/", url.trim_end_matches('/'));
        let files = Self::download_order(&variant_file);

        for file in &files {
            let file_url = format!("{raw_base}{file}");
            if let Err(e) = self
                .download_file(&file_url, file, &temp_dir.join(file), progress.as_ref())
                .await
            {
                if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                    log::warn!("Failed to cleanup temp directory: {}", cleanup_err);
                }
                return Err(e);
            }
        }

        Self::merge_into_cache(&temp_dir, &final_dir, &files)?;
        log::info!("Cached model {} ({})", model_id, variant);
        Ok(final_dir)
    }

    /// Model weights first, so their size dominates aggregated progress
    /// before the small configuration files are seen
    fn download_order(variant_file: &str) -> Vec<&str> {
        std::iter::once(variant_file)
            .chain(REQUIRED_FILES.iter().copied())
            .collect()
    }

    fn create_temp_download_dir(model_id: &str, variant: &str) -> Result<PathBuf> {
        let temp_dir = std::env::temp_dir().join(format!("nobg-{model_id}-{variant}"));

        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                NoBgError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }
        fs::create_dir_all(&temp_dir)
            .map_err(|e| NoBgError::file_io_error("create temp directory", &temp_dir, &e))?;

        Ok(temp_dir)
    }

    /// Move downloaded files into the model directory
    ///
    /// Other variants already in the directory are kept.
    fn merge_into_cache(temp_dir: &Path, final_dir: &Path, files: &[&str]) -> Result<()> {
        for file in files {
            let source = temp_dir.join(file);
            let target = final_dir.join(file);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| NoBgError::file_io_error("create directory", parent, &e))?;
            }
            if fs::rename(&source, &target).is_err() {
                // rename fails across filesystems
                fs::copy(&source, &target)
                    .map_err(|e| NoBgError::file_io_error("move downloaded file", &target, &e))?;
            }
        }

        if let Err(e) = fs::remove_dir_all(temp_dir) {
            log::debug!("Failed to remove temp directory {}: {}", temp_dir.display(), e);
        }
        Ok(())
    }

    async fn download_file(
        &self,
        url: &str,
        key: &str,
        local_path: &Path,
        progress: Option<&ByteProgress>,
    ) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| NoBgError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NoBgError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(NoBgError::network_error(
                format!("HTTP error for {url}"),
                response.status(),
            ));
        }

        let total_size = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| NoBgError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| NoBgError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| NoBgError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            if let Some(callback) = progress {
                callback(key, downloaded, total_size.max(downloaded));
            }
        }

        file.flush()
            .await
            .map_err(|e| NoBgError::file_io_error("flush file", local_path, &e))?;

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(())
    }

    /// Model cache used by this downloader
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Validate that a URL points at a `HuggingFace` repository
///
/// # Errors
/// - Empty URL, wrong host or missing `user/repo` path
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(NoBgError::invalid_config("Model URL cannot be empty"));
    }

    let repo_path = url.strip_prefix(HUGGINGFACE_PREFIX).ok_or_else(|| {
        NoBgError::invalid_config(format!(
            "Unsupported URL format: {url}. Only HuggingFace repositories are supported ({HUGGINGFACE_PREFIX}...)"
        ))
    })?;

    let mut parts = repo_path.split('/').filter(|part| !part.is_empty());
    if parts.next().is_none() || parts.next().is_none() {
        return Err(NoBgError::invalid_config(format!(
            "Invalid HuggingFace repository URL: {url}. Expected format: {HUGGINGFACE_PREFIX}username/repo-name"
        )));
    }

    Ok(())
}
