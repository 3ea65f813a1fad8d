//! Model weight cache
//!
//! Downloaded model repositories live under a per-user cache directory,
//! one subdirectory per model id:
//!
//! ```text
//! <cache>/nobg/models/imgly--isnet-general-onnx/
//!     config.json
//!     preprocessor_config.json
//!     onnx/model_fp16.onnx
//! ```

use crate::error::{NoBgError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "NOBG_CACHE_DIR";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (derived from URL)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Available ONNX variants (fp16, fp32)
    pub variants: Vec<String>,
    /// Size of the model directory in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the default cache, creating it if needed
    ///
    /// Location: `$NOBG_CACHE_DIR/models` when set, otherwise the
    /// platform cache directory (`~/.cache/nobg/models` on Linux).
    ///
    /// # Errors
    /// - No cache directory can be determined
    /// - Directory cannot be created
    pub fn new() -> Result<Self> {
        let cache_dir = Self::default_cache_dir()?;
        Self::open(cache_dir)
    }

    /// Open a cache rooted at a custom directory
    ///
    /// # Errors
    /// - Directory cannot be created
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        Self::open(cache_dir.join("models"))
    }

    fn open(cache_dir: PathBuf) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)
                .map_err(|e| NoBgError::file_io_error("create cache directory", &cache_dir, &e))?;
        }
        Ok(Self { cache_dir })
    }

    fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                NoBgError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join("nobg")
            .join("models"))
    }

    /// Generate a filesystem-safe model id from a repository URL
    ///
    /// ```
    /// use nobg::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id("https://huggingface.co/imgly/isnet-general-onnx");
    /// assert_eq!(id, "imgly--isnet-general-onnx");
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if let Some(repo) = url.strip_prefix(prefix) {
            repo.trim_end_matches('/').replace('/', "--")
        } else {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let hash_string = format!("url-{:x}", hasher.finalize());
            hash_string.get(..16).unwrap_or(&hash_string).to_string()
        }
    }

    /// Relative path of the ONNX file for a variant
    #[must_use]
    pub fn variant_file(variant: &str) -> String {
        match variant {
            "fp32" => "onnx/model.onnx".to_string(),
            other => format!("onnx/model_{other}.onnx"),
        }
    }

    /// Whether the model directory holds the configs and the given variant
    #[must_use]
    pub fn is_variant_cached(&self, model_id: &str, variant: &str) -> bool {
        let model_path = self.get_model_path(model_id);
        model_path.join("preprocessor_config.json").exists()
            && model_path.join(Self::variant_file(variant)).exists()
    }

    /// Path to a model directory (may not exist)
    #[must_use]
    pub fn get_model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// List cached models, sorted by id
    ///
    /// # Errors
    /// - Cache directory cannot be read
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| NoBgError::file_io_error("read cache directory", &self.cache_dir, &e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() || !path.join("preprocessor_config.json").exists() {
                continue;
            }
            let Some(model_id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let variants = ["fp16", "fp32"]
                .into_iter()
                .filter(|variant| path.join(Self::variant_file(variant)).exists())
                .map(str::to_string)
                .collect();

            models.push(CachedModelInfo {
                model_id: model_id.to_string(),
                size_bytes: Self::directory_size(&path),
                path,
                variants,
            });
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    fn directory_size(dir: &Path) -> u64 {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|entry| {
                        let path = entry.path();
                        if path.is_dir() {
                            Self::directory_size(&path)
                        } else {
                            entry.metadata().map(|m| m.len()).unwrap_or(0)
                        }
                    })
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Remove every cached model, returning the removed ids
    ///
    /// # Errors
    /// - A model directory cannot be removed
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(removed);
        }

        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| NoBgError::file_io_error("read cache directory", &self.cache_dir, &e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let model_id = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string();
                log::info!("Removing cached model: {}", model_id);
                fs::remove_dir_all(&path)
                    .map_err(|e| NoBgError::file_io_error("remove cached model", &path, &e))?;
                removed.push(model_id);
            }
        }

        Ok(removed)
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Format a byte count for display
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS.get(unit_index).unwrap_or(&"B");
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_model(cache: &ModelCache, model_id: &str, variants: &[&str]) {
        let path = cache.get_model_path(model_id);
        fs::create_dir_all(path.join("onnx")).unwrap();
        fs::write(path.join("preprocessor_config.json"), "{}").unwrap();
        for variant in variants {
            fs::write(path.join(ModelCache::variant_file(variant)), b"onnx").unwrap();
        }
    }

    #[test]
    fn test_url_to_model_id() {
        assert_eq!(
            ModelCache::url_to_model_id("https://huggingface.co/imgly/isnet-general-onnx/"),
            "imgly--isnet-general-onnx"
        );
        let hashed = ModelCache::url_to_model_id("https://example.com/model");
        assert!(hashed.starts_with("url-"));
        assert_eq!(hashed.len(), 16);
    }

    #[test]
    fn test_variant_files() {
        assert_eq!(ModelCache::variant_file("fp16"), "onnx/model_fp16.onnx");
        assert_eq!(ModelCache::variant_file("fp32"), "onnx/model.onnx");
    }

    #[test]
    fn test_scan_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        fake_model(&cache, "b--model", &["fp32"]);
        fake_model(&cache, "a--model", &["fp16", "fp32"]);
        fs::create_dir_all(cache.get_model_path("not-a-model")).unwrap();

        let models = cache.scan_cached_models().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].model_id, "a--model");
        assert_eq!(models[0].variants, vec!["fp16", "fp32"]);
        assert!(models[0].size_bytes > 0);

        assert!(cache.is_variant_cached("a--model", "fp16"));
        assert!(!cache.is_variant_cached("b--model", "fp16"));

        let removed = cache.clear_all_models().unwrap();
        assert_eq!(removed.len(), 3);
        assert!(cache.scan_cached_models().unwrap().is_empty());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
