//! ONNX Runtime segmentation engine
//!
//! Fetches a `HuggingFace` model repository into the local cache, builds one
//! ONNX Runtime session per (model, variant) and runs inference on the
//! blocking thread pool.

use super::{
    preprocessing::{ImagePreprocessor, PreprocessingConfig},
    ByteProgress, EngineConfig, EngineInput, EngineOutput, SegmentationEngine,
};
use crate::{
    cache::ModelCache,
    download::ModelDownloader,
    error::{NoBgError, Result},
    services::OutputFormatHandler,
};
use async_trait::async_trait;
use image::DynamicImage;
use ndarray::{Array4, Ix4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::sync::{Arc, Mutex};

struct LoadedModel {
    model: String,
    variant: String,
    session: Arc<Mutex<Session>>,
    preprocessing: PreprocessingConfig,
}

/// Engine backed by ONNX Runtime
pub struct OnnxEngine {
    downloader: ModelDownloader,
    loaded: tokio::sync::Mutex<Option<LoadedModel>>,
}

impl std::fmt::Debug for OnnxEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEngine")
            .field("cache_dir", &self.downloader.cache().cache_dir())
            .finish_non_exhaustive()
    }
}

impl OnnxEngine {
    /// Create an engine using the default model cache
    ///
    /// # Errors
    /// - Cache directory or HTTP client cannot be created
    pub fn new() -> Result<Self> {
        Ok(Self::with_downloader(ModelDownloader::new()?))
    }

    #[must_use]
    pub fn with_downloader(downloader: ModelDownloader) -> Self {
        Self {
            downloader,
            loaded: tokio::sync::Mutex::new(None),
        }
    }

    /// Model cache this engine reads from
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        self.downloader.cache()
    }

    /// Load the model into `slot` unless the same model is already there
    async fn ensure_loaded(
        &self,
        slot: &mut Option<LoadedModel>,
        config: &EngineConfig,
        progress: Option<ByteProgress>,
    ) -> Result<()> {
        if let Some(loaded) = slot.as_ref() {
            if loaded.model == config.model && loaded.variant == config.variant {
                return Ok(());
            }
        }

        let model_dir = self
            .downloader
            .ensure_model(&config.model, &config.variant, progress)
            .await?;

        let preprocessor_path = model_dir.join("preprocessor_config.json");
        let preprocessor_content = tokio::fs::read_to_string(&preprocessor_path)
            .await
            .map_err(|e| {
                NoBgError::file_io_error("read preprocessor_config.json", &preprocessor_path, &e)
            })?;
        let preprocessing = PreprocessingConfig::from_huggingface_json(&preprocessor_content)?;

        let model_path = model_dir.join(ModelCache::variant_file(&config.variant));
        let model_data = tokio::fs::read(&model_path)
            .await
            .map_err(|e| NoBgError::file_io_error("read model file", &model_path, &e))?;

        let load_start = instant::Instant::now();
        let session = tokio::task::spawn_blocking(move || Self::build_session(&model_data))
            .await
            .map_err(|e| NoBgError::internal(format!("Model loading task failed: {e}")))??;

        log::info!(
            "📊 Model loading complete: {}ms ({} {}, input {}px)",
            load_start.elapsed().as_millis(),
            config.model,
            config.variant,
            preprocessing.target_size
        );

        *slot = Some(LoadedModel {
            model: config.model.clone(),
            variant: config.variant.clone(),
            session: Arc::new(Mutex::new(session)),
            preprocessing,
        });
        Ok(())
    }

    fn build_session(model_data: &[u8]) -> Result<Session> {
        let intra_threads = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);

        Session::builder()
            .map_err(|e| NoBgError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| NoBgError::inference(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| NoBgError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(model_data)
            .map_err(|e| {
                NoBgError::inference(format!("Failed to create session from model data: {e}"))
            })
    }

    fn infer(session: &Mutex<Session>, input: Array4<f32>) -> Result<Array4<f32>> {
        let mut session = session
            .lock()
            .map_err(|_| NoBgError::internal("ONNX session lock poisoned"))?;

        let input_value = Value::from_array(input)
            .map_err(|e| NoBgError::inference(format!("Failed to convert input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| NoBgError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| NoBgError::inference("No output tensors found"))?
            .to_string();

        let output_tensor = outputs
            .get(first_key.as_str())
            .ok_or_else(|| NoBgError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| NoBgError::inference(format!("Failed to extract output tensor: {e}")))?;

        output_tensor
            .to_owned()
            .into_dimensionality::<Ix4>()
            .map_err(|e| NoBgError::inference(format!("Expected 4D output tensor: {e}")))
    }
}

#[async_trait]
impl SegmentationEngine for OnnxEngine {
    async fn preload(&self, config: &EngineConfig, progress: Option<ByteProgress>) -> Result<()> {
        let mut slot = self.loaded.lock().await;
        self.ensure_loaded(&mut slot, config, progress).await
    }

    async fn remove_background(
        &self,
        input: EngineInput,
        config: &EngineConfig,
    ) -> Result<EngineOutput> {
        let (session, preprocessing) = {
            let mut slot = self.loaded.lock().await;
            self.ensure_loaded(&mut slot, config, None).await?;
            let loaded = slot
                .as_ref()
                .ok_or_else(|| NoBgError::internal("Model missing after load"))?;
            (loaded.session.clone(), loaded.preprocessing.clone())
        };

        let image = input.to_image()?;
        let debug = config.debug;

        let cut_out = tokio::task::spawn_blocking(move || -> Result<DynamicImage> {
            let start = instant::Instant::now();
            let (letterbox, tensor) = ImagePreprocessor::preprocess(&image, &preprocessing);
            let mask = Self::infer(&session, tensor)?;
            let result = ImagePreprocessor::apply_mask(&image, &mask, &letterbox)?;
            if debug {
                log::debug!(
                    "Segmented {}x{} image in {}ms",
                    image.width(),
                    image.height(),
                    start.elapsed().as_millis()
                );
            }
            Ok(DynamicImage::ImageRgba8(result))
        })
        .await
        .map_err(|e| NoBgError::internal(format!("Inference task failed: {e}")))??;

        let bytes =
            OutputFormatHandler::encode(&cut_out, config.output_format, config.output_quality)?;
        Ok(EngineOutput::Blob {
            mime: config.output_format.mime_type().to_string(),
            bytes,
        })
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
