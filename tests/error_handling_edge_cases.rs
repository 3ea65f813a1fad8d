//! Configuration validation and error edge cases

mod common;

use common::{png_file, remover};
use nobg::{
    normalize_output, BackgroundRemover, EngineOutput, MockBehavior, MockEngine, NobgConfig,
    ProcessingOptions, ProgressBands, RemovalConfig,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_unordered_bands_are_rejected() {
    let bands = ProgressBands {
        prepare: 80,
        analyze: 75,
        ..ProgressBands::default()
    };
    let err = RemovalConfig::builder().bands(bands).build().unwrap_err();
    assert!(err.to_string().contains("Progress bands"));

    let json = r#"{"removal": {"bands": {"load_end": 90, "prepare": 70}}}"#;
    assert!(NobgConfig::from_json_str(json).is_err());
}

#[test]
fn test_config_file_defaults() {
    let config = NobgConfig::from_json_str("{}").unwrap();
    assert_eq!(config, NobgConfig::default());
    assert_eq!(config.session.settle_delay_ms, 500);
    assert_eq!(config.removal.finalize_hold_ms, 300);
    assert_eq!(config.removal.complete_hold_ms, 200);
    assert!(!config.analytics.enabled);

    assert!(NobgConfig::from_json_str("{not json").is_err());
    assert!(NobgConfig::from_json_str(r#"{"removal": {"model_variant": "int8"}}"#).is_err());
}

#[test]
fn test_custom_bands_drive_progress() {
    let bands = ProgressBands {
        load_start: 10,
        load_end: 40,
        prepare: 50,
        analyze: 60,
        finalize: 90,
    };
    assert!(bands.validate().is_ok());
    assert_eq!(bands.map_load(0, 10), 10);
    assert_eq!(bands.map_load(5, 10), 25);
    assert_eq!(bands.map_load(10, 10), 40);
    assert_eq!(bands.map_load(3, 0), 10);
}

#[test]
fn test_pixel_buffer_length_mismatch() {
    let err = normalize_output(EngineOutput::Pixels {
        width: 2,
        height: 2,
        data: vec![0; 15],
    })
    .unwrap_err();
    assert!(err.to_string().contains("Pixel buffer"));

    assert!(normalize_output(EngineOutput::Blob {
        mime: "image/png".into(),
        bytes: Vec::new(),
    })
    .is_err());
}

#[tokio::test(start_paused = true)]
async fn test_truncated_pixels_surface_as_removal_error() {
    let engine = Arc::new(MockEngine::new().with_behavior(MockBehavior::TruncatedPixels));
    let err = remover(engine)
        .process(&png_file("a.png"), &ProcessingOptions::new())
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to remove background: "));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_preloads_share_one_load() {
    let engine = Arc::new(MockEngine::new().with_preload_delay(Duration::from_millis(100)));
    let remover = BackgroundRemover::new(engine.clone(), RemovalConfig::default());

    let (a, b, c) = tokio::join!(remover.preload(), remover.preload(), remover.preload());

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(engine.preload_calls(), 1);
    assert!(remover.is_preloaded());
}

#[tokio::test(start_paused = true)]
async fn test_preload_error_is_unchanged_and_retried() {
    let engine = Arc::new(MockEngine::new().failing_preload(1));
    let remover = BackgroundRemover::new(engine.clone(), RemovalConfig::default());

    let err = remover.preload().await.unwrap_err();
    assert_eq!(err.to_string(), "Model error: Mock model download failed");
    assert!(!remover.is_preloaded());

    remover.preload().await.unwrap();
    assert_eq!(engine.preload_calls(), 2);
}
