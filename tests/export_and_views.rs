//! End-to-end tests for intake, result views and export

mod common;

use common::{create_test_image_bytes, png_file, session, text_file};
use image::{GenericImageView, ImageFormat};
use nobg::{
    derive_filename, export_image, save_image, DataUrl, ImageIOService, MockEngine, OutputFormat,
    RecordingSink, Rejection, ResultsView, SessionOutcome, UploadMethod, UploadZone,
};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test(start_paused = true)]
async fn test_upload_process_download_workflow() {
    let sink = RecordingSink::new();
    let zone = UploadZone::new(Arc::new(sink.clone()));
    let session = session(Arc::new(MockEngine::new()));

    let file = zone
        .accept(
            vec![text_file("notes.txt"), png_file("portrait.png")],
            UploadMethod::DragDrop,
            session.is_processing(),
        )
        .unwrap();
    let SessionOutcome::Completed(result) = session.process_files(vec![file]).await else {
        panic!("expected completion");
    };

    let view = ResultsView::new(result, Arc::new(sink.clone()));
    let temp_dir = TempDir::new().unwrap();
    let mut written = Vec::new();
    for format in OutputFormat::ALL {
        written.push(view.download(format, temp_dir.path()).await.unwrap());
    }

    let names: Vec<String> = written
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["no-bg-portrait.png", "no-bg-portrait.jpg", "no-bg-portrait.webp"]
    );
    for path in &written {
        assert_eq!(image::open(path).unwrap().dimensions(), (32, 24));
    }

    view.process_new(&session);
    assert!(session.snapshot().results.is_empty());

    assert_eq!(
        sink.names(),
        vec![
            "image_uploaded",
            "image_result_viewed",
            "image_downloaded",
            "image_downloaded",
            "image_downloaded",
            "process_new_image_clicked",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_comparison_render_uses_slider() {
    let sink = RecordingSink::new();
    let session = session(Arc::new(MockEngine::new()));
    let SessionOutcome::Completed(result) = session.process_files(vec![png_file("a.png")]).await
    else {
        panic!("expected completion");
    };

    let mut view = ResultsView::new(result.clone(), Arc::new(sink.clone()));
    view.slider_mut().set_position(100.0);
    let canvas = view.render_comparison().unwrap();

    let original = result.original.decode_image().unwrap().to_rgba8();
    assert_eq!(canvas.dimensions(), original.dimensions());
    assert_eq!(canvas.get_pixel(0, 0), original.get_pixel(0, 0));
    assert_eq!(
        sink.names().iter().filter(|name| *name == "comparison_slider_used").count(),
        1
    );
}

#[test]
fn test_upload_rejections() {
    let zone = UploadZone::new(Arc::new(RecordingSink::new()));

    assert_eq!(
        zone.accept(vec![png_file("a.png")], UploadMethod::FilePicker, true)
            .unwrap_err(),
        Rejection::Busy
    );
    assert!(matches!(
        zone.accept(vec![text_file("a.txt")], UploadMethod::FilePicker, false),
        Err(Rejection::Unsupported(_))
    ));
}

#[tokio::test]
async fn test_read_file_then_export() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("holiday.photo.jpeg");
    std::fs::write(&input, create_test_image_bytes(16, 16, ImageFormat::Jpeg)).unwrap();

    let file = ImageIOService::read_file(&input).await.unwrap();
    assert_eq!(file.mime(), "image/jpeg");

    let path = save_image(
        &file.to_data_url(),
        file.name(),
        OutputFormat::WebP,
        temp_dir.path().join("out"),
    )
    .await
    .unwrap();
    assert_eq!(path.file_name().unwrap(), "no-bg-holiday.photo.webp");
}

#[test]
fn test_export_errors_are_returned() {
    let data_url = DataUrl::new("image/png", vec![0x89, 0x50, 0x4E, 0x47]);
    assert!(export_image(&data_url, "x.png", OutputFormat::Jpeg).is_err());
    assert!("data:image/png,plain".parse::<DataUrl>().is_err());
    assert_eq!(derive_filename("x", OutputFormat::Jpeg), "no-bg-x.jpg");
}
