//! Local slide source integration tests.
//!
//! Tests verify:
//! - Slide discovery below a root directory
//! - Opening and reading containers from real files
//! - Serving tiles from disk through the router

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use dpt_streamer::server::SlidesResponse;
use dpt_streamer::slide::{LocalSlideSource, Slide, SlideRegistry, SlideSource};
use dpt_streamer::tile::{TileRequest, TileService};
use dpt_streamer::{create_router, IoError, LocalFileReader, RegionRequest, RouterConfig};

use super::test_utils::{decode_jpeg, flat_slide, gradient_slide, is_valid_jpeg, DptBuilder};

fn write_slide(dir: &std::path::Path, name: &str, data: Vec<u8>) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, data).unwrap();
}

#[tokio::test]
async fn test_list_slides_recurses_and_filters() {
    let dir = tempfile::tempdir().unwrap();
    write_slide(dir.path(), "b.dpt", flat_slide([0, 0, 0]));
    write_slide(dir.path(), "nested/a.dpt", flat_slide([0, 0, 0]));
    write_slide(dir.path(), "notes.txt", b"not a slide".to_vec());

    let source = LocalSlideSource::new(dir.path());
    let slides = source.list_slides().await.unwrap();

    assert_eq!(slides, vec!["b.dpt", "nested/a.dpt"]);
}

#[tokio::test]
async fn test_missing_root_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = LocalSlideSource::new(dir.path().join("missing"));

    assert!(source.list_slides().await.is_err());
}

#[tokio::test]
async fn test_create_reader_for_missing_slide() {
    let dir = tempfile::tempdir().unwrap();
    let source = LocalSlideSource::new(dir.path());

    let result = source.create_reader("absent.dpt").await;
    assert!(matches!(result, Err(IoError::NotFound(_))));

    let result = source.create_reader("../escape.dpt").await;
    assert!(matches!(result, Err(IoError::NotFound(_))));
}

#[tokio::test]
async fn test_read_region_from_file() {
    let dir = tempfile::tempdir().unwrap();
    DptBuilder::new(128, 128, 32)
        .grid(3, 3, |_, x, y| image::Rgb([x as u8, y as u8, 128]))
        .write_to(dir.path(), "file.dpt");

    let reader = LocalFileReader::new(dir.path().join("file.dpt"))
        .await
        .unwrap();
    let slide = Slide::open(reader).await.unwrap();
    assert_eq!(slide.dimensions(), (320, 320));

    let region = slide
        .read_region(RegionRequest::new(64, 64, 192, 192, 0))
        .await
        .unwrap();
    assert_eq!(region.image.dimensions(), (192, 192));
    assert_eq!(region.placeholders, 0);
}

#[tokio::test]
async fn test_tile_service_over_local_files() {
    let dir = tempfile::tempdir().unwrap();
    write_slide(dir.path(), "grad.dpt", gradient_slide());

    let registry = SlideRegistry::new(LocalSlideSource::new(dir.path()));
    let service = TileService::new(registry);

    let tile = service
        .get_tile(TileRequest::new("grad.dpt", 0, 0, 0))
        .await
        .unwrap();
    assert!(is_valid_jpeg(&tile.data));

    // Default output tiles are 512px, padded past the 320px slide
    assert_eq!(decode_jpeg(&tile.data).dimensions(), (512, 512));
}

#[tokio::test]
async fn test_router_over_local_files() {
    let dir = tempfile::tempdir().unwrap();
    write_slide(dir.path(), "grad.dpt", gradient_slide());
    write_slide(dir.path(), "nested/flat.dpt", flat_slide([90, 90, 90]));

    let registry = SlideRegistry::new(LocalSlideSource::new(dir.path()));
    let router = create_router(
        TileService::new(registry),
        RouterConfig::new().with_tracing(false),
    );

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/slides").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let listing: SlidesResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing.slides, vec!["grad.dpt", "nested/flat.dpt"]);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/tiles/grad.dpt/1/0/0.jpg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Nested ids are addressed with an encoded separator
    let response = router
        .oneshot(
            Request::builder()
                .uri("/slides/nested%2Fflat.dpt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
