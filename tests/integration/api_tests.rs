//! API integration tests for tile retrieval, metadata and error handling.
//!
//! Tests verify:
//! - Tile retrieval, headers and output size at slide edges
//! - Slide listing and metadata
//! - Error cases (missing slide, invalid layer, bad row, unreadable container)

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use dpt_streamer::server::{HealthResponse, SlideMetadataResponse, SlidesResponse};
use dpt_streamer::slide::SlideRegistry;
use dpt_streamer::tile::{TileService, TileServiceOptions};
use dpt_streamer::{create_router, RouterConfig, PLACEHOLDER_COLOR};

use super::test_utils::{decode_jpeg, flat_slide, is_valid_jpeg, MockSlideSource};

fn test_router(source: MockSlideSource, tile_size: u32) -> Router {
    let registry = SlideRegistry::new(source);
    let options = TileServiceOptions {
        tile_size,
        ..TileServiceOptions::default()
    };
    let tile_service = TileService::with_options(std::sync::Arc::new(registry), options);
    create_router(tile_service, RouterConfig::new().with_tracing(false))
}

fn flat_router() -> Router {
    let source = MockSlideSource::new().with_slide("flat.dpt", flat_slide([40, 90, 160]));
    test_router(source, 64)
}

async fn get(router: &Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn error_type(response: axum::response::Response) -> String {
    let body = body_bytes(response).await;
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    error["error"].as_str().unwrap().to_string()
}

// =============================================================================
// Basic Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let router = flat_router();

    let response = get(&router, "/tiles/flat.dpt/0/0/0.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/jpeg"
    );
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "false");

    let body = body_bytes(response).await;
    assert!(is_valid_jpeg(&body), "Response should be a valid JPEG");
    assert_eq!(decode_jpeg(&body).dimensions(), (64, 64));
}

#[tokio::test]
async fn test_tile_retrieval_without_jpg_extension() {
    let router = flat_router();

    let response = get(&router, "/tiles/flat.dpt/0/0/0").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_second_request_reports_cache_hit() {
    let router = flat_router();

    let first = get(&router, "/tiles/flat.dpt/0/0/0.jpg").await;
    assert_eq!(first.headers().get("x-tile-cache-hit").unwrap(), "false");
    let first_body = body_bytes(first).await;

    let second = get(&router, "/tiles/flat.dpt/0/0/0.jpg").await;
    assert_eq!(second.headers().get("x-tile-cache-hit").unwrap(), "true");
    let second_body = body_bytes(second).await;

    assert_eq!(first_body, second_body);
}

#[tokio::test]
async fn test_edge_tile_is_padded_to_full_size() {
    let router = flat_router();

    // Column 1 starts at x=64 on a 112px slide, so only 48 columns are real
    let response = get(&router, "/tiles/flat.dpt/0/0/1.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);

    let tile = decode_jpeg(&body_bytes(response).await);
    assert_eq!(tile.dimensions(), (64, 64));

    let padding = tile.get_pixel(60, 32);
    for c in 0..3 {
        assert!(
            (padding[c] as i32 - PLACEHOLDER_COLOR[c] as i32).abs() <= 6,
            "padding channel {} was {}",
            c,
            padding[c]
        );
    }
}

#[tokio::test]
async fn test_lower_layer_tile() {
    let router = flat_router();

    let response = get(&router, "/tiles/flat.dpt/2/0/0.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);

    let tile = decode_jpeg(&body_bytes(response).await);
    assert_eq!(tile.dimensions(), (64, 64));
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let source = MockSlideSource::new().with_slide("flat.dpt", flat_slide([10, 10, 10]));
    let registry = SlideRegistry::new(source);
    let router = create_router(
        TileService::new(registry),
        RouterConfig::new().with_tracing(false).with_cache_max_age(60),
    );

    let response = get(&router, "/tiles/flat.dpt/0/0/0.jpg").await;
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=60"
    );
}

// =============================================================================
// Error Cases
// =============================================================================

#[tokio::test]
async fn test_missing_slide_returns_404() {
    let router = flat_router();

    let response = get(&router, "/tiles/nope.dpt/0/0/0.jpg").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_type(response).await, "not_found");
}

#[tokio::test]
async fn test_invalid_layer_returns_400() {
    let router = flat_router();

    let response = get(&router, "/tiles/flat.dpt/3/0/0.jpg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(response).await, "invalid_layer");
}

#[tokio::test]
async fn test_invalid_row_returns_400() {
    let router = flat_router();

    let response = get(&router, "/tiles/flat.dpt/0/0/abc.jpg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(response).await, "invalid_argument");
}

#[tokio::test]
async fn test_bad_magic_returns_415() {
    let mut garbage = b"NOTDPT".to_vec();
    garbage.resize(256, 0);
    let source = MockSlideSource::new().with_slide("garbage.dpt", garbage);
    let router = test_router(source, 64);

    let response = get(&router, "/tiles/garbage.dpt/0/0/0.jpg").await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(error_type(response).await, "unsupported_format");
}

#[tokio::test]
async fn test_truncated_container_returns_415() {
    let mut data = flat_slide([0, 0, 0]);
    data.truncate(40);
    let source = MockSlideSource::new().with_slide("short.dpt", data);
    let router = test_router(source, 64);

    let response = get(&router, "/slides/short.dpt").await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

// =============================================================================
// Health, Listing and Metadata
// =============================================================================

#[tokio::test]
async fn test_health() {
    let router = flat_router();

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.version.is_empty());
}

#[tokio::test]
async fn test_slides_listing() {
    let source = MockSlideSource::new()
        .with_slide("b.dpt", flat_slide([0, 0, 0]))
        .with_slide("a.dpt", flat_slide([0, 0, 0]));
    let router = test_router(source, 64);

    let response = get(&router, "/slides").await;
    assert_eq!(response.status(), StatusCode::OK);

    let listing: SlidesResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(listing.slides, vec!["a.dpt", "b.dpt"]);
}

#[tokio::test]
async fn test_slide_metadata() {
    let router = flat_router();

    let response = get(&router, "/slides/flat.dpt").await;
    assert_eq!(response.status(), StatusCode::OK);

    let meta: SlideMetadataResponse =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(meta.slide_id, "flat.dpt");
    assert_eq!((meta.width, meta.height), (112, 112));
    assert_eq!((meta.source_tile_width, meta.source_tile_height), (64, 64));
    assert_eq!(meta.overlap, 16);
    assert_eq!(meta.z_stacks, 1);
    assert_eq!(meta.tile_count, 12);
    assert!((meta.mpp - 0.25).abs() < f32::EPSILON);
    assert_eq!(meta.layer_count, 3);

    let sizes: Vec<_> = meta
        .layers
        .iter()
        .map(|l| (l.width, l.tiles_x, l.downsample))
        .collect();
    assert_eq!(sizes, vec![(112, 2, 1.0), (28, 1, 4.0), (7, 1, 16.0)]);
}

#[tokio::test]
async fn test_slide_metadata_missing_slide() {
    let router = flat_router();

    let response = get(&router, "/slides/missing.dpt").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
