//! Tile cache integration tests.
//!
//! Tests verify:
//! - A cache hit returns identical bytes without touching the container
//! - Concurrent requests for one tile render it once
//! - Tiles are cached independently per slide and coordinate
//! - Clearing the cache forces a re-render

use std::sync::atomic::Ordering;
use std::sync::Arc;

use dpt_streamer::slide::SlideRegistry;
use dpt_streamer::tile::{TileRequest, TileService, TileServiceOptions};

use super::test_utils::{flat_slide, gradient_slide, MockSlideSource};

fn service_for(source: MockSlideSource, tile_size: u32) -> TileService<MockSlideSource> {
    TileService::with_options(
        Arc::new(SlideRegistry::new(source)),
        TileServiceOptions {
            tile_size,
            ..TileServiceOptions::default()
        },
    )
}

#[tokio::test]
async fn test_cache_hit_does_not_read_container() {
    let source = MockSlideSource::new().with_slide("grad.dpt", gradient_slide());
    let reads = source.read_counter();
    let service = service_for(source, 128);

    let first = service
        .get_tile(TileRequest::new("grad.dpt", 0, 1, 1))
        .await
        .unwrap();
    assert!(!first.cache_hit);
    let reads_after_miss = reads.load(Ordering::SeqCst);
    assert!(reads_after_miss > 0);

    let second = service
        .get_tile(TileRequest::new("grad.dpt", 0, 1, 1))
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(first.data, second.data);
    assert_eq!(reads.load(Ordering::SeqCst), reads_after_miss);
}

#[tokio::test]
async fn test_different_tiles_cached_independently() {
    let source = MockSlideSource::new().with_slide("grad.dpt", gradient_slide());
    let service = service_for(source, 128);

    for (row, col) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        let response = service
            .get_tile(TileRequest::new("grad.dpt", 0, row, col))
            .await
            .unwrap();
        assert!(!response.cache_hit, "tile ({}, {}) should miss", row, col);
    }

    let layer1 = service
        .get_tile(TileRequest::new("grad.dpt", 1, 0, 0))
        .await
        .unwrap();
    assert!(!layer1.cache_hit);

    let (_, _, count) = service.cache_stats().await;
    assert_eq!(count, 5);
}

#[tokio::test]
async fn test_slide_id_affects_cache_key() {
    let source = MockSlideSource::new()
        .with_slide("dark.dpt", flat_slide([10, 10, 10]))
        .with_slide("light.dpt", flat_slide([200, 200, 200]));
    let service = service_for(source, 64);

    let dark = service
        .get_tile(TileRequest::new("dark.dpt", 0, 0, 0))
        .await
        .unwrap();
    let light = service
        .get_tile(TileRequest::new("light.dpt", 0, 0, 0))
        .await
        .unwrap();

    assert!(!dark.cache_hit);
    assert!(!light.cache_hit);
    assert_ne!(dark.data, light.data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_for_same_tile() {
    let source = MockSlideSource::new().with_slide("grad.dpt", gradient_slide());
    let reads = source.read_counter();
    let service = Arc::new(service_for(source, 128));

    // Warm the slide so only tile reads are counted below
    service.registry().get_slide("grad.dpt").await.unwrap();
    let before = reads.load(Ordering::SeqCst);

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .get_tile(TileRequest::new("grad.dpt", 0, 0, 0))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut bodies = Vec::new();
    for handle in handles {
        bodies.push(handle.await.unwrap().data);
    }
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));

    // Rendered once: a 128px tile at the origin touches the 4 stored
    // tiles around it
    assert_eq!(reads.load(Ordering::SeqCst) - before, 4);
}

#[tokio::test]
async fn test_clear_cache_forces_rerender() {
    let source = MockSlideSource::new().with_slide("grad.dpt", gradient_slide());
    let reads = source.read_counter();
    let service = service_for(source, 128);
    let request = TileRequest::new("grad.dpt", 0, 0, 0);

    let first = service.get_tile(request.clone()).await.unwrap();
    let after_first = reads.load(Ordering::SeqCst);

    service.clear_cache().await;
    let (size, _, count) = service.cache_stats().await;
    assert_eq!((size, count), (0, 0));

    let second = service.get_tile(request).await.unwrap();
    assert!(!second.cache_hit);
    assert!(reads.load(Ordering::SeqCst) > after_first);

    // Rendering is deterministic
    assert_eq!(first.data, second.data);
}

#[tokio::test]
async fn test_cache_with_limited_entries() {
    let source = MockSlideSource::new().with_slide("grad.dpt", gradient_slide());
    let service = TileService::with_options(
        Arc::new(SlideRegistry::new(source)),
        TileServiceOptions {
            tile_size: 128,
            cache_max_entries: 2,
            ..TileServiceOptions::default()
        },
    );

    for col in 0..3 {
        service
            .get_tile(TileRequest::new("grad.dpt", 0, 0, col))
            .await
            .unwrap();
    }

    let (_, _, count) = service.cache_stats().await;
    assert_eq!(count, 2);

    // The least recently used tile was evicted
    let evicted = service
        .get_tile(TileRequest::new("grad.dpt", 0, 0, 0))
        .await
        .unwrap();
    assert!(!evicted.cache_hit);
}
