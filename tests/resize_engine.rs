//! Engine behaviour against a mock origin serving real JPEGs.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use imgresize::cache::{ImageCache, LruImageCache};
use imgresize::resize::{Fetcher, ResizerConfig, ResizingProgress};
use imgresize::{ImageKey, ResizeRequest, ResizeStatus, Resizer};

fn jpeg(w: u32, h: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new(&mut buf).encode_image(&img).unwrap();
    buf.into_inner()
}

fn dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).unwrap();
    (img.width(), img.height())
}

async fn serve_jpeg(origin: &MockServer, route: &str, w: u32, h: u32, hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(jpeg(w, h)),
        )
        .expect(hits)
        .mount(origin)
        .await;
}

struct Harness {
    cache: Arc<LruImageCache>,
    resizer: Resizer,
}

fn harness(async_enabled: bool, queue_capacity: usize, max_bytes: u64) -> Harness {
    harness_with_pixels(async_enabled, queue_capacity, max_bytes, 4_000_000)
}

fn harness_with_pixels(async_enabled: bool, queue_capacity: usize, max_bytes: u64, max_pixels: u64) -> Harness {
    let cache = Arc::new(LruImageCache::new(64).unwrap());
    let fetcher = Fetcher::new("imgresize-test", Duration::from_secs(5), max_bytes).unwrap();
    let progress = Arc::new(ResizingProgress::new(Duration::from_secs(5)));
    let resizer = Resizer::new(
        ResizerConfig {
            async_enabled,
            workers: 2,
            queue_capacity,
            max_output_pixels: max_pixels,
        },
        cache.clone(),
        fetcher,
        progress,
    );
    Harness { cache, resizer }
}

#[test]
fn keys_are_deterministic_and_size_specific() {
    let a = ImageKey::derive("http://origin/a.jpg", 200, 0);
    assert_eq!(a, ImageKey::derive("http://origin/a.jpg", 200, 0));
    assert_ne!(a, ImageKey::derive("http://origin/a.jpg", 0, 200));
    assert_ne!(a, ImageKey::derive("http://origin/b.jpg", 200, 0));
}

#[tokio::test]
async fn sync_resize_stores_scaled_image() {
    let origin = MockServer::start().await;
    serve_jpeg(&origin, "/wide.jpg", 400, 200, 1).await;
    let h = harness(false, 8, 1 << 20);

    let url = format!("{}/wide.jpg", origin.uri());
    let outcomes = h
        .resizer
        .process(&ResizeRequest::new([url.as_str()], 200, 0))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].result, ResizeStatus::Success);
    assert!(!outcomes[0].cached);
    assert_eq!(outcomes[0].id, ImageKey::derive(&url, 200, 0));

    let stored = h.cache.get(&outcomes[0].id).await.unwrap();
    assert_eq!(dimensions(&stored), (200, 100));
}

#[tokio::test]
async fn cached_key_is_never_fetched() {
    let origin = MockServer::start().await;
    serve_jpeg(&origin, "/cached.jpg", 50, 50, 0).await;
    let h = harness(true, 8, 1 << 20);

    let url = format!("{}/cached.jpg", origin.uri());
    let key = ImageKey::derive(&url, 10, 10);
    assert!(h.cache.put(&key, Bytes::from_static(b"stored")).await);

    let request = ResizeRequest::new([url.as_str()], 10, 10);
    for outcomes in [
        h.resizer.process(&request).await.unwrap(),
        h.resizer.process_async(&request).await.unwrap(),
    ] {
        assert_eq!(outcomes[0].result, ResizeStatus::Success);
        assert!(outcomes[0].cached);
    }
    assert!(h.resizer.progress().is_empty());
}

#[tokio::test]
async fn mixed_batch_reports_cached_and_fresh() {
    let origin = MockServer::start().await;
    serve_jpeg(&origin, "/a.jpg", 300, 150, 0).await;
    serve_jpeg(&origin, "/b.jpg", 400, 300, 1).await;
    let h = harness(false, 8, 1 << 20);

    let a = format!("{}/a.jpg", origin.uri());
    let b = format!("{}/b.jpg", origin.uri());
    h.cache
        .put(&ImageKey::derive(&a, 200, 0), Bytes::from(jpeg(200, 100)))
        .await;

    let outcomes = h
        .resizer
        .process(&ResizeRequest::new([a.as_str(), b.as_str()], 200, 0))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].result, ResizeStatus::Success);
    assert!(outcomes[0].cached);
    assert_eq!(outcomes[1].result, ResizeStatus::Success);
    assert!(!outcomes[1].cached);

    let b_stored = h.cache.get(&outcomes[1].id).await.unwrap();
    assert_eq!(dimensions(&b_stored), (200, 150));
}

#[tokio::test]
async fn concurrent_async_requests_fetch_once() {
    let origin = MockServer::start().await;
    serve_jpeg(&origin, "/same.jpg", 120, 60, 1).await;
    let h = harness(true, 8, 1 << 20);
    h.resizer.start();

    let url = format!("{}/same.jpg", origin.uri());
    let request = ResizeRequest::new([url.as_str()], 60, 0);
    let (first, second) = tokio::join!(
        h.resizer.process_async(&request),
        h.resizer.process_async(&request)
    );

    for outcome in first.unwrap().into_iter().chain(second.unwrap()) {
        assert_ne!(outcome.result, ResizeStatus::Failure);
    }

    let key = ImageKey::derive(&url, 60, 0);
    assert!(h.resizer.progress().wait_for_resizing_done(&key).await);
    let stored = h.cache.get(&key).await.unwrap();
    assert_eq!(dimensions(&stored), (60, 30));

    h.resizer.shutdown().await;
}

#[tokio::test]
async fn one_free_slot_takes_first_and_rejects_second() {
    let origin = MockServer::start().await;
    serve_jpeg(&origin, "/first.jpg", 40, 40, 1).await;
    serve_jpeg(&origin, "/second.jpg", 40, 40, 0).await;
    let h = harness(true, 1, 1 << 20);

    let first = format!("{}/first.jpg", origin.uri());
    let second = format!("{}/second.jpg", origin.uri());
    let outcomes = h
        .resizer
        .process_async(&ResizeRequest::new([first.as_str(), second.as_str()], 20, 20))
        .await
        .unwrap();

    assert_eq!(outcomes[0].result, ResizeStatus::Enqueued);
    assert_eq!(outcomes[1].result, ResizeStatus::Failure);
    assert!(outcomes[1].error.as_deref().is_some_and(|e| e.contains("full")));
    assert!(!h.resizer.progress().is_resizing(&outcomes[1].id));

    h.resizer.start();
    assert!(h.resizer.progress().wait_for_resizing_done(&outcomes[0].id).await);
    assert!(h.cache.contains(&outcomes[0].id).await);
    assert!(!h.cache.contains(&outcomes[1].id).await);

    h.resizer.shutdown().await;
}

#[tokio::test]
async fn wait_times_out_while_claimed() {
    let h = harness(true, 8, 1 << 20);
    let key = ImageKey::derive("http://origin/slow.jpg", 1, 1);
    let progress = h.resizer.progress();

    assert!(!progress.check_and_set_resizing(&key));
    assert!(!progress.wait_for(&key, Duration::from_millis(30)).await);

    progress.delete_resizing(&key);
    assert!(progress.wait_for(&key, Duration::from_millis(30)).await);
}

#[tokio::test]
async fn origin_errors_become_failures() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/text.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not an image"))
        .mount(&origin)
        .await;
    serve_jpeg(&origin, "/huge.jpg", 256, 256, 1).await;

    let h = harness(false, 8, 512);
    let urls = ["/missing.jpg", "/text.jpg", "/huge.jpg"].map(|p| format!("{}{p}", origin.uri()));
    let outcomes = h
        .resizer
        .process(&ResizeRequest::new(urls.iter().map(String::as_str), 10, 0))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        assert_eq!(outcome.result, ResizeStatus::Failure);
        assert!(!outcome.cached);
        assert!(!h.cache.contains(&outcome.id).await);
    }
    assert!(outcomes[0].error.as_deref().unwrap().contains("404"));
    assert!(outcomes[1].error.as_deref().unwrap().contains("decode"));
    assert!(outcomes[2].error.as_deref().unwrap().contains("maximum size"));
}

#[tokio::test]
async fn async_failure_still_releases_claim() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&origin)
        .await;
    let h = harness(true, 8, 1 << 20);
    h.resizer.start();

    let url = format!("{}/gone.jpg", origin.uri());
    let outcomes = h
        .resizer
        .process_async(&ResizeRequest::new([url.as_str()], 10, 0))
        .await
        .unwrap();
    assert_eq!(outcomes[0].result, ResizeStatus::Enqueued);

    assert!(h.resizer.progress().wait_for_resizing_done(&outcomes[0].id).await);
    assert!(!h.resizer.progress().is_resizing(&outcomes[0].id));
    assert!(!h.cache.contains(&outcomes[0].id).await);

    h.resizer.shutdown().await;
}

#[tokio::test]
async fn shutdown_finishes_queued_work() {
    let origin = MockServer::start().await;
    serve_jpeg(&origin, "/q1.jpg", 30, 30, 1).await;
    serve_jpeg(&origin, "/q2.jpg", 30, 30, 1).await;
    let h = harness(true, 8, 1 << 20);
    h.resizer.start();

    let urls = ["/q1.jpg", "/q2.jpg"].map(|p| format!("{}{p}", origin.uri()));
    let outcomes = h
        .resizer
        .process_async(&ResizeRequest::new(urls.iter().map(String::as_str), 15, 15))
        .await
        .unwrap();

    h.resizer.shutdown().await;

    for outcome in &outcomes {
        assert!(h.cache.contains(&outcome.id).await);
    }
    assert!(h.resizer.progress().is_empty());

    let late = h
        .resizer
        .process_async(&ResizeRequest::new(["http://origin/late.jpg"], 15, 15))
        .await
        .unwrap();
    assert_eq!(late[0].result, ResizeStatus::Failure);
    assert!(h.resizer.progress().is_empty());
}

#[tokio::test]
async fn oversized_output_is_refused_before_resizing() {
    let origin = MockServer::start().await;
    serve_jpeg(&origin, "/small.jpg", 40, 20, 1).await;
    let h = harness_with_pixels(false, 8, 1 << 20, 10_000);

    let url = format!("{}/small.jpg", origin.uri());
    let outcomes = h
        .resizer
        .process(&ResizeRequest::new([url.as_str()], 20_000, 0))
        .await
        .unwrap();

    assert_eq!(outcomes[0].result, ResizeStatus::Failure);
    assert!(outcomes[0].error.as_deref().unwrap().contains("exceeds the limit of 10000 pixels"));
    assert!(!h.cache.contains(&outcomes[0].id).await);
}
