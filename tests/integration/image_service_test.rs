use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use artloader::ImageError;
use mockito::Server;
use tokio::sync::oneshot;

use crate::common;

const CACHE_BUDGET: u64 = 10_000_000;

#[tokio::test]
async fn test_concurrent_requests_share_one_download() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/poster.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(common::tiny_png())
        .expect(1)
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let url = format!("{}/poster.png", server.url());

    let (tx1, rx1) = oneshot::channel();
    let (tx2, rx2) = oneshot::channel();
    service.request_image(&url, move |result| {
        let _ = tx1.send(result);
    });
    service.request_image(&url, move |result| {
        let _ = tx2.send(result);
    });

    // Both callers are served by a single registry entry.
    assert_eq!(service.pending_downloads(), 1);

    let first = rx1.await.unwrap().unwrap();
    let second = rx2.await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.format, "png");

    mock.assert_async().await;
    let stats = service.stats();
    assert_eq!(stats.downloads, 1);
    assert_eq!(stats.coalesced, 1);
    assert_eq!(service.pending_downloads(), 0);
}

#[tokio::test]
async fn test_cache_hit_resolves_synchronously_without_refetch() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/poster.png")
        .with_status(200)
        .with_body(common::tiny_png())
        .expect(1)
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let url = format!("{}/poster.png", server.url());

    let image = service.load_image(&url).await.unwrap();
    assert_eq!((image.width, image.height), (2, 2));
    assert!(service.contains(&url));

    // The second request completes before request_image returns.
    let delivered = Arc::new(AtomicBool::new(false));
    let flag = delivered.clone();
    service.request_image(&url, move |result| {
        assert!(result.is_ok());
        flag.store(true, Ordering::SeqCst);
    });
    assert!(delivered.load(Ordering::SeqCst));

    mock.assert_async().await;
    assert_eq!(service.stats().memory_hits, 1);
}

#[tokio::test]
async fn test_waiters_fire_in_registration_order() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/poster.png")
        .with_status(200)
        .with_body(common::tiny_png())
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let url = format!("{}/poster.png", server.url());

    let order = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = oneshot::channel();

    let first = order.clone();
    service.request_image(&url, move |_| first.lock().unwrap().push(1));
    let second = order.clone();
    service.request_image(&url, move |_| second.lock().unwrap().push(2));
    let third = order.clone();
    service.request_image(&url, move |_| {
        third.lock().unwrap().push(3);
        let _ = done_tx.send(());
    });

    done_rx.await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_cancel_clears_state_and_next_request_starts_fresh() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/poster.png")
        .with_status(200)
        .with_body(common::tiny_png())
        .expect(1)
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let url = format!("{}/poster.png", server.url());

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = invoked.clone();
    service.request_image(&url, move |_| flag.store(true, Ordering::SeqCst));
    assert!(service.is_pending(&url));

    service.cancel(&url);
    assert!(!service.is_pending(&url));
    assert_eq!(service.pending_downloads(), 0);

    // A new request is a fresh operation and completes normally.
    let image = service.load_image(&url).await.unwrap();
    assert_eq!(image.format, "png");

    // The cancelled waiter was never invoked.
    assert!(!invoked.load(Ordering::SeqCst));
    assert_eq!(service.stats().downloads, 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_failure_does_not_poison_the_cache() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/missing.png")
        .with_status(404)
        .expect(2)
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let url = format!("{}/missing.png", server.url());

    let err = service.load_image(&url).await.unwrap_err();
    assert!(matches!(err, ImageError::Transport(_)));
    assert!(!service.contains(&url));
    assert_eq!(service.pending_downloads(), 0);

    // The next request goes back to the network instead of replaying the
    // failure.
    let err = service.load_image(&url).await.unwrap_err();
    assert!(matches!(err, ImageError::Transport(_)));

    mock.assert_async().await;
    assert_eq!(service.stats().failures, 2);
}

#[tokio::test]
async fn test_distinct_keys_complete_independently() {
    let mut server = Server::new_async().await;
    let mock_good = server
        .mock("GET", "/good.png")
        .with_status(200)
        .with_body(common::tiny_png())
        .expect(1)
        .create_async()
        .await;
    let mock_bad = server
        .mock("GET", "/bad.png")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let good_url = format!("{}/good.png", server.url());
    let bad_url = format!("{}/bad.png", server.url());

    let (good, bad) = tokio::join!(
        service.load_image(&good_url),
        service.load_image(&bad_url)
    );

    assert!(good.is_ok());
    assert!(matches!(bad, Err(ImageError::Transport(_))));
    assert!(service.contains(&good_url));
    assert!(!service.contains(&bad_url));

    mock_good.assert_async().await;
    mock_bad.assert_async().await;
}

#[tokio::test]
async fn test_invalid_url_fails_synchronously() {
    let service = common::test_service(CACHE_BUDGET);

    for bad in ["not a url", "ftp://example.com/poster.png"] {
        let delivered = Arc::new(AtomicBool::new(false));
        let flag = delivered.clone();
        service.request_image(bad, move |result| {
            assert!(matches!(result, Err(ImageError::InvalidKey(_))));
            flag.store(true, Ordering::SeqCst);
        });
        assert!(delivered.load(Ordering::SeqCst));
    }

    assert_eq!(service.pending_downloads(), 0);
    assert_eq!(service.stats().downloads, 0);
}

#[tokio::test]
async fn test_undecodable_body_is_a_decode_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/broken.png")
        .with_status(200)
        .with_body("html pretending to be artwork")
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let url = format!("{}/broken.png", server.url());

    let err = service.load_image(&url).await.unwrap_err();
    assert!(matches!(err, ImageError::Decode(_)));
    assert!(!service.contains(&url));
}

#[tokio::test]
async fn test_cancelled_load_resolves_cancelled() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/poster.png")
        .with_status(200)
        .with_body(common::tiny_png())
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let url = format!("{}/poster.png", server.url());

    let svc = service.clone();
    let load_url = url.clone();
    let waiter = tokio::spawn(async move { svc.load_image(&load_url).await });

    // Let the spawned waiter register its request, then pull the download
    // out from under it.
    tokio::task::yield_now().await;
    service.cancel(&url);

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(ImageError::Cancelled)));
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/poster.png")
        .with_status(200)
        .with_body(common::tiny_png())
        .expect(2)
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let url = format!("{}/poster.png", server.url());

    service.load_image(&url).await.unwrap();
    assert!(service.contains(&url));

    service.invalidate(&url);
    assert!(!service.contains(&url));

    service.load_image(&url).await.unwrap();
    mock.assert_async().await;
    assert_eq!(service.stats().downloads, 2);
}

#[tokio::test]
async fn test_image_over_budget_is_served_but_not_retained() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/poster.png")
        .with_status(200)
        .with_body(common::tiny_png())
        .create_async()
        .await;

    // Budget smaller than any real image.
    let service = common::test_service(10);
    let url = format!("{}/poster.png", server.url());

    let image = service.load_image(&url).await.unwrap();
    assert!(!image.data.is_empty());
    assert!(!service.contains(&url));
    assert_eq!(service.stats().cached_images, 0);
}

#[tokio::test]
async fn test_prefetch_loads_and_caches_batch() {
    let mut server = Server::new_async().await;
    let mock_a = server
        .mock("GET", "/a.png")
        .with_status(200)
        .with_body(common::tiny_png())
        .expect(1)
        .create_async()
        .await;
    let mock_b = server
        .mock("GET", "/b.png")
        .with_status(200)
        .with_body(common::tiny_png())
        .expect(1)
        .create_async()
        .await;

    let service = common::test_service(CACHE_BUDGET);
    let urls = vec![
        format!("{}/a.png", server.url()),
        format!("{}/b.png", server.url()),
    ];

    let results = service.prefetch(&urls).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_ok()));
    assert!(service.contains(&urls[0]));
    assert!(service.contains(&urls[1]));

    // Warming again is answered entirely from cache.
    service.warm_cache(&urls).await;
    mock_a.assert_async().await;
    mock_b.assert_async().await;
}
