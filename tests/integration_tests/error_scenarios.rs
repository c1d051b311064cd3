//! Error scenario integration tests
//!
//! Tests the failure modes of a run:
//! 1. Fetch failures (HTTP errors, timeouts)
//! 2. Non-HTML responses
//! 3. Identity store failures after notifying
//! 4. Lock contention between runs

use madori::error::{Error, ErrorCategory, FetchError, ParseError, StoreError};
use madori::pipeline::{RunOptions, RunState};
use madori::storage::{MemorySeenStore, SeenStore, SqliteSeenStore};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{
    fast_dispatcher, monitor, mount_hook, mount_search_page, notified_ids, posts, webhook,
    CrashingStore, SEARCH_PATH,
};
use crate::common::{listing_id, page_with_listings, BLOCKED_RESPONSE};

// ============================================================================
// Fetch Error Tests
// ============================================================================

#[tokio::test]
async fn test_fetch_failure_fails_run_and_alerts() {
    let server = MockServer::start().await;
    mount_search_page(&server, 503, "Service Unavailable").await;
    mount_hook(&server, "/hooks/ops", 200).await;

    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "ops", "/hooks/ops")).unwrap();

    let mut store = MemorySeenStore::with_ids([listing_id(1)]);
    let err = monitor(&server, dispatcher)
        .run(&mut store, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, RunState::Fetching);
    assert_eq!(err.source.category(), ErrorCategory::Network);
    assert!(matches!(err.source, Error::Fetch(FetchError::ServerError(503))));
    assert_eq!(store.ids(), vec![listing_id(1)]);

    let alerts = posts(&server, "/hooks/ops", "alert").await;
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0]["text"].as_str().unwrap().contains("fetching"));
}

#[tokio::test]
async fn test_fetch_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page_with_listings(&[1]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut store = MemorySeenStore::new();
    let err = monitor(&server, fast_dispatcher())
        .with_fetch_timeout(Duration::from_millis(200))
        .run(&mut store, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, RunState::Fetching);
    assert!(matches!(err.source, Error::Fetch(FetchError::Timeout)));
    assert!(store.is_empty());
}

// ============================================================================
// Format Error Tests
// ============================================================================

#[tokio::test]
async fn test_block_page_is_a_format_error() {
    let server = MockServer::start().await;
    mount_search_page(&server, 200, BLOCKED_RESPONSE).await;
    mount_hook(&server, "/hooks/ops", 200).await;

    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "ops", "/hooks/ops")).unwrap();

    let mut store = MemorySeenStore::new();
    let err = monitor(&server, dispatcher)
        .run(&mut store, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, RunState::Extracting);
    match &err.source {
        Error::Parse(ParseError::NotHtml { excerpt }) => assert!(excerpt.contains("too many requests")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(notified_ids(&server, "/hooks/ops").await.is_empty());
    assert_eq!(posts(&server, "/hooks/ops", "alert").await.len(), 1);
}

#[tokio::test]
async fn test_dry_run_failure_sends_no_alert() {
    let server = MockServer::start().await;
    mount_search_page(&server, 200, BLOCKED_RESPONSE).await;
    mount_hook(&server, "/hooks/ops", 200).await;

    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "ops", "/hooks/ops")).unwrap();

    let mut store = MemorySeenStore::new();
    let err = monitor(&server, dispatcher)
        .run(&mut store, RunOptions::dry_run())
        .await
        .unwrap_err();

    assert_eq!(err.stage, RunState::Extracting);
    assert!(posts(&server, "/hooks/ops", "alert").await.is_empty());
}

// ============================================================================
// Store Error Tests
// ============================================================================

#[tokio::test]
async fn test_commit_failure_after_notify_renotifies_next_run() {
    let server = MockServer::start().await;
    mount_search_page(&server, 200, &page_with_listings(&[31, 32])).await;
    mount_hook(&server, "/hooks/a", 200).await;

    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "a", "/hooks/a")).unwrap();
    let monitor = monitor(&server, dispatcher);

    // Act: notifications go out, then the commit fails
    let mut crashing = CrashingStore::default();
    let err = monitor
        .run(&mut crashing, RunOptions::default())
        .await
        .unwrap_err();

    // Assert: none of the batch was stored
    assert_eq!(err.stage, RunState::Committing);
    assert_eq!(err.source.category(), ErrorCategory::Storage);
    assert!(crashing.inner.is_empty());
    assert_eq!(notified_ids(&server, "/hooks/a").await.len(), 2);

    // Act: next run over the same (unchanged) SeenSet
    let mut store = crashing.inner;
    let summary = monitor.run(&mut store, RunOptions::default()).await.unwrap();

    // Assert: the uncommitted ids are notified once more, then stored
    assert_eq!(summary.new, 2);
    assert_eq!(summary.committed, 2);
    assert_eq!(
        notified_ids(&server, "/hooks/a").await,
        vec![listing_id(31), listing_id(32), listing_id(31), listing_id(32)]
    );
}

// ============================================================================
// Lock Contention Tests
// ============================================================================

#[test]
fn test_second_store_open_is_lock_contention() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("seen.db");

    let _running = SqliteSeenStore::open(&db_path).unwrap();
    let err = match SqliteSeenStore::open(&db_path) {
        Ok(_) => panic!("second open must be refused while the first run holds the lock"),
        Err(e) => e,
    };

    assert!(matches!(err, StoreError::Locked(_)));
    let unified: Error = err.into();
    assert!(unified.is_lock_contention());
    assert_eq!(unified.category(), ErrorCategory::Contention);
}

#[test]
fn test_lock_released_when_store_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("seen.db");

    {
        let mut store = SqliteSeenStore::open(&db_path).unwrap();
        store.commit(&[listing_id(41)]).unwrap();
    }

    let store = SqliteSeenStore::open(&db_path).unwrap();
    assert!(store.contains(&listing_id(41)));
}
