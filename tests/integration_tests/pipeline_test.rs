//! End-to-end pipeline integration tests
//!
//! Tests the complete workflow:
//! 1. HTTP fetch (mocked)
//! 2. Listing extraction
//! 3. Diff against the identity store
//! 4. Notification on every channel (mocked)
//! 5. Commit of handled ids

use madori::pipeline::RunOptions;
use madori::storage::{MemorySeenStore, SeenStore, SqliteSeenStore};
use tempfile::TempDir;
use wiremock::MockServer;

use super::fixtures::{fast_dispatcher, monitor, mount_hook, mount_search_page, notified_ids, posts, webhook};
use crate::common::{listing_id, page_with_listings, page_with_one_missing_id};

// ============================================================================
// Complete Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_first_and_second_run_with_two_channels() {
    // Arrange
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("seen.db");

    let server = MockServer::start().await;
    mount_search_page(&server, 200, &page_with_listings(&[101, 102, 103])).await;
    mount_hook(&server, "/hooks/a", 200).await;
    mount_hook(&server, "/hooks/b", 200).await;

    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "a", "/hooks/a")).unwrap();
    dispatcher.add_channel(webhook(&server, "b", "/hooks/b")).unwrap();
    let monitor = monitor(&server, dispatcher);

    // Act: first run on an empty store
    let first = {
        let mut store = SqliteSeenStore::open(&db_path).unwrap();
        monitor.run(&mut store, RunOptions::default()).await.unwrap()
    };

    // Assert
    assert_eq!(first.extracted, 3);
    assert_eq!(first.new, 3);
    assert_eq!(first.known, 0);
    assert_eq!(first.notified, 3);
    assert_eq!(first.committed, 3);
    assert_eq!(first.total_channel_failures(), 0);

    let expected: Vec<String> = [101, 102, 103].iter().map(|&n| listing_id(n)).collect();
    assert_eq!(notified_ids(&server, "/hooks/a").await, expected);
    assert_eq!(notified_ids(&server, "/hooks/b").await, expected);

    // Act: second run, same page, store reopened from disk
    let second = {
        let mut store = SqliteSeenStore::open(&db_path).unwrap();
        assert!(expected.iter().all(|id| store.contains(id)));
        monitor.run(&mut store, RunOptions::default()).await.unwrap()
    };

    // Assert: nothing new, nothing sent again
    assert_eq!(second.new, 0);
    assert_eq!(second.known, 3);
    assert_eq!(second.committed, 0);
    assert_eq!(notified_ids(&server, "/hooks/a").await.len(), 3);
    assert_eq!(notified_ids(&server, "/hooks/b").await.len(), 3);

    let stats = SqliteSeenStore::inspect(&db_path).unwrap();
    assert_eq!(stats.total, 3);
}

#[tokio::test]
async fn test_only_unseen_listings_are_notified() {
    let server = MockServer::start().await;
    mount_search_page(&server, 200, &page_with_listings(&[1, 3, 4])).await;
    mount_hook(&server, "/hooks/a", 200).await;

    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "a", "/hooks/a")).unwrap();

    let mut store = MemorySeenStore::with_ids([listing_id(1), listing_id(2)]);
    let summary = monitor(&server, dispatcher)
        .run(&mut store, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.known, 1);
    assert_eq!(summary.new, 2);
    assert_eq!(notified_ids(&server, "/hooks/a").await, vec![listing_id(3), listing_id(4)]);
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn test_item_without_id_is_dropped() {
    let server = MockServer::start().await;
    mount_search_page(&server, 200, &page_with_one_missing_id()).await;

    let mut store = MemorySeenStore::new();
    let summary = monitor(&server, fast_dispatcher())
        .run(&mut store, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.extracted, 4);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.committed, 4);
    assert_eq!(
        store.ids(),
        vec![listing_id(201), listing_id(202), listing_id(204), listing_id(205)]
    );
}

// ============================================================================
// Partial Failure Tests
// ============================================================================

#[tokio::test]
async fn test_one_channel_down_still_commits() {
    let server = MockServer::start().await;
    mount_search_page(&server, 200, &page_with_listings(&[7, 8])).await;
    mount_hook(&server, "/hooks/down", 503).await;
    mount_hook(&server, "/hooks/up", 200).await;

    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "down", "/hooks/down")).unwrap();
    dispatcher.add_channel(webhook(&server, "up", "/hooks/up")).unwrap();

    let mut store = MemorySeenStore::new();
    let summary = monitor(&server, dispatcher)
        .run(&mut store, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.notified, 2);
    assert_eq!(summary.unhandled, 0);
    assert_eq!(summary.committed, 2);
    assert_eq!(summary.channel_failures.get("down"), Some(&2));
    assert_eq!(summary.channel_failures.get("up"), None);
    assert_eq!(store.ids(), vec![listing_id(7), listing_id(8)]);

    // one attempt plus one retry per listing on the failing channel
    assert_eq!(posts(&server, "/hooks/down", "new_listing").await.len(), 4);
}

#[tokio::test]
async fn test_all_channels_down_offers_again_next_run() {
    let server = MockServer::start().await;
    mount_search_page(&server, 200, &page_with_listings(&[11, 12])).await;
    mount_hook(&server, "/hooks/a", 500).await;
    mount_hook(&server, "/hooks/b", 502).await;
    mount_hook(&server, "/hooks/c", 200).await;

    let mut store = MemorySeenStore::new();

    // Act: every channel fails
    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "a", "/hooks/a")).unwrap();
    dispatcher.add_channel(webhook(&server, "b", "/hooks/b")).unwrap();
    let summary = monitor(&server, dispatcher)
        .run(&mut store, RunOptions::default())
        .await
        .unwrap();

    // Assert: the run succeeds, but nothing is committed
    assert_eq!(summary.new, 2);
    assert_eq!(summary.notified, 0);
    assert_eq!(summary.unhandled, 2);
    assert_eq!(summary.committed, 0);
    assert!(store.is_empty());

    // Act: a working channel on the next run
    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "c", "/hooks/c")).unwrap();
    let summary = monitor(&server, dispatcher)
        .run(&mut store, RunOptions::default())
        .await
        .unwrap();

    // Assert: the same listings are offered again and now committed
    assert_eq!(summary.new, 2);
    assert_eq!(summary.committed, 2);
    assert_eq!(notified_ids(&server, "/hooks/c").await, vec![listing_id(11), listing_id(12)]);
}

// ============================================================================
// Dry Run Tests
// ============================================================================

#[tokio::test]
async fn test_dry_run_sends_and_stores_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("seen.db");

    let server = MockServer::start().await;
    mount_search_page(&server, 200, &page_with_listings(&[21, 22, 23])).await;
    mount_hook(&server, "/hooks/a", 200).await;

    let mut dispatcher = fast_dispatcher();
    dispatcher.add_channel(webhook(&server, "a", "/hooks/a")).unwrap();

    let summary = {
        let mut store = SqliteSeenStore::open(&db_path).unwrap();
        monitor(&server, dispatcher)
            .run(&mut store, RunOptions::dry_run())
            .await
            .unwrap()
    };

    assert!(summary.dry_run);
    assert_eq!(summary.new, 3);
    assert_eq!(summary.notified, 0);
    assert_eq!(summary.committed, 0);
    assert!(notified_ids(&server, "/hooks/a").await.is_empty());
    assert_eq!(SqliteSeenStore::inspect(&db_path).unwrap().total, 0);
}
