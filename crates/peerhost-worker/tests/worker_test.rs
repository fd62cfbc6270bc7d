//! Inbox processing and worker pool tests.
//!
//! Run with: `cargo test -p peerhost-worker --test worker_test`

mod helpers;

use async_trait::async_trait;
use chrono::Utc;
use helpers::fixtures::{merry, metadata, sam};
use helpers::setup_host;
use peerhost_core::models::{EncryptedKeyHeader, KeyHeader};
use peerhost_core::AppError;
use peerhost_storage::DriveFileSystem;
use peerhost_transit::{InboxStorage, KeyExchange};
use peerhost_worker::{InboxWorker, InboxWorkerConfig, ProcessOutcome};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Key exchange whose key store is unavailable.
struct UnavailableKeys;

#[async_trait]
impl KeyExchange for UnavailableKeys {
    async fn is_valid_public_key(&self, _crc: u32) -> bool {
        true
    }

    async fn decrypt_key_header(&self, _header: &EncryptedKeyHeader) -> Result<KeyHeader, AppError> {
        Err(AppError::Internal("key store unavailable".to_string()))
    }
}

fn fast_config() -> InboxWorkerConfig {
    InboxWorkerConfig {
        max_workers: 2,
        poll_interval_ms: 50,
        batch_size: 3,
        max_attempts: 3,
        stale_pop_secs: 0,
    }
}

#[tokio::test]
async fn test_save_file_completed() {
    let host = setup_host().await;
    let uid = Uuid::new_v4();
    let file_id = host.send_unique(&sam(), uid).await;

    let item = host.inbox.pop(1).await.unwrap().remove(0);
    let outcome = host.processor(3).process_item(&item).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Completed);
    assert_eq!(host.inbox_len().await, 0);
    assert!(!host.temp_exists(file_id).await);

    let header = host.file_by_unique_id(uid).await.unwrap();
    assert_eq!(header.file.file_id, file_id);
    assert_eq!(header.original_sender(), Some(&sam()));
}

#[tokio::test]
async fn test_unparseable_metadata_discarded() {
    let host = setup_host().await;
    let file_id = host.send_raw(&sam(), b"not json".to_vec(), b"x").await;

    let item = host.inbox.pop(1).await.unwrap().remove(0);
    let outcome = host.processor(3).process_item(&item).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Discarded);
    assert_eq!(host.inbox_len().await, 0);
    assert!(!host.temp_exists(file_id).await);
}

#[tokio::test]
async fn test_sender_conflict_discarded() {
    let host = setup_host().await;
    let uid = Uuid::new_v4();
    let processor = host.processor(3);

    host.send_unique(&sam(), uid).await;
    let item = host.inbox.pop(1).await.unwrap().remove(0);
    processor.process_item(&item).await.unwrap();
    let original = host.file_by_unique_id(uid).await.unwrap();

    host.send_unique(&merry(), uid).await;
    let item = host.inbox.pop(1).await.unwrap().remove(0);
    let outcome = processor.process_item(&item).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Discarded);
    let stored = host.file_by_unique_id(uid).await.unwrap();
    assert_eq!(stored.version_tag(), original.version_tag());
}

#[tokio::test]
async fn test_system_failure_retried_then_given_up() {
    let host = setup_host().await;
    let file_id = host.send_unique(&sam(), Uuid::new_v4()).await;
    let processor = host.processor_with_keys(Arc::new(UnavailableKeys), 2);

    let item = host.inbox.pop(1).await.unwrap().remove(0);
    let outcome = processor.process_item(&item).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Retrying { attempts: 1 });
    assert_eq!(host.inbox_len().await, 1);
    assert!(host.temp_exists(file_id).await);

    let item = host.inbox.pop(1).await.unwrap().remove(0);
    assert_eq!(item.attempts, 1);
    let outcome = processor.process_item(&item).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::GaveUp);
    assert_eq!(host.inbox_len().await, 0);
    assert!(!host.temp_exists(file_id).await);
}

#[tokio::test]
async fn test_delete_linked_file_completed() {
    let host = setup_host().await;
    let gtid = Uuid::new_v4();
    let processor = host.processor(3);

    host.send(&sam(), &metadata(None, Some(gtid)), b"to delete").await;
    let item = host.inbox.pop(1).await.unwrap().remove(0);
    processor.process_item(&item).await.unwrap();

    host.request_delete(&sam(), gtid).await;
    let item = host.inbox.pop(1).await.unwrap().remove(0);
    let outcome = processor.process_item(&item).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Completed);

    let stored = host
        .drives
        .get_file_by_global_transit_id(host.drive_id, gtid)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_active());
}

#[tokio::test]
async fn test_read_receipt_completed_and_author_receipt_discarded() {
    let host = setup_host().await;
    let gtid = Uuid::new_v4();
    let processor = host.processor(3);

    host.send(&sam(), &metadata(None, Some(gtid)), b"to read").await;
    let item = host.inbox.pop(1).await.unwrap().remove(0);
    processor.process_item(&item).await.unwrap();

    host.request_mark_read(&merry(), gtid).await;
    let item = host.inbox.pop(1).await.unwrap().remove(0);
    assert_eq!(
        processor.process_item(&item).await.unwrap(),
        ProcessOutcome::Completed
    );

    host.request_mark_read(&sam(), gtid).await;
    let item = host.inbox.pop(1).await.unwrap().remove(0);
    assert_eq!(
        processor.process_item(&item).await.unwrap(),
        ProcessOutcome::Discarded
    );

    let stored = host
        .drives
        .get_file_by_global_transit_id(host.drive_id, gtid)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.server_metadata.read_receipts.contains_key(&merry()));
    assert!(!stored.server_metadata.read_receipts.contains_key(&sam()));
    assert_eq!(host.inbox_len().await, 0);
}

#[tokio::test]
async fn test_redelivered_item_is_idempotent() {
    let host = setup_host().await;
    let uid = Uuid::new_v4();
    let processor = host.processor(3);
    host.send_unique(&sam(), uid).await;

    // A worker pops the item, then stalls long enough for it to be recovered.
    let first = host.inbox.pop(1).await.unwrap().remove(0);
    let recovered = host
        .inbox
        .recover_dead(Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(recovered, 1);
    let second = host.inbox.pop(1).await.unwrap().remove(0);
    assert_eq!(first.id, second.id);

    let stalled = processor.process_item(&first).await.unwrap();
    assert_eq!(stalled, ProcessOutcome::Stale);
    let redelivered = processor.process_item(&second).await.unwrap();
    assert_eq!(redelivered, ProcessOutcome::Completed);

    assert_eq!(host.inbox_len().await, 0);
    assert!(host.file_by_unique_id(uid).await.is_some());
}

#[tokio::test]
async fn test_unpopped_item_is_an_error() {
    let host = setup_host().await;
    host.send_unique(&sam(), Uuid::new_v4()).await;
    let mut item = host.inbox.pop(1).await.unwrap().remove(0);
    item.popstamp = None;

    let result = host.processor(3).process_item(&item).await;
    assert!(matches!(result, Err(AppError::Internal(_))));
}

#[tokio::test]
async fn test_worker_drains_inbox() {
    let host = setup_host().await;
    let worker = InboxWorker::start(Arc::new(host.processor(3)), &host.events, fast_config());

    let mut unique_ids = Vec::new();
    for _ in 0..7 {
        let uid = Uuid::new_v4();
        host.send_unique(&sam(), uid).await;
        unique_ids.push(uid);
    }

    host.wait_for_empty_inbox(Duration::from_secs(10)).await;
    worker.shutdown().await;

    for uid in unique_ids {
        assert!(host.file_by_unique_id(uid).await.is_some());
    }
}

#[tokio::test]
async fn test_worker_wakes_on_received_event() {
    let host = setup_host().await;
    let config = InboxWorkerConfig {
        poll_interval_ms: 60_000,
        ..fast_config()
    };
    let worker = InboxWorker::start(Arc::new(host.processor(3)), &host.events, config);

    let uid = Uuid::new_v4();
    host.send_unique(&sam(), uid).await;

    host.wait_for_empty_inbox(Duration::from_secs(5)).await;
    worker.shutdown().await;
    assert!(host.file_by_unique_id(uid).await.is_some());
}

#[tokio::test]
async fn test_worker_recovers_stale_pops() {
    let host = setup_host().await;
    let uid = Uuid::new_v4();
    host.send_unique(&sam(), uid).await;

    // Popped by a worker that died before settling it.
    let abandoned = host.inbox.pop(1).await.unwrap();
    assert_eq!(abandoned.len(), 1);

    let config = InboxWorkerConfig {
        stale_pop_secs: 1,
        ..fast_config()
    };
    let worker = InboxWorker::start(Arc::new(host.processor(3)), &host.events, config);

    host.wait_for_empty_inbox(Duration::from_secs(10)).await;
    worker.shutdown().await;
    assert!(host.file_by_unique_id(uid).await.is_some());
}

#[tokio::test]
async fn test_shutdown_stops_popping() {
    let host = setup_host().await;
    let worker = InboxWorker::start(Arc::new(host.processor(3)), &host.events, fast_config());
    worker.shutdown().await;

    host.send_unique(&sam(), Uuid::new_v4()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(host.inbox_len().await, 1);
}
