//! End-to-end pipeline tests
//!
//! These tests verify the producer, queue, and consumer working together:
//! - Ordered processing of live events, including remove-then-create renames
//! - Draining of queued events on shutdown
//! - Retry of transient failures and dropping of permanent ones
//! - Startup validation of the dispatch path
//! - Seeding the queue from the initial diff check

mod common;

use async_trait::async_trait;
use bridge_desktop::SqliteMetadataStore;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    metadata::LocalMetadataStore,
    remote::{ObjectStore, RemoteItem},
    time::Clock,
};
use bytes::Bytes;
use common::{path, FixedClock, Harness};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{
    apply_repairs, fingerprint, initial_diff_check, ChangeEvent, ChangeKind, EventConsumer,
    EventQueue, EventSource, IgnoreRules, ItemRequest, RetryPolicy, SyncError,
};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Objects {}

    #[async_trait]
    impl ObjectStore for Objects {
        async fn put_object(&self, key: &str, data: Bytes) -> BridgeResult<()>;
        async fn get_object(&self, key: &str) -> BridgeResult<Bytes>;
        async fn delete_object(&self, key: &str) -> BridgeResult<()>;
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

fn collect_sync_events(rx: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Sync(event) = event {
            events.push(event);
        }
    }
    events
}

#[tokio::test]
async fn test_rename_without_native_signal() {
    let h = Harness::new();
    h.write("x.txt", b"draft");
    let (mut producer, rx) = h.producer();
    let handle = EventConsumer::new(rx, h.request())
        .with_retry_policy(fast_retry(3))
        .run()
        .await
        .unwrap();

    producer
        .push_event(ChangeEvent::created(path("x.txt")))
        .await
        .unwrap();
    // Let the upload land so the removal is recognised as a synced path.
    for _ in 0..100 {
        if h.store.get("x.txt").await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.rename("x.txt", "y.txt");
    producer
        .push_event(ChangeEvent::removed(path("x.txt")))
        .await
        .unwrap();
    producer
        .push_event(ChangeEvent::created(path("y.txt")))
        .await
        .unwrap();

    let stats = handle.shutdown().await.unwrap();

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(h.remote.paths().await, vec!["y.txt"]);
    assert_eq!(h.objects.keys().await, vec!["y.txt"]);
    assert_eq!(h.store.paths().await, vec!["y.txt"]);
}

#[tokio::test]
async fn test_shutdown_drains_queued_events() {
    let h = Harness::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        h.write(name, name.as_bytes());
    }
    let (tx, rx) = EventQueue::bounded(8);
    for name in ["a.txt", "b.txt", "c.txt"] {
        tx.push(ChangeEvent::created(path(name))).await.unwrap();
    }
    tx.stop();

    let handle = EventConsumer::new(rx, h.request()).run().await.unwrap();
    let stats = handle.join().await.unwrap();

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.applied, 3);
    assert_eq!(h.remote.paths().await, vec!["a.txt", "b.txt", "c.txt"]);
}

#[tokio::test]
async fn test_transient_failure_retried_until_success() {
    let h = Harness::new();
    h.write("a.txt", b"payload");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut objects = MockObjects::new();
    objects.expect_put_object().times(2).returning(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(BridgeError::Transient("HTTP 503".to_string()))
        } else {
            Ok(())
        }
    });

    let bus = EventBus::new(32);
    let mut events = bus.subscribe();
    let (tx, rx) = EventQueue::unbounded();
    tx.push(ChangeEvent::created(path("a.txt"))).await.unwrap();
    tx.stop();

    let stats = EventConsumer::new(rx, h.request_with_objects(Arc::new(objects)))
        .with_retry_policy(fast_retry(3))
        .with_event_bus(bus)
        .run()
        .await
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.retries, 1);
    assert!(h.store.get("a.txt").await.is_some());

    let events = collect_sync_events(&mut events);
    assert!(matches!(events[0], SyncEvent::ConsumerStarted));
    assert!(matches!(
        &events[1],
        SyncEvent::ItemRetrying { path, attempt: 1, .. } if path == "a.txt"
    ));
    assert!(matches!(
        &events[2],
        SyncEvent::ItemSynced { path, action } if path == "a.txt" && action == "upload"
    ));
    assert!(matches!(
        events[3],
        SyncEvent::ConsumerStopped { processed: 1, failed: 0 }
    ));
}

#[tokio::test]
async fn test_exhausted_retries_drop_event_and_continue() {
    let h = Harness::new();
    h.write("a.txt", b"first");
    h.write("b.txt", b"second");

    let mut objects = MockObjects::new();
    objects
        .expect_put_object()
        .withf(|key, _| key == "a.txt")
        .times(2)
        .returning(|_, _| Err(BridgeError::Transient("timeout".to_string())));
    objects
        .expect_put_object()
        .withf(|key, _| key == "b.txt")
        .times(1)
        .returning(|_, _| Ok(()));

    let (tx, rx) = EventQueue::unbounded();
    tx.push(ChangeEvent::created(path("a.txt"))).await.unwrap();
    tx.push(ChangeEvent::created(path("b.txt"))).await.unwrap();
    tx.stop();

    let stats = EventConsumer::new(rx, h.request_with_objects(Arc::new(objects)))
        .with_retry_policy(fast_retry(2))
        .run()
        .await
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.applied, 1);
    assert_eq!(h.store.paths().await, vec!["b.txt"]);
}

#[tokio::test]
async fn test_permanent_failure_not_retried() {
    let h = Harness::new();
    h.write("a.txt", b"secret");

    let mut objects = MockObjects::new();
    objects
        .expect_put_object()
        .times(1)
        .returning(|_, _| Err(BridgeError::Unauthorized("bad key".to_string())));

    let bus = EventBus::new(32);
    let mut events = bus.subscribe();
    let (tx, rx) = EventQueue::unbounded();
    tx.push(ChangeEvent::created(path("a.txt"))).await.unwrap();
    tx.stop();

    let stats = EventConsumer::new(rx, h.request_with_objects(Arc::new(objects)))
        .with_retry_policy(fast_retry(5))
        .with_event_bus(bus)
        .run()
        .await
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retries, 0);
    assert!(collect_sync_events(&mut events).iter().any(|e| matches!(
        e,
        SyncEvent::ItemFailed { attempts: 1, action, .. } if action == "upload"
    )));
}

#[tokio::test]
async fn test_startup_fails_without_root() {
    let h = Harness::new();
    std::fs::remove_dir_all(h.root()).unwrap();
    let (_tx, rx) = EventQueue::unbounded();

    let result = EventConsumer::new(rx, h.request()).run().await;

    assert!(matches!(result, Err(SyncError::Startup(_))));
}

#[tokio::test]
async fn test_startup_fails_when_store_unhealthy() {
    let h = Harness::new();
    h.store.set_unavailable(true);
    let (_tx, rx) = EventQueue::unbounded();

    let result = EventConsumer::new(rx, h.request()).run().await;

    assert!(matches!(result, Err(SyncError::Startup(_))));
}

#[tokio::test]
async fn test_initial_diff_brings_sides_together() {
    let h = Harness::new();
    // local only
    h.write("local.txt", b"L");
    // identical on both sides, record missing
    h.write("same.txt", b"S");
    h.objects.insert("same.txt", b"S").await;
    h.remote
        .insert(RemoteItem::new("same.txt", fingerprint(b"S"), 1))
        .await;
    // remote only
    h.objects.insert("remote.txt", b"R").await;
    h.remote
        .insert(RemoteItem::new("remote.txt", fingerprint(b"R"), 1))
        .await;
    // deleted locally since last sync
    h.store.insert("deleted.txt", b"D").await;
    h.objects.insert("deleted.txt", b"D").await;
    h.remote
        .insert(RemoteItem::new("deleted.txt", fingerprint(b"D"), 1))
        .await;

    let ignore = IgnoreRules::builtin();
    let diff = initial_diff_check(h.root(), h.fs.as_ref(), h.store.as_ref(), h.remote.as_ref(), &ignore)
        .await
        .unwrap();

    assert_eq!(
        diff.events
            .iter()
            .map(|e| (e.kind(), e.path().to_string()))
            .collect::<Vec<_>>(),
        vec![
            (ChangeKind::Removed, "deleted.txt".to_string()),
            (ChangeKind::Download, "remote.txt".to_string()),
            (ChangeKind::Created, "local.txt".to_string()),
        ]
    );

    let clock: Arc<dyn Clock> = Arc::new(FixedClock);
    assert_eq!(
        apply_repairs(&diff, h.store.as_ref(), clock.as_ref())
            .await
            .unwrap(),
        1
    );

    let (mut producer, rx) = h.producer();
    let handle = EventConsumer::new(rx, h.request()).run().await.unwrap();
    producer.push_source(EventSource::Seeded(diff)).await.unwrap();
    let stats = handle.shutdown().await.unwrap();

    assert_eq!(stats.failed, 0);
    assert_eq!(h.read("remote.txt").unwrap(), b"R");
    assert_eq!(
        h.remote.paths().await,
        vec!["local.txt", "remote.txt", "same.txt"]
    );
    assert_eq!(
        h.store.paths().await,
        vec!["local.txt", "remote.txt", "same.txt"]
    );

    let again = initial_diff_check(h.root(), h.fs.as_ref(), h.store.as_ref(), h.remote.as_ref(), &ignore)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_initial_diff_skips_broken_symlinks() {
    let h = Harness::new();
    h.write("a.txt", b"A");
    std::os::unix::fs::symlink(h.abs("missing-target"), h.abs("broken-link")).unwrap();
    std::fs::create_dir_all(h.abs("nested")).unwrap();
    std::os::unix::fs::symlink(h.root(), h.abs("nested/loop")).unwrap();

    let diff = initial_diff_check(
        h.root(),
        h.fs.as_ref(),
        h.store.as_ref(),
        h.remote.as_ref(),
        &IgnoreRules::builtin(),
    )
    .await
    .unwrap();

    assert_eq!(
        diff.events.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        vec!["created a.txt"]
    );
}

#[tokio::test]
async fn test_pipeline_with_sqlite_store() {
    let h = Harness::new();
    h.write("notes/a.txt", b"alpha");
    let store: Arc<dyn LocalMetadataStore> =
        Arc::new(SqliteMetadataStore::in_memory().await.unwrap());
    let request = ItemRequest::new(
        h.root.clone(),
        h.fs.clone(),
        h.remote.clone(),
        h.objects.clone(),
        store.clone(),
        Arc::new(FixedClock),
    );

    let (tx, rx) = EventQueue::bounded(4);
    let handle = EventConsumer::new(rx, request).run().await.unwrap();
    tx.push(ChangeEvent::created(path("notes/a.txt"))).await.unwrap();
    h.rename("notes/a.txt", "notes/b.txt");
    tx.push(ChangeEvent::renamed(path("notes/a.txt"), path("notes/b.txt")))
        .await
        .unwrap();
    let stats = handle.shutdown().await.unwrap();

    assert_eq!(stats.applied, 2);
    let records = store.all_records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, "notes/b.txt");
    assert_eq!(records[0].fingerprint, fingerprint(b"alpha"));
    assert_eq!(h.remote.paths().await, vec!["notes/b.txt"]);
    assert_eq!(h.objects.keys().await, vec!["notes/b.txt"]);
}
