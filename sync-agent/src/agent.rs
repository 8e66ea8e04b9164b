//! Wiring of the desktop adapters into the sync pipeline.
//!
//! Startup order matters: the diff is computed and its repairs applied
//! before the consumer starts, the consumer must be running before the diff
//! is seeded, and the watcher starts last so live events queue behind the
//! seeded ones.

use anyhow::{Context, Result};
use bridge_desktop::{
    HttpMetadataClient, HttpObjectStore, ObjectStoreConfig, SqliteMetadataStore, TokioFileSystem,
};
use bridge_traits::{
    metadata::LocalMetadataStore,
    remote::{ObjectStore, RemoteMetadataService},
    storage::FileSystemAccess,
    time::{Clock, SystemClock},
};
use core_runtime::config::AgentConfig;
use core_runtime::events::{
    CoreEvent, EventBus, EventSeverity, EventStream, RecvError, SyncEvent, WatcherEvent,
};
use core_runtime::logging::loggable_path;
use core_sync::{
    apply_repairs, initial_diff_check, ChangeKind, ConsumerHandle, EventConsumer, EventFilter,
    EventProducer, EventQueue, EventSource, FolderWatcher, IgnoreRules, ItemRequest, RetryPolicy,
    ServerDiffList,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

struct Adapters {
    fs: Arc<dyn FileSystemAccess>,
    store: Arc<dyn LocalMetadataStore>,
    remote: Arc<dyn RemoteMetadataService>,
    objects: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
}

impl Adapters {
    async fn connect(config: &AgentConfig) -> Result<Self> {
        let store = SqliteMetadataStore::open(&config.database_path)
            .await
            .with_context(|| {
                format!(
                    "cannot open local database {}",
                    config.database_path.display()
                )
            })?;

        let remote = HttpMetadataClient::new(
            &config.metadata_service.host,
            config.metadata_service.port,
        )
        .context("invalid metadata service endpoint")?;

        let objects = HttpObjectStore::new(ObjectStoreConfig {
            host: config.object_store.host.clone(),
            port: config.object_store.port,
            access_id: config.object_store.access_id.clone(),
            secret: config.object_store.secret.clone(),
            bucket: config.object_store.bucket.clone(),
        })
        .context("invalid object store settings")?;

        Ok(Self {
            fs: Arc::new(TokioFileSystem::new()),
            store: Arc::new(store),
            remote: Arc::new(remote),
            objects: Arc::new(objects),
            clock: Arc::new(SystemClock),
        })
    }
}

pub struct Agent {
    watcher: FolderWatcher,
    consumer: ConsumerHandle,
    event_bus: EventBus,
}

impl Agent {
    /// Compute the startup diff without changing anything.
    pub async fn plan(config: &AgentConfig) -> Result<ServerDiffList> {
        let adapters = Adapters::connect(config).await?;
        let ignore = IgnoreRules::new(config.sync.ignore.as_slice())?;
        let diff = initial_diff_check(
            &config.root,
            adapters.fs.as_ref(),
            adapters.store.as_ref(),
            adapters.remote.as_ref(),
            &ignore,
        )
        .await?;
        Ok(diff)
    }

    pub async fn start(config: AgentConfig) -> Result<Self> {
        let adapters = Adapters::connect(&config).await?;
        let ignore = IgnoreRules::new(config.sync.ignore.as_slice())?;
        let event_bus = EventBus::default();
        spawn_event_logger(&event_bus);

        let diff = initial_diff_check(
            &config.root,
            adapters.fs.as_ref(),
            adapters.store.as_ref(),
            adapters.remote.as_ref(),
            &ignore,
        )
        .await
        .context("initial diff check failed")?;

        let repaired = apply_repairs(&diff, adapters.store.as_ref(), adapters.clock.as_ref()).await?;
        event_bus
            .emit(CoreEvent::Sync(SyncEvent::DiffComputed {
                removals: diff.count(ChangeKind::Removed),
                downloads: diff.count(ChangeKind::Download),
                uploads: diff.count(ChangeKind::Created) + diff.count(ChangeKind::Modified),
                repairs: repaired,
            }))
            .ok();

        let (sender, receiver) = EventQueue::new(config.sync.queue_capacity);

        let request = ItemRequest::new(
            config.root.clone(),
            adapters.fs.clone(),
            adapters.remote.clone(),
            adapters.objects.clone(),
            adapters.store.clone(),
            adapters.clock.clone(),
        );
        let consumer = EventConsumer::new(receiver, request)
            .with_retry_policy(RetryPolicy::from(&config.sync.retry))
            .with_event_bus(event_bus.clone())
            .run()
            .await
            .context("event consumer failed to start")?;

        let filter = EventFilter::new(
            config.root.clone(),
            adapters.fs.clone(),
            adapters.store.clone(),
            ignore,
        )
        .with_debounce(Duration::from_millis(config.sync.debounce_ms));
        let mut producer = EventProducer::new(
            config.root.clone(),
            adapters.fs.clone(),
            adapters.store.clone(),
            filter,
            sender,
        );

        info!(events = diff.events.len(), "Seeding startup diff");
        producer.push_source(EventSource::Seeded(diff)).await?;

        let watcher = match FolderWatcher::start(
            config.root.clone(),
            producer,
            Some(event_bus.clone()),
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                consumer.stop();
                consumer.join().await.ok();
                return Err(e).context("folder watcher failed to start");
            }
        };

        Ok(Self {
            watcher,
            consumer,
            event_bus,
        })
    }

    /// Stop watching, then let the consumer drain what is queued.
    pub async fn shutdown(self) -> Result<()> {
        let produced = self.watcher.stop().await?;
        self.consumer.stop();
        let stats = self.consumer.join().await?;

        info!(
            accepted = produced.accepted,
            dropped = produced.dropped,
            processed = stats.processed,
            failed = stats.failed,
            subscribers = self.event_bus.subscriber_count(),
            "Sync agent stopped"
        );
        Ok(())
    }
}

/// Surface dropped events and watcher state to the operator log.
fn spawn_event_logger(event_bus: &EventBus) {
    let mut events = EventStream::new(event_bus.subscribe()).filter(|event| {
        event.severity() >= EventSeverity::Error
            || matches!(event, CoreEvent::Sync(SyncEvent::DiffComputed { .. }))
    });
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagging");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                CoreEvent::Sync(SyncEvent::ItemFailed {
                    path,
                    action,
                    attempts,
                    message,
                }) => {
                    error!(
                        path = %loggable_path(&path),
                        action = %action,
                        attempts,
                        "Change could not be synced: {}",
                        message
                    );
                }
                CoreEvent::Sync(SyncEvent::DiffComputed {
                    removals,
                    downloads,
                    uploads,
                    repairs,
                }) => {
                    info!(removals, downloads, uploads, repairs, "Startup diff ready");
                }
                CoreEvent::Watcher(WatcherEvent::Error { message }) => {
                    warn!("Watcher reported an error: {}", message);
                }
                _ => {}
            }
        }
    });
}
