//! Event consumer
//!
//! Pops events from the queue one at a time and turns each into item
//! requests. Transient failures are retried in place with backoff, so events
//! for the same path are never reordered. Permanent failures drop the event
//! and move on.
//!
//! ## Dispatch
//!
//! | Event | Actions |
//! |-------|---------|
//! | `Created`, `Modified` | upload |
//! | `Renamed` | rename (upload of the new path if the old one was never synced) |
//! | `Removed` | remove, then local remove |
//! | `Download` | download |

use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::event::{ChangeEvent, ChangeKind};
use crate::item_request::{ItemRequest, Outcome};
use crate::queue::{QueueReceiver, StopHandle};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Events taken off the queue
    pub processed: u64,
    /// Events whose actions took effect
    pub applied: u64,
    /// Events that were already in sync
    pub unchanged: u64,
    /// Events dropped after a permanent failure or exhausted retries
    pub failed: u64,
    /// Retry attempts across all events
    pub retries: u64,
}

pub struct EventConsumer {
    queue: QueueReceiver,
    request: ItemRequest,
    retry: RetryPolicy,
    event_bus: Option<EventBus>,
}

impl EventConsumer {
    pub fn new(queue: QueueReceiver, request: ItemRequest) -> Self {
        Self {
            queue,
            request,
            retry: RetryPolicy::default(),
            event_bus: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Validate the environment and start the worker task.
    ///
    /// Fails without spawning anything if the watched root is not a readable
    /// directory or the local store does not answer.
    pub async fn run(self) -> Result<ConsumerHandle> {
        let root = self.request.root().to_path_buf();
        match self.request.file_system().metadata(&root).await {
            Ok(metadata) if metadata.is_directory => {}
            Ok(_) => {
                return Err(SyncError::Startup(format!(
                    "{} is not a directory",
                    root.display()
                )))
            }
            Err(e) => {
                return Err(SyncError::Startup(format!(
                    "watched root {} is not accessible: {}",
                    root.display(),
                    e
                )))
            }
        }

        self.request
            .store()
            .health_check()
            .await
            .map_err(|e| SyncError::Startup(format!("local store unavailable: {}", e)))?;

        let stop = self.queue.stop_handle();
        let task = tokio::spawn(self.work());

        Ok(ConsumerHandle { stop, task })
    }

    async fn work(mut self) -> ConsumerStats {
        info!("Event consumer started");
        self.emit(SyncEvent::ConsumerStarted);

        let mut stats = ConsumerStats::default();
        while let Some(queued) = self.queue.pop().await {
            stats.processed += 1;
            match self.process(&queued.event, &mut stats).await {
                Ok(Outcome::Applied) => stats.applied += 1,
                Ok(Outcome::Unchanged) => stats.unchanged += 1,
                Err(_) => stats.failed += 1,
            }
        }

        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Event consumer stopped"
        );
        self.emit(SyncEvent::ConsumerStopped {
            processed: stats.processed,
            failed: stats.failed,
        });
        stats
    }

    #[instrument(skip(self, event, stats), fields(event = %event))]
    async fn process(&self, event: &ChangeEvent, stats: &mut ConsumerStats) -> Result<Outcome> {
        let action = action_name(event.kind());
        let path = event.path().to_string();
        let mut attempt = 1;

        loop {
            match self.dispatch(event).await {
                Ok(outcome) => {
                    if outcome == Outcome::Applied {
                        self.emit(SyncEvent::ItemSynced {
                            path: path.clone(),
                            action: action.to_string(),
                        });
                    }
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() && self.retry.allows_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {}",
                        e
                    );
                    self.emit(SyncEvent::ItemRetrying {
                        path: path.clone(),
                        action: action.to_string(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        message: e.to_string(),
                    });

                    stats.retries += 1;
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempts = attempt, "Dropping event: {}", e);
                    self.emit(SyncEvent::ItemFailed {
                        path,
                        action: action.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }
    }

    async fn dispatch(&self, event: &ChangeEvent) -> Result<Outcome> {
        let path = event.path();
        match event.kind() {
            ChangeKind::Created | ChangeKind::Modified => self.request.upload(path).await,
            ChangeKind::Renamed => match event.old_path() {
                Some(old) => self.request.rename(old, path).await,
                None => self.request.upload(path).await,
            },
            ChangeKind::Removed => {
                let remote = self.request.remove(path).await?;
                let local = self.request.local_remove(path).await?;
                Ok(if remote == Outcome::Applied || local == Outcome::Applied {
                    Outcome::Applied
                } else {
                    Outcome::Unchanged
                })
            }
            ChangeKind::Download => self.request.download(path).await,
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}

fn action_name(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Created | ChangeKind::Modified => "upload",
        ChangeKind::Renamed => "rename",
        ChangeKind::Removed => "remove",
        ChangeKind::Download => "download",
    }
}

/// Handle to a running consumer
pub struct ConsumerHandle {
    stop: StopHandle,
    task: JoinHandle<ConsumerStats>,
}

impl ConsumerHandle {
    /// Stop accepting events. The worker drains what is already queued.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker to exit.
    pub async fn join(self) -> Result<ConsumerStats> {
        self.task
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))
    }

    /// Stop and wait for the drain to finish.
    pub async fn shutdown(self) -> Result<ConsumerStats> {
        self.stop();
        self.join().await
    }
}
