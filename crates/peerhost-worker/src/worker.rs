//! Inbox worker pool: event-driven wakeups or polling, bounded concurrency and
//! stale-pop recovery.
//!
//! Shutdown: [`InboxWorker::shutdown`] stops the pool from popping new items and
//! waits (bounded by [`SHUTDOWN_GRACE`]) for in-flight items to settle. Items still
//! running after the grace period stay popped and are recovered on the next start.

use chrono::Utc;
use peerhost_core::config::InboxWorkerSettings;
use peerhost_transit::{EventBus, TransitEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::processor::InboxProcessor;

/// How long shutdown waits for in-flight items.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct InboxWorkerConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    pub max_attempts: u32,
    /// Items popped longer ago than this are returned to pending. 0 disables recovery.
    pub stale_pop_secs: u64,
}

impl Default for InboxWorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            batch_size: 10,
            max_attempts: 5,
            stale_pop_secs: 300,
        }
    }
}

impl From<&InboxWorkerSettings> for InboxWorkerConfig {
    fn from(settings: &InboxWorkerSettings) -> Self {
        Self {
            max_workers: settings.max_workers,
            poll_interval_ms: settings.poll_interval_ms,
            batch_size: settings.batch_size,
            max_attempts: settings.max_attempts,
            stale_pop_secs: settings.stale_pop_secs,
        }
    }
}

pub struct InboxWorker {
    config: InboxWorkerConfig,
    shutdown_tx: mpsc::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl InboxWorker {
    /// Spawn the worker pool.
    ///
    /// The pool wakes whenever the event bus reports a new inbox item, and otherwise
    /// every `poll_interval_ms`.
    pub fn start(processor: Arc<InboxProcessor>, events: &EventBus, config: InboxWorkerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (notify_tx, notify_rx) = mpsc::channel::<()>(16);

        tokio::spawn(forward_inbox_events(events.subscribe(), notify_tx.clone()));

        let pool_config = config.clone();
        let handle = tokio::spawn(async move {
            Self::worker_pool(processor, pool_config, shutdown_rx, notify_tx, notify_rx).await;
        });

        Self {
            config,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn config(&self) -> &InboxWorkerConfig {
        &self.config
    }

    async fn worker_pool(
        processor: Arc<InboxProcessor>,
        config: InboxWorkerConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
        notify_tx: mpsc::Sender<()>,
        mut notify_rx: mpsc::Receiver<()>,
    ) {
        let max_workers = config.max_workers.max(1);
        tracing::info!(
            max_workers,
            poll_interval_ms = config.poll_interval_ms,
            batch_size = config.batch_size,
            max_attempts = config.max_attempts,
            "Inbox worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        let (reaper_shutdown_tx, reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.stale_pop_secs > 0 {
            tokio::spawn(Self::stale_pop_reaper(
                processor.clone(),
                config.stale_pop_secs,
                reaper_shutdown_rx,
            ));
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Inbox worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch(&processor, &semaphore, &config, &notify_tx).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch(&processor, &semaphore, &config, &notify_tx).await;
                }
            }
        }

        let permits = u32::try_from(max_workers).unwrap_or(u32::MAX);
        match tokio::time::timeout(SHUTDOWN_GRACE, semaphore.acquire_many(permits)).await {
            Ok(_) => tracing::info!("Inbox worker pool stopped"),
            Err(_) => tracing::warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Inbox worker pool stopped with items still in flight"
            ),
        };
    }

    /// Pop as many items as there are free workers (up to `batch_size`) and spawn one
    /// task per item.
    async fn claim_and_dispatch(
        processor: &Arc<InboxProcessor>,
        semaphore: &Arc<Semaphore>,
        config: &InboxWorkerConfig,
        notify_tx: &mpsc::Sender<()>,
    ) {
        let batch_size = config.batch_size.max(1) as usize;
        let mut permits = Vec::with_capacity(batch_size);
        while permits.len() < batch_size {
            match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permits.push(permit),
                Err(_) => break,
            }
        }
        if permits.is_empty() {
            tracing::debug!("No workers available, skipping pop");
            return;
        }

        let count = u32::try_from(permits.len()).unwrap_or(u32::MAX);
        let items = match processor.inbox().pop(count).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, "Failed to pop inbox items");
                return;
            }
        };

        if items.is_empty() {
            tracing::trace!("Inbox is empty");
            return;
        }

        let full_batch = items.len() == permits.len();
        for (item, permit) in items.into_iter().zip(permits) {
            let processor = processor.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = processor.process_item(&item).await {
                    tracing::error!(error = %e, item_id = %item.id, "Failed to settle inbox item");
                }
            });
        }

        // More may be waiting; come back without sleeping.
        if full_batch {
            let _ = notify_tx.try_send(());
        }
    }

    async fn stale_pop_reaper(
        processor: Arc<InboxProcessor>,
        stale_pop_secs: u64,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let stale_after = chrono::Duration::seconds(i64::try_from(stale_pop_secs).unwrap_or(i64::MAX));
        let mut interval = tokio::time::interval(Duration::from_secs(stale_pop_secs.div_ceil(2)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let cutoff = Utc::now() - stale_after;
                    if let Err(e) = processor.inbox().recover_dead(cutoff).await {
                        tracing::error!(error = %e, "Stale inbox item recovery failed");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    /// Stop popping new items and wait for in-flight items to settle.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating inbox worker shutdown");
        let _ = self.shutdown_tx.send(()).await;
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Inbox worker pool task failed");
            }
        }
    }
}

/// Turn inbox-related transit events into pool wakeups.
async fn forward_inbox_events(
    mut events: broadcast::Receiver<TransitEvent>,
    notify_tx: mpsc::Sender<()>,
) {
    loop {
        let wake = match events.recv().await {
            Ok(TransitEvent::FileReceived { .. })
            | Ok(TransitEvent::DeleteLinkedFileReceived { .. })
            | Ok(TransitEvent::ReadReceiptReceived { .. }) => true,
            Ok(TransitEvent::CommandMessageReceived { .. }) => false,
            // Missed events may have been inbox items.
            Err(broadcast::error::RecvError::Lagged(_)) => true,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if wake {
            if let Err(mpsc::error::TrySendError::Closed(_)) = notify_tx.try_send(()) {
                break;
            }
        }
    }
}
