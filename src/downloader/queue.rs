//! Work queue and worker pool
//!
//! A bounded channel feeds a fixed number of worker tasks. The producer waits
//! until every enqueued item has been fully processed, then sends one
//! [`QueueMessage::Shutdown`] per worker and joins them all.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use tracing::{Instrument, Level, debug, error, info, span, trace};

use super::models::{QueueMessage, RunSummary, WorkItem};
use super::unit::DownloadUnit;

/// Counts items that were enqueued but not yet fully processed.
#[derive(Debug)]
pub struct DrainTracker {
    outstanding: watch::Sender<usize>,
}

impl Default for DrainTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainTracker {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self { outstanding }
    }

    /// Registers an item. Must happen before the item is enqueued.
    pub fn add(&self) {
        self.outstanding.send_modify(|n| *n += 1);
    }

    /// Marks a registered item as processed.
    pub fn complete(&self) {
        self.outstanding.send_modify(|n| {
            debug_assert!(*n > 0, "completed more items than were registered");
            *n = n.saturating_sub(1);
        });
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolves once every registered item has completed.
    pub async fn wait_drained(&self) {
        let mut rx = self.outstanding.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<QueueMessage>>>;

#[derive(Debug)]
pub struct Pipeline {
    unit: Arc<DownloadUnit>,
    workers: usize,
    queue_capacity: usize,
    tracker: Arc<DrainTracker>,
}

impl Pipeline {
    /// A pipeline whose queue holds as many items as there are workers.
    pub fn new(unit: DownloadUnit, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            unit: Arc::new(unit),
            workers,
            queue_capacity: workers,
            tracker: Arc::new(DrainTracker::new()),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Processes every item and returns once all workers have exited.
    pub async fn run(&self, items: Vec<WorkItem>) -> RunSummary {
        info!(
            workers = self.workers,
            capacity = self.queue_capacity,
            items = items.len(),
            "Initializing queue"
        );

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));

        let handles: Vec<JoinHandle<RunSummary>> = (0..self.workers)
            .map(|worker_id| self.spawn_worker(worker_id, rx.clone()))
            .collect();

        for item in items {
            self.tracker.add();
            if let Err(e) = tx.send(QueueMessage::Work(item)).await {
                error!(error = %e, "Work queue closed before the item could be enqueued");
                self.tracker.complete();
            }
        }

        debug!("All items enqueued, waiting for the queue to drain");
        self.tracker.wait_drained().await;

        for _ in 0..self.workers {
            if tx.send(QueueMessage::Shutdown).await.is_err() {
                break;
            }
        }

        let mut summary = RunSummary::default();
        for result in join_all(handles).await {
            match result {
                Ok(report) => summary.merge(report),
                Err(e) => error!(error = %e, "Worker task failed"),
            }
        }

        info!(%summary, "Download run finished");
        summary
    }

    fn spawn_worker(&self, worker_id: usize, rx: SharedReceiver) -> JoinHandle<RunSummary> {
        let unit = self.unit.clone();
        let tracker = self.tracker.clone();
        let worker_span = span!(Level::DEBUG, "worker", id = worker_id);

        tokio::spawn(
            async move {
                let mut report = RunSummary::default();
                loop {
                    let message = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };

                    match message {
                        Some(QueueMessage::Work(item)) => {
                            let outcome = unit.process(&item).await;
                            report.record(&outcome);
                            tracker.complete();
                        }
                        Some(QueueMessage::Shutdown) | None => break,
                    }
                }
                trace!(processed = report.processed(), "Worker exiting");
                report
            }
            .instrument(worker_span),
        )
    }
}
