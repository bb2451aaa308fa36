mod apply;
mod backlog;
mod error;
pub mod queue;
pub mod shutdown;
pub mod types;
pub mod watcher;
pub mod worker_pool;

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod test_support;

pub use apply::{apply_record, sync_account, ApplyOutcome};
pub use backlog::sync_backlog;
pub use error::Error;
pub use queue::{JobQueue, JobReceiver, JobSender, QueueError};
pub use shutdown::ShutdownCoordinator;
pub use types::{BacklogSummary, DrainSummary, Job, SyncSettings, Watermark, WorkerSummary};
pub use watcher::{PollOutcome, Watcher};
pub use worker_pool::WorkerPool;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::db::models::RecordInfo;
use crate::record_store::RecordStore;
use crate::server::monitoring::SYNC_METRICS;
use crate::zone::{ZoneAdapter, ZoneTranslator, CONTENT_KEYS};

/// Wires the record store and zone adapter into the backlog + live pipeline.
pub struct SyncService<S: ?Sized, Z: ?Sized> {
    store: Arc<S>,
    zone: Arc<Z>,
    translator: ZoneTranslator,
    settings: SyncSettings,
}

impl<S, Z> SyncService<S, Z>
where
    S: RecordStore + ?Sized + 'static,
    Z: ZoneAdapter + ?Sized + 'static,
{
    pub fn new(
        store: Arc<S>,
        zone: Arc<Z>,
        translator: ZoneTranslator,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            zone,
            translator,
            settings,
        }
    }

    async fn snapshot(&self) -> Result<Vec<RecordInfo>, Error> {
        let snapshot = self.store.find_records_by_keys(&CONTENT_KEYS).await?;
        info!(records = snapshot.len(), "loaded startup snapshot");
        Ok(snapshot)
    }

    /// Starts the live pipeline.
    ///
    /// The watcher is spawned from the snapshot's watermark before the backlog pass runs, so
    /// records created during the pass are queued rather than missed. Workers only start once
    /// the pass returns. A failed snapshot read is fatal.
    pub async fn start(&self, coordinator: &ShutdownCoordinator) -> Result<RunningSync, Error> {
        let snapshot = self.snapshot().await?;
        let watermark = Watermark::from_snapshot(&snapshot, |record| record.id);
        let capacity = self
            .settings
            .queue_capacity
            .unwrap_or(snapshot.len())
            .max(1);

        let (sender, receiver) = JobQueue::bounded(capacity);
        if let Some(metrics) = SYNC_METRICS.get() {
            metrics.watermark.set(watermark.id().unwrap_or(-1));
        }
        info!(%watermark, capacity, "starting watcher");

        let watcher = Watcher::new(self.store.clone(), sender, watermark);
        let watcher_handle =
            coordinator.spawn(watcher.run(self.settings.poll_interval, coordinator.token()));

        let backlog = if self.settings.skip_backlog {
            info!(records = snapshot.len(), "backlog pass skipped");
            BacklogSummary {
                total: snapshot.len(),
                skipped: snapshot.len(),
                ..Default::default()
            }
        } else {
            sync_backlog(
                &snapshot,
                &self.translator,
                self.zone.as_ref(),
                &coordinator.token(),
            )
            .await
        };

        let pool = WorkerPool::spawn(
            self.settings.worker_count,
            receiver.clone(),
            self.store.clone(),
            self.zone.clone(),
            self.translator.clone(),
            coordinator,
        );
        info!(workers = pool.len(), "worker pool started");

        Ok(RunningSync {
            backlog,
            watcher: watcher_handle,
            pool,
            receiver,
        })
    }

    /// Snapshot plus backlog pass only, for one-shot runs.
    pub async fn backlog_only(
        &self,
        coordinator: &ShutdownCoordinator,
    ) -> Result<BacklogSummary, Error> {
        let snapshot = self.snapshot().await?;
        Ok(sync_backlog(
            &snapshot,
            &self.translator,
            self.zone.as_ref(),
            &coordinator.token(),
        )
        .await)
    }
}

/// Handles to a started pipeline. Only the owner of this value waits on its tasks.
pub struct RunningSync {
    backlog: BacklogSummary,
    watcher: JoinHandle<Watermark>,
    pool: WorkerPool,
    receiver: JobReceiver,
}

impl RunningSync {
    pub fn backlog(&self) -> BacklogSummary {
        self.backlog
    }

    pub fn queued_jobs(&self) -> usize {
        self.receiver.len()
    }

    /// Cancels, waits on the barrier, then collects what each task reported.
    ///
    /// Once this returns, nothing reads the store or writes the zone. Jobs still queued are
    /// left for the next startup's backlog.
    pub async fn drain(self, coordinator: &ShutdownCoordinator) -> Result<DrainSummary, Error> {
        coordinator.cancel();
        coordinator.await_drain().await;

        let final_watermark = self.watcher.await?;
        let workers = match self.pool.wait_for_completion().await {
            Ok(summary) => summary,
            Err(err) => {
                error!(error = %err, partial = ?err.partial, "worker pool shut down with errors");
                return Err(Error::Orchestration(err.to_string()));
            }
        };

        let summary = DrainSummary {
            final_watermark,
            workers,
            abandoned_jobs: self.receiver.len(),
        };
        info!(
            watermark = %summary.final_watermark,
            processed = summary.workers.processed(),
            failed = summary.workers.failed,
            coalesced = summary.workers.coalesced,
            abandoned = summary.abandoned_jobs,
            "sync pipeline drained"
        );
        Ok(summary)
    }
}
