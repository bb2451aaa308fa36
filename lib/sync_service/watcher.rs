use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::{JobSender, QueueError};
use super::types::{Job, Watermark};
use crate::record_store::RecordStore;
use crate::server::monitoring::SYNC_METRICS;
use crate::zone::CONTENT_KEYS;

/// How one poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Number of jobs pushed this round.
    Pushed(usize),
    /// The store query failed; retried on the next tick.
    QueryFailed,
    /// A push was abandoned because of shutdown or a closed queue.
    Interrupted(usize),
}

/// Polls for records newer than the watermark and forwards their accounts.
///
/// The watcher is the only writer of its watermark.
pub struct Watcher<S> {
    store: S,
    sender: JobSender,
    watermark: Watermark,
}

impl<S: RecordStore> Watcher<S> {
    pub fn new(store: S, sender: JobSender, watermark: Watermark) -> Self {
        Self {
            store,
            sender,
            watermark,
        }
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// One poll iteration. The watermark moves past a record only once its job is queued.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> PollOutcome {
        let records = match self
            .store
            .find_records_after(self.watermark, &CONTENT_KEYS)
            .await
        {
            Ok(records) => records,
            Err(err) => {
                if let Some(metrics) = SYNC_METRICS.get() {
                    metrics.poll_failures_total.inc();
                }
                warn!(watermark = %self.watermark, error = %err, "record poll failed");
                return PollOutcome::QueryFailed;
            }
        };

        let mut pushed = 0;
        for record in records {
            // Rows arrive sorted; anything at or below the watermark was already queued.
            if !self.watermark.is_before(record.id) {
                continue;
            }

            match self.sender.push(Job::new(record.account.as_str()), cancel).await {
                Ok(()) => {
                    self.watermark.advance_to(record.id);
                    pushed += 1;
                    if let Some(metrics) = SYNC_METRICS.get() {
                        metrics.jobs_enqueued_total.inc();
                        metrics.watermark.set(record.id);
                        metrics.queue_depth.set(self.sender.len() as i64);
                    }
                    debug!(record_id = record.id, account = %record.account, "queued account");
                }
                Err(QueueError::Cancelled) => {
                    debug!(record_id = record.id, "push abandoned on shutdown");
                    return PollOutcome::Interrupted(pushed);
                }
                Err(QueueError::Closed) => {
                    warn!(record_id = record.id, "job queue closed, record left for next start");
                    return PollOutcome::Interrupted(pushed);
                }
            }
        }

        PollOutcome::Pushed(pushed)
    }

    /// Polls on `interval` until `cancel` fires, then returns the final watermark.
    ///
    /// A poll that is underway when cancellation arrives finishes its bookkeeping first.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) -> Watermark {
        info!(watermark = %self.watermark, ?interval, "watcher started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let PollOutcome::Interrupted(_) = self.poll_once(&cancel).await {
                        if cancel.is_cancelled() {
                            break;
                        }
                    }
                }
            }
        }

        info!(watermark = %self.watermark, "watcher stopped");
        self.watermark
    }
}
