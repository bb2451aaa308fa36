use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::apply::{sync_account, ApplyOutcome};
use super::queue::JobReceiver;
use super::shutdown::ShutdownCoordinator;
use super::types::{Job, WorkerSummary};
use crate::record_store::RecordStore;
use crate::server::monitoring::SYNC_METRICS;
use crate::zone::{ZoneAdapter, ZoneTranslator};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker {worker_id} task joined with an error: {message}")]
    JoinError { worker_id: usize, message: String },
}

#[derive(Error, Debug)]
pub struct ShutdownError {
    pub errors: Vec<WorkerError>,
    /// Totals from the workers that did exit cleanly.
    pub partial: WorkerSummary,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Errors during shutdown: {:?}", self.errors)
    }
}

/// Accounts currently being synced, each with a pending re-run flag.
///
/// A job for an account that is already in flight is folded into the running
/// one: the owner re-reads the account once more after its current apply, so
/// an older read can never land after a newer one.
#[derive(Default)]
struct InFlightAccounts {
    accounts: Mutex<HashMap<String, bool>>,
}

impl InFlightAccounts {
    /// Returns `true` if the caller now owns `account`. Otherwise marks the
    /// owner to re-run it.
    fn claim(&self, account: &str) -> bool {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        match accounts.entry(account.to_string()) {
            Entry::Occupied(mut owned) => {
                owned.insert(true);
                false
            }
            Entry::Vacant(free) => {
                free.insert(false);
                true
            }
        }
    }

    /// Called by the owner after each pass. Returns `true` if another pass is
    /// owed, otherwise releases the account.
    fn finish_pass(&self, account: &str) -> bool {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        let rerun = accounts.get(account).copied().unwrap_or(false);
        if rerun {
            accounts.insert(account.to_string(), false);
        } else {
            accounts.remove(account);
        }
        rerun
    }
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<WorkerSummary>>,
}

impl WorkerPool {
    /// Starts `num_workers` consumers on the shared queue, tracked by `coordinator`.
    pub fn spawn<S, Z>(
        num_workers: usize,
        receiver: JobReceiver,
        store: Arc<S>,
        zone: Arc<Z>,
        translator: ZoneTranslator,
        coordinator: &ShutdownCoordinator,
    ) -> Self
    where
        S: RecordStore + ?Sized + 'static,
        Z: ZoneAdapter + ?Sized + 'static,
    {
        let in_flight = Arc::new(InFlightAccounts::default());
        let workers = (0..num_workers.max(1))
            .map(|worker_id| {
                let worker_in_flight = in_flight.clone();
                let worker_receiver = receiver.clone();
                let worker_store = store.clone();
                let worker_zone = zone.clone();
                let worker_translator = translator.clone();
                let worker_token = coordinator.token();
                coordinator.spawn(async move {
                    worker(
                        worker_id,
                        worker_receiver,
                        worker_in_flight,
                        worker_store,
                        worker_zone,
                        worker_translator,
                        worker_token,
                    )
                    .await
                })
            })
            .collect();
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub async fn wait_for_completion(self) -> Result<WorkerSummary, ShutdownError> {
        let mut errors = vec![];
        let mut summary = WorkerSummary::default();
        for (worker_id, handle) in self.workers.into_iter().enumerate() {
            match handle.await {
                Ok(worker_summary) => summary.merge(worker_summary),
                Err(e) => errors.push(WorkerError::JoinError {
                    worker_id,
                    message: e.to_string(),
                }),
            }
        }

        if errors.is_empty() {
            Ok(summary)
        } else {
            Err(ShutdownError {
                errors,
                partial: summary,
            })
        }
    }
}

async fn worker<S, Z>(
    worker_id: usize,
    receiver: JobReceiver,
    in_flight: Arc<InFlightAccounts>,
    store: Arc<S>,
    zone: Arc<Z>,
    translator: ZoneTranslator,
    cancel: CancellationToken,
) -> WorkerSummary
where
    S: RecordStore + ?Sized,
    Z: ZoneAdapter + ?Sized,
{
    let mut summary = WorkerSummary::default();
    if let Some(metrics) = SYNC_METRICS.get() {
        metrics.live_workers.inc();
    }
    debug!(worker_id, "worker started");

    loop {
        let job: Job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = receiver.recv() => match next {
                Some(job) => job,
                None => break,
            },
        };
        if let Some(metrics) = SYNC_METRICS.get() {
            metrics.queue_depth.set(receiver.len() as i64);
        }

        if !in_flight.claim(&job.account) {
            summary.coalesced += 1;
            if let Some(metrics) = SYNC_METRICS.get() {
                metrics.jobs_coalesced_total.inc();
            }
            debug!(
                worker_id,
                account = %job.account,
                "account already in flight, folded into re-run"
            );
            continue;
        }

        // Once dequeued, a job and the re-runs folded into it complete even after cancellation.
        loop {
            match sync_account(&translator, store.as_ref(), zone.as_ref(), &job.account).await {
                Ok(outcome) => {
                    match outcome {
                        ApplyOutcome::Applied => summary.applied += 1,
                        ApplyOutcome::Removed => summary.removed += 1,
                    }
                    if let Some(metrics) = SYNC_METRICS.get() {
                        metrics.jobs_succeeded_total.inc();
                        if outcome == ApplyOutcome::Removed {
                            metrics.entries_removed_total.inc();
                        }
                    }
                }
                Err(err) => {
                    summary.failed += 1;
                    if let Some(metrics) = SYNC_METRICS.get() {
                        metrics.jobs_failed_total.inc();
                    }
                    warn!(worker_id, account = %job.account, error = %err, "job failed, dropping");
                }
            }
            if !in_flight.finish_pass(&job.account) {
                break;
            }
        }
    }

    if let Some(metrics) = SYNC_METRICS.get() {
        metrics.live_workers.dec();
    }
    info!(
        worker_id,
        applied = summary.applied,
        removed = summary.removed,
        failed = summary.failed,
        coalesced = summary.coalesced,
        "worker stopped"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_requests_one_more_pass() {
        let in_flight = InFlightAccounts::default();

        assert!(in_flight.claim("a.bit"));
        assert!(!in_flight.claim("a.bit"));
        assert!(!in_flight.claim("a.bit"));
        assert!(in_flight.claim("b.bit"));

        assert!(in_flight.finish_pass("a.bit"));
        assert!(!in_flight.finish_pass("a.bit"));
        assert!(in_flight.claim("a.bit"));
    }

    #[test]
    fn finishing_without_duplicates_releases_the_account() {
        let in_flight = InFlightAccounts::default();

        assert!(in_flight.claim("a.bit"));
        assert!(!in_flight.finish_pass("a.bit"));
        assert!(in_flight.claim("a.bit"));
    }
}
