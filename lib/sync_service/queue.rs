use flume::{Receiver, Sender};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::types::Job;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job push abandoned: shutdown requested")]
    Cancelled,

    #[error("Job queue closed: no receivers left")]
    Closed,
}

/// Bounded FIFO between the watcher and the worker pool.
///
/// The capacity bound is the pipeline's only backpressure: a full queue parks the watcher.
pub struct JobQueue;

impl JobQueue {
    pub fn bounded(capacity: usize) -> (JobSender, JobReceiver) {
        let (tx, rx) = flume::bounded(capacity.max(1));
        (JobSender { tx }, JobReceiver { rx })
    }
}

#[derive(Clone)]
pub struct JobSender {
    tx: Sender<Job>,
}

impl JobSender {
    /// Waits for room, or gives up without enqueuing if `cancel` fires first.
    pub async fn push(&self, job: Job, cancel: &CancellationToken) -> Result<(), QueueError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueueError::Cancelled),
            sent = self.tx.send_async(job) => sent.map_err(|_| QueueError::Closed),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

#[derive(Clone)]
pub struct JobReceiver {
    rx: Receiver<Job>,
}

impl JobReceiver {
    /// `None` once every sender is gone and the queue is empty.
    pub async fn recv(&self) -> Option<Job> {
        self.rx.recv_async().await.ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
