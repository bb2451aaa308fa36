use std::time::Duration;

/// Highest record id the watcher has handed to the job queue.
///
/// Lives only in process memory; the startup snapshot re-establishes it on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Watermark(Option<i64>);

impl Watermark {
    /// Nothing observed yet: every record is newer.
    pub const NONE: Watermark = Watermark(None);

    pub fn at(id: i64) -> Self {
        Self(Some(id))
    }

    /// Watermark for a snapshot sorted by ascending id.
    pub fn from_snapshot<T>(snapshot: &[T], id_of: impl Fn(&T) -> i64) -> Self {
        snapshot.last().map_or(Self::NONE, |last| Self::at(id_of(last)))
    }

    pub fn id(self) -> Option<i64> {
        self.0
    }

    pub fn is_before(self, id: i64) -> bool {
        self.0.map_or(true, |current| id > current)
    }

    /// Moves forward to `id`; never moves backwards. Returns whether it advanced.
    pub fn advance_to(&mut self, id: i64) -> bool {
        if self.is_before(id) {
            self.0 = Some(id);
            true
        } else {
            false
        }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("none"),
        }
    }
}

/// "Recheck this account": the worker re-reads the account's current rows at processing time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    pub account: String,
}

impl Job {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub worker_count: usize,
    /// Defaults to the snapshot length when unset.
    pub queue_capacity: Option<usize>,
    /// Start watching from the snapshot watermark without applying the snapshot.
    pub skip_backlog: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            worker_count: 4,
            queue_capacity: None,
            skip_backlog: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BacklogSummary {
    pub total: usize,
    pub applied: usize,
    pub failed: usize,
    /// Records left unvisited because shutdown was requested mid-pass.
    pub skipped: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub applied: usize,
    pub removed: usize,
    pub failed: usize,
    /// Jobs folded into a re-run of an account that was already in flight.
    pub coalesced: usize,
}

impl WorkerSummary {
    /// Zone passes run, not counting jobs folded into another pass.
    pub fn processed(&self) -> usize {
        self.applied + self.removed + self.failed
    }

    pub fn merge(&mut self, other: WorkerSummary) {
        self.applied += other.applied;
        self.removed += other.removed;
        self.failed += other.failed;
        self.coalesced += other.coalesced;
    }
}

/// What a drained pipeline reports back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub final_watermark: Watermark,
    pub workers: WorkerSummary,
    /// Jobs still queued at shutdown; the next startup backlog covers them.
    pub abandoned_jobs: usize,
}
