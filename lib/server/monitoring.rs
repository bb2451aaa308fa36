use crate::build_info;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use tokio::sync::OnceCell;

/// Registers immutable build metadata as a labeled gauge fixed at `1`.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: "dnslink_sync",
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    let sub_registry = registry.sub_registry_with_prefix(prefix);
    sub_registry.register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

#[derive(Clone)]
pub struct SyncMetrics {
    /// Snapshot records applied during the startup backlog pass.
    pub backlog_applied_total: Counter,
    /// Snapshot records the backlog pass logged and skipped.
    pub backlog_failed_total: Counter,
    /// Jobs the watcher pushed onto the queue.
    pub jobs_enqueued_total: Counter,
    pub jobs_succeeded_total: Counter,
    pub jobs_failed_total: Counter,
    /// Duplicate jobs folded into a re-run of an account already being synced.
    pub jobs_coalesced_total: Counter,
    /// Accounts whose zone entries were removed because no valid record remained.
    pub entries_removed_total: Counter,
    /// Watcher polls that failed to query the record store.
    pub poll_failures_total: Counter,
    /// Latest watermark; `-1` until the first record is observed.
    pub watermark: Gauge,
    pub queue_depth: Gauge,
    pub live_workers: Gauge,
}

impl SyncMetrics {
    fn init() -> Self {
        Self {
            backlog_applied_total: Counter::default(),
            backlog_failed_total: Counter::default(),
            jobs_enqueued_total: Counter::default(),
            jobs_succeeded_total: Counter::default(),
            jobs_failed_total: Counter::default(),
            jobs_coalesced_total: Counter::default(),
            entries_removed_total: Counter::default(),
            poll_failures_total: Counter::default(),
            watermark: Gauge::default(),
            queue_depth: Gauge::default(),
            live_workers: Gauge::default(),
        }
    }

    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::init();
        metrics.watermark.set(-1);
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "backlog_applied",
            "Total number of snapshot records applied by the backlog pass",
            metrics.backlog_applied_total.clone(),
        );
        sub_registry.register(
            "backlog_failed",
            "Total number of snapshot records skipped after a failure",
            metrics.backlog_failed_total.clone(),
        );
        sub_registry.register(
            "jobs_enqueued",
            "Total number of account jobs pushed by the watcher",
            metrics.jobs_enqueued_total.clone(),
        );
        sub_registry.register(
            "jobs_succeeded",
            "Total number of account jobs applied to the zone",
            metrics.jobs_succeeded_total.clone(),
        );
        sub_registry.register(
            "jobs_failed",
            "Total number of account jobs dropped after a failure",
            metrics.jobs_failed_total.clone(),
        );
        sub_registry.register(
            "jobs_coalesced",
            "Total number of duplicate account jobs folded into a re-run",
            metrics.jobs_coalesced_total.clone(),
        );
        sub_registry.register(
            "entries_removed",
            "Total number of hosts cleared because the account has no usable record",
            metrics.entries_removed_total.clone(),
        );
        sub_registry.register(
            "poll_failures",
            "Total number of watcher polls that failed to query the record store",
            metrics.poll_failures_total.clone(),
        );
        sub_registry.register(
            "watermark",
            "Highest record id handed to the job queue",
            metrics.watermark.clone(),
        );
        sub_registry.register(
            "queue_depth",
            "Jobs waiting in the queue",
            metrics.queue_depth.clone(),
        );
        sub_registry.register(
            "live_workers",
            "Workers currently consuming the job queue",
            metrics.live_workers.clone(),
        );
        metrics
    }
}

pub static SYNC_METRICS: OnceCell<SyncMetrics> = OnceCell::const_new();
