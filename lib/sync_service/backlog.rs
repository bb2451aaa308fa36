use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::apply::apply_record;
use super::types::BacklogSummary;
use crate::db::models::RecordInfo;
use crate::server::monitoring::SYNC_METRICS;
use crate::zone::{ZoneAdapter, ZoneTranslator};

/// Applies every snapshot record in list order, one at a time.
///
/// A failing record is logged and counted; the pass moves on. Cancellation is checked
/// between records, never mid-apply.
pub async fn sync_backlog<Z>(
    snapshot: &[RecordInfo],
    translator: &ZoneTranslator,
    zone: &Z,
    cancel: &CancellationToken,
) -> BacklogSummary
where
    Z: ZoneAdapter + ?Sized,
{
    let mut summary = BacklogSummary {
        total: snapshot.len(),
        ..Default::default()
    };
    info!(records = snapshot.len(), "starting backlog pass");

    for (idx, record) in snapshot.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.skipped = snapshot.len() - idx;
            warn!(
                skipped = summary.skipped,
                "shutdown requested, stopping backlog pass early"
            );
            break;
        }

        match apply_record(translator, zone, record).await {
            Ok(()) => {
                summary.applied += 1;
                if let Some(metrics) = SYNC_METRICS.get() {
                    metrics.backlog_applied_total.inc();
                }
            }
            Err(err) => {
                summary.failed += 1;
                if let Some(metrics) = SYNC_METRICS.get() {
                    metrics.backlog_failed_total.inc();
                }
                warn!(
                    record_id = record.id,
                    account = %record.account,
                    error = %err,
                    "backlog record failed, continuing"
                );
            }
        }
    }

    info!(
        applied = summary.applied,
        failed = summary.failed,
        skipped = summary.skipped,
        "backlog pass finished"
    );
    summary
}
