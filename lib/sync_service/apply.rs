use tracing::debug;

use crate::db::models::RecordInfo;
use crate::record_store::RecordStore;
use crate::sync_service::error::Error;
use crate::zone::{ZoneAdapter, ZoneTranslator, CONTENT_KEYS};

/// What applying one account did to the zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Removed,
}

/// Translates one snapshot record and writes it through the adapter.
pub async fn apply_record<Z>(
    translator: &ZoneTranslator,
    zone: &Z,
    record: &RecordInfo,
) -> Result<(), Error>
where
    Z: ZoneAdapter + ?Sized,
{
    let entry = translator.translate(record)?;
    zone.apply_entry(&entry).await?;
    debug!(
        record_id = record.id,
        host = %entry.host,
        kind = entry.kind.as_str(),
        "applied zone entry"
    );
    Ok(())
}

/// Re-reads `account` and makes the zone match its current rows.
///
/// An account with no usable row left gets its entries removed.
pub async fn sync_account<S, Z>(
    translator: &ZoneTranslator,
    store: &S,
    zone: &Z,
    account: &str,
) -> Result<ApplyOutcome, Error>
where
    S: RecordStore + ?Sized,
    Z: ZoneAdapter + ?Sized,
{
    let rows = store.find_account_records(account, &CONTENT_KEYS).await?;

    match translator.resolve_account(&rows) {
        Some(entry) => {
            zone.apply_entry(&entry).await?;
            debug!(account, host = %entry.host, value = %entry.value, "synced account");
            Ok(ApplyOutcome::Applied)
        }
        None => {
            let host = translator.host_for(account)?;
            zone.remove_entries(&host).await?;
            debug!(account, host = %host, "no usable record left, removed entries");
            Ok(ApplyOutcome::Removed)
        }
    }
}
