//! Translation from account records to DNSLink zone entries, plus the adapter seam that
//! applies them to a managed zone.

mod adapter;
mod entry;

pub use adapter::{ZoneAdapter, ZoneError};
pub use entry::{dnslink_name, ContentKind, DesiredRecord, DnsRecordType, ZoneEntry, CONTENT_KEYS};

use tracing::debug;

use crate::db::models::RecordInfo;

/// Turns record rows into zone entries under one hostname suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneTranslator {
    suffix: String,
}

impl ZoneTranslator {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into().trim_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `a.bit` under `bit.cc` becomes `a.bit.cc`.
    pub fn host_for(&self, account: &str) -> Result<String, ZoneError> {
        let account = account.trim().trim_end_matches('.').to_ascii_lowercase();
        let label = account.strip_suffix(".bit").unwrap_or(&account);

        if label.is_empty() || !label.split('.').all(is_valid_dns_label) {
            return Err(ZoneError::InvalidEntry(format!(
                "account {account:?} is not representable as a DNS name"
            )));
        }

        Ok(format!("{label}.{}", self.suffix))
    }

    pub fn translate(&self, record: &RecordInfo) -> Result<ZoneEntry, ZoneError> {
        let kind = ContentKind::from_key(&record.key).ok_or_else(|| {
            ZoneError::InvalidEntry(format!(
                "record {} has unsupported key {:?}",
                record.id, record.key
            ))
        })?;

        let value = record.value.trim();
        if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ZoneError::InvalidEntry(format!(
                "record {} has an unusable {} value {:?}",
                record.id,
                kind.as_str(),
                record.value
            )));
        }

        Ok(ZoneEntry {
            account: record.account.clone(),
            host: self.host_for(&record.account)?,
            kind,
            value: value.to_string(),
        })
    }

    /// Picks the entry an account should publish from its current rows.
    ///
    /// A host carries a single DNSLink, so the highest-id valid row wins. `None` means the
    /// account no longer publishes anything.
    pub fn resolve_account(&self, records: &[RecordInfo]) -> Option<ZoneEntry> {
        let mut ordered: Vec<&RecordInfo> = records.iter().collect();
        ordered.sort_by_key(|record| std::cmp::Reverse(record.id));

        ordered
            .into_iter()
            .find_map(|record| match self.translate(record) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!(record_id = record.id, error = %err, "skipping unusable record");
                    None
                }
            })
    }
}

fn is_valid_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
