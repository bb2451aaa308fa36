use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Notify;

use super::types::Watermark;
use crate::db::models::RecordInfo;
use crate::record_store::{RecordStore, StoreError};
use crate::zone::{ZoneAdapter, ZoneEntry, ZoneError};

pub(super) fn record(id: i64, account: &str, key: &str, value: &str) -> RecordInfo {
    RecordInfo {
        id,
        account: account.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Waits until `check` holds, failing the test after two seconds.
pub(super) async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// In-memory record table with injectable poll failures.
#[derive(Default)]
pub(super) struct MemoryRecordStore {
    rows: Mutex<Vec<RecordInfo>>,
    failing_polls: Mutex<usize>,
    snapshot_fails: Mutex<bool>,
    poll_watermarks: Mutex<Vec<Watermark>>,
}

impl MemoryRecordStore {
    pub(super) fn with_rows(rows: Vec<RecordInfo>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub(super) fn insert(&self, row: RecordInfo) {
        let mut rows = self.rows.lock().expect("rows mutex poisoned");
        rows.push(row);
        rows.sort_by_key(|row| row.id);
    }

    pub(super) fn fail_next_polls(&self, count: usize) {
        *self.failing_polls.lock().expect("failing_polls mutex poisoned") = count;
    }

    pub(super) fn fail_snapshot(&self) {
        *self.snapshot_fails.lock().expect("snapshot_fails mutex poisoned") = true;
    }

    /// Watermarks passed to every `find_records_after` call, in call order.
    pub(super) fn poll_watermarks(&self) -> Vec<Watermark> {
        self.poll_watermarks
            .lock()
            .expect("poll_watermarks mutex poisoned")
            .clone()
    }

    fn matching(&self, keys: &[&str], filter: impl Fn(&RecordInfo) -> bool) -> Vec<RecordInfo> {
        self.rows
            .lock()
            .expect("rows mutex poisoned")
            .iter()
            .filter(|row| keys.contains(&row.key.as_str()) && filter(row))
            .cloned()
            .collect()
    }
}

impl RecordStore for MemoryRecordStore {
    fn find_records_by_keys<'a>(
        &'a self,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>> {
        Box::pin(async move {
            if *self.snapshot_fails.lock().expect("snapshot_fails mutex poisoned") {
                return Err(StoreError::Unavailable("snapshot refused".to_string()));
            }
            Ok(self.matching(keys, |_| true))
        })
    }

    fn find_records_after<'a>(
        &'a self,
        after: Watermark,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>> {
        Box::pin(async move {
            self.poll_watermarks
                .lock()
                .expect("poll_watermarks mutex poisoned")
                .push(after);
            {
                let mut failing = self.failing_polls.lock().expect("failing_polls mutex poisoned");
                if *failing > 0 {
                    *failing -= 1;
                    return Err(StoreError::Unavailable("poll refused".to_string()));
                }
            }
            Ok(self.matching(keys, |row| after.is_before(row.id)))
        })
    }

    fn find_account_records<'a>(
        &'a self,
        account: &'a str,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>> {
        Box::pin(async move { Ok(self.matching(keys, |row| row.account == account)) })
    }
}

/// Parks the next adapter call for a host until the test releases it. Later
/// calls for the same host pass straight through.
#[derive(Default)]
pub(super) struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    pub(super) async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub(super) fn release(&self) {
        self.release.notify_one();
    }
}

/// Zone double keyed by host; records every call in order.
#[derive(Default)]
pub(super) struct RecordingZone {
    entries: Mutex<BTreeMap<String, ZoneEntry>>,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
    rejected_hosts: Mutex<HashSet<String>>,
    /// Per host: applies running right now, and the most ever seen at once.
    concurrency: Mutex<HashMap<String, (usize, usize)>>,
}

impl RecordingZone {
    pub(super) fn gate(&self, host: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .expect("gates mutex poisoned")
            .insert(host.to_string(), gate.clone());
        gate
    }

    pub(super) fn reject(&self, host: &str) {
        self.rejected_hosts
            .lock()
            .expect("rejected_hosts mutex poisoned")
            .insert(host.to_string());
    }

    pub(super) fn seed(&self, entry: ZoneEntry) {
        self.entries
            .lock()
            .expect("entries mutex poisoned")
            .insert(entry.host.clone(), entry);
    }

    /// Host to DNSLink value, e.g. `a.bit.cc -> /ipfs/CIDone`.
    pub(super) fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .expect("entries mutex poisoned")
            .iter()
            .map(|(host, entry)| {
                (
                    host.clone(),
                    format!("/{}/{}", entry.kind.as_str(), entry.value),
                )
            })
            .collect()
    }

    pub(super) fn started(&self) -> Vec<String> {
        self.started.lock().expect("started mutex poisoned").clone()
    }

    pub(super) fn completed(&self) -> Vec<String> {
        self.completed.lock().expect("completed mutex poisoned").clone()
    }

    pub(super) fn removed(&self) -> Vec<String> {
        self.removed.lock().expect("removed mutex poisoned").clone()
    }

    pub(super) fn peak_concurrent_applies(&self, host: &str) -> usize {
        self.concurrency
            .lock()
            .expect("concurrency mutex poisoned")
            .get(host)
            .map_or(0, |(_, peak)| *peak)
    }

    fn enter_apply(&self, host: &str) {
        let mut concurrency = self.concurrency.lock().expect("concurrency mutex poisoned");
        let (running, peak) = concurrency.entry(host.to_string()).or_default();
        *running += 1;
        *peak = (*peak).max(*running);
    }

    fn exit_apply(&self, host: &str) {
        if let Some((running, _)) = self
            .concurrency
            .lock()
            .expect("concurrency mutex poisoned")
            .get_mut(host)
        {
            *running -= 1;
        }
    }

    async fn store_entry(&self, entry: &ZoneEntry) -> Result<(), ZoneError> {
        let gate = self
            .gates
            .lock()
            .expect("gates mutex poisoned")
            .remove(&entry.host);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if self
            .rejected_hosts
            .lock()
            .expect("rejected_hosts mutex poisoned")
            .contains(&entry.host)
        {
            return Err(ZoneError::Rejected(format!("{} refused", entry.host)));
        }

        self.entries
            .lock()
            .expect("entries mutex poisoned")
            .insert(entry.host.clone(), entry.clone());
        self.completed
            .lock()
            .expect("completed mutex poisoned")
            .push(entry.host.clone());
        Ok(())
    }
}

impl ZoneAdapter for RecordingZone {
    fn apply_entry<'a>(&'a self, entry: &'a ZoneEntry) -> BoxFuture<'a, Result<(), ZoneError>> {
        Box::pin(async move {
            self.started
                .lock()
                .expect("started mutex poisoned")
                .push(entry.host.clone());

            self.enter_apply(&entry.host);
            let result = self.store_entry(entry).await;
            self.exit_apply(&entry.host);
            result
        })
    }

    fn remove_entries<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<(), ZoneError>> {
        Box::pin(async move {
            self.entries
                .lock()
                .expect("entries mutex poisoned")
                .remove(host);
            self.removed
                .lock()
                .expect("removed mutex poisoned")
                .push(host.to_string());
            Ok(())
        })
    }
}
