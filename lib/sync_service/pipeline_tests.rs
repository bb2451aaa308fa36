use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::test_support::{eventually, record, MemoryRecordStore, RecordingZone};
use super::*;
use crate::zone::{ContentKind, ZoneEntry};

fn settings(queue_capacity: Option<usize>, worker_count: usize) -> SyncSettings {
    SyncSettings {
        poll_interval: Duration::from_millis(10),
        worker_count,
        queue_capacity,
        skip_backlog: false,
    }
}

fn translator() -> ZoneTranslator {
    ZoneTranslator::new("bit.cc")
}

fn zone_state(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(host, value)| (host.to_string(), value.to_string()))
        .collect()
}

#[tokio::test]
async fn record_created_during_backlog_is_applied_after_it() {
    let store = Arc::new(MemoryRecordStore::with_rows(vec![record(
        1, "a.bit", "ipfs", "CIDone",
    )]));
    let zone = Arc::new(RecordingZone::default());
    let backlog_gate = zone.gate("a.bit.cc");
    let coordinator = ShutdownCoordinator::new();

    let service = SyncService::new(store.clone(), zone.clone(), translator(), settings(None, 2));
    let starting = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { service.start(&coordinator).await })
    };

    backlog_gate.wait_entered().await;
    store.insert(record(2, "b.bit", "ipns", "nameKeyX"));

    // The watcher queues b.bit while the backlog is still parked on a.bit.
    eventually(|| store.poll_watermarks().contains(&Watermark::at(2))).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(zone.started(), vec!["a.bit.cc".to_string()]);
    assert_eq!(store.poll_watermarks().first(), Some(&Watermark::at(1)));

    backlog_gate.release();
    let running = starting.await.unwrap().unwrap();
    assert_eq!(running.backlog().applied, 1);

    eventually(|| zone.completed().contains(&"b.bit.cc".to_string())).await;
    let summary = running.drain(&coordinator).await.unwrap();

    assert_eq!(summary.final_watermark, Watermark::at(2));
    assert_eq!(summary.workers.applied, 1);
    assert_eq!(summary.abandoned_jobs, 0);
    assert_eq!(
        zone.completed(),
        vec!["a.bit.cc".to_string(), "b.bit.cc".to_string()]
    );
    assert_eq!(
        zone.snapshot(),
        zone_state(&[("a.bit.cc", "/ipfs/CIDone"), ("b.bit.cc", "/ipns/nameKeyX")])
    );
}

#[tokio::test]
async fn drain_waits_for_in_flight_job_and_abandons_queued_one() {
    let store = Arc::new(MemoryRecordStore::with_rows(vec![
        record(1, "x.bit", "ipfs", "CIDx"),
        record(2, "y.bit", "ipfs", "CIDy"),
    ]));
    let zone = Arc::new(RecordingZone::default());
    let slow = zone.gate("x.bit.cc");
    let coordinator = ShutdownCoordinator::new();
    let token = coordinator.token();

    let (sender, receiver) = JobQueue::bounded(1);
    let pool = WorkerPool::spawn(
        1,
        receiver.clone(),
        store.clone(),
        zone.clone(),
        translator(),
        &coordinator,
    );

    sender.push(Job::new("x.bit"), &token).await.unwrap();
    slow.wait_entered().await;
    sender.push(Job::new("y.bit"), &token).await.unwrap();

    coordinator.cancel();
    let drain = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.await_drain().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!drain.is_finished());
    assert!(zone.completed().is_empty());

    slow.release();
    tokio::time::timeout(Duration::from_secs(2), drain)
        .await
        .expect("drain finishes once the slow call returns")
        .unwrap();

    let summary = pool.wait_for_completion().await.unwrap();
    assert_eq!(summary.applied, 1);
    assert_eq!(zone.completed(), vec!["x.bit.cc".to_string()]);
    assert_eq!(zone.started(), vec!["x.bit.cc".to_string()]);
    assert_eq!(receiver.len(), 1);
}

#[tokio::test]
async fn newer_record_wins_when_account_changes_during_apply() {
    let store = Arc::new(MemoryRecordStore::with_rows(vec![record(
        1, "a.bit", "ipfs", "CIDv1",
    )]));
    let zone = Arc::new(RecordingZone::default());
    let first_apply = zone.gate("a.bit.cc");
    let coordinator = ShutdownCoordinator::new();
    let token = coordinator.token();

    let (sender, receiver) = JobQueue::bounded(4);
    let pool = WorkerPool::spawn(
        2,
        receiver,
        store.clone(),
        zone.clone(),
        translator(),
        &coordinator,
    );

    sender.push(Job::new("a.bit"), &token).await.unwrap();
    first_apply.wait_entered().await;

    store.insert(record(2, "a.bit", "ipfs", "CIDv2"));
    sender.push(Job::new("a.bit"), &token).await.unwrap();

    // The idle worker takes the second job but must not touch the zone yet.
    eventually(|| sender.is_empty()).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(zone.started(), vec!["a.bit.cc".to_string()]);

    first_apply.release();
    eventually(|| zone.completed().len() == 2).await;

    coordinator.cancel();
    coordinator.await_drain().await;
    let summary = pool.wait_for_completion().await.unwrap();

    assert_eq!(summary.applied, 2);
    assert_eq!(summary.coalesced, 1);
    assert_eq!(zone.peak_concurrent_applies("a.bit.cc"), 1);
    assert_eq!(zone.snapshot(), zone_state(&[("a.bit.cc", "/ipfs/CIDv2")]));
}

#[tokio::test]
async fn duplicate_jobs_for_one_account_never_apply_concurrently() {
    let store = Arc::new(MemoryRecordStore::with_rows(vec![
        record(1, "a.bit", "ipfs", "CIDone"),
        record(2, "b.bit", "ipns", "nameKeyB"),
    ]));
    let zone = Arc::new(RecordingZone::default());
    let held = zone.gate("a.bit.cc");
    let coordinator = ShutdownCoordinator::new();
    let token = coordinator.token();

    let (sender, receiver) = JobQueue::bounded(8);
    let pool = WorkerPool::spawn(
        3,
        receiver,
        store.clone(),
        zone.clone(),
        translator(),
        &coordinator,
    );

    sender.push(Job::new("a.bit"), &token).await.unwrap();
    held.wait_entered().await;
    for account in ["a.bit", "a.bit", "b.bit", "a.bit"] {
        sender.push(Job::new(account), &token).await.unwrap();
    }

    // Other accounts keep flowing while a.bit is held.
    eventually(|| {
        sender.is_empty() && zone.completed().contains(&"b.bit.cc".to_string())
    })
    .await;
    held.release();
    eventually(|| zone.completed().len() == 3).await;

    coordinator.cancel();
    coordinator.await_drain().await;
    let summary = pool.wait_for_completion().await.unwrap();

    // Three duplicates fold into a single extra pass.
    assert_eq!(summary.applied, 3);
    assert_eq!(summary.coalesced, 3);
    assert_eq!(zone.peak_concurrent_applies("a.bit.cc"), 1);
    assert_eq!(
        zone.snapshot(),
        zone_state(&[("a.bit.cc", "/ipfs/CIDone"), ("b.bit.cc", "/ipns/nameKeyB")])
    );
}

#[tokio::test]
async fn failed_poll_leaves_watermark_and_later_polls_advance_it() {
    let store = Arc::new(MemoryRecordStore::with_rows(vec![
        record(1, "a.bit", "ipfs", "CIDone"),
        record(2, "b.bit", "ipns", "nameKeyX"),
    ]));
    store.fail_next_polls(1);
    let (sender, receiver) = JobQueue::bounded(8);
    let mut watcher = Watcher::new(store.clone(), sender, Watermark::NONE);
    let token = CancellationToken::new();

    assert_eq!(watcher.poll_once(&token).await, PollOutcome::QueryFailed);
    assert_eq!(watcher.watermark(), Watermark::NONE);

    assert_eq!(watcher.poll_once(&token).await, PollOutcome::Pushed(2));
    assert_eq!(watcher.watermark(), Watermark::at(2));

    store.insert(record(3, "a.bit", "ipfs", "CIDtwo"));
    assert_eq!(watcher.poll_once(&token).await, PollOutcome::Pushed(1));
    assert_eq!(watcher.poll_once(&token).await, PollOutcome::Pushed(0));
    assert_eq!(watcher.watermark(), Watermark::at(3));

    let polled = store.poll_watermarks();
    assert!(polled.windows(2).all(|pair| pair[0] <= pair[1]));

    let mut accounts = vec![];
    while let Ok(Some(job)) =
        tokio::time::timeout(Duration::from_millis(10), receiver.recv()).await
    {
        accounts.push(job.account);
    }
    assert_eq!(accounts, vec!["a.bit", "b.bit", "a.bit"]);
}

#[tokio::test]
async fn cancelled_push_does_not_advance_watermark() {
    let store = Arc::new(MemoryRecordStore::with_rows(vec![
        record(1, "a.bit", "ipfs", "CIDone"),
        record(2, "b.bit", "ipfs", "CIDtwo"),
    ]));
    let (sender, receiver) = JobQueue::bounded(1);
    let mut watcher = Watcher::new(store.clone(), sender, Watermark::NONE);
    let token = CancellationToken::new();

    let polling = {
        let token = token.clone();
        tokio::spawn(async move {
            let outcome = watcher.poll_once(&token).await;
            (outcome, watcher.watermark())
        })
    };

    eventually(|| receiver.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!polling.is_finished());

    token.cancel();
    let (outcome, watermark) = polling.await.unwrap();
    assert_eq!(outcome, PollOutcome::Interrupted(1));
    assert_eq!(watermark, Watermark::at(1));
    assert_eq!(receiver.len(), 1);
}

#[tokio::test]
async fn backlog_logs_failures_and_keeps_going() {
    let zone = RecordingZone::default();
    zone.reject("c.bit.cc");
    let snapshot = vec![
        record(1, "a.bit", "ipfs", "CIDa"),
        record(2, "b.bit", "ipfs", ""),
        record(3, "c.bit", "ipns", "keyC"),
        record(4, "d.bit", "ipns", "keyD"),
    ];

    let summary = sync_backlog(&snapshot, &translator(), &zone, &CancellationToken::new()).await;

    assert_eq!(
        summary,
        BacklogSummary {
            total: 4,
            applied: 2,
            failed: 2,
            skipped: 0,
        }
    );
    assert_eq!(
        zone.snapshot(),
        zone_state(&[("a.bit.cc", "/ipfs/CIDa"), ("d.bit.cc", "/ipns/keyD")])
    );
}

#[tokio::test]
async fn backlog_stops_when_already_cancelled() {
    let zone = RecordingZone::default();
    let token = CancellationToken::new();
    token.cancel();

    let summary = sync_backlog(
        &[record(1, "a.bit", "ipfs", "CIDa")],
        &translator(),
        &zone,
        &token,
    )
    .await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.applied, 0);
    assert!(zone.started().is_empty());
}

#[tokio::test]
async fn reapplying_the_same_entry_converges() {
    let store = MemoryRecordStore::with_rows(vec![record(1, "a.bit", "ipfs", "CIDone")]);
    let zone = RecordingZone::default();

    for _ in 0..2 {
        let outcome = sync_account(&translator(), &store, &zone, "a.bit")
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    assert_eq!(zone.snapshot(), zone_state(&[("a.bit.cc", "/ipfs/CIDone")]));
}

#[tokio::test]
async fn worker_removes_entries_for_account_without_usable_record() {
    let store = Arc::new(MemoryRecordStore::with_rows(vec![record(
        7, "c.bit", "ipfs", " ",
    )]));
    let zone = Arc::new(RecordingZone::default());
    zone.seed(ZoneEntry {
        account: "c.bit".to_string(),
        host: "c.bit.cc".to_string(),
        kind: ContentKind::Ipfs,
        value: "CIDold".to_string(),
    });
    let coordinator = ShutdownCoordinator::new();
    let (sender, receiver) = JobQueue::bounded(4);
    let pool = WorkerPool::spawn(2, receiver, store, zone.clone(), translator(), &coordinator);

    sender
        .push(Job::new("c.bit"), &coordinator.token())
        .await
        .unwrap();
    eventually(|| !zone.removed().is_empty()).await;

    coordinator.cancel();
    coordinator.await_drain().await;
    let summary = pool.wait_for_completion().await.unwrap();

    assert_eq!(summary.removed, 1);
    assert_eq!(zone.removed(), vec!["c.bit.cc".to_string()]);
    assert!(zone.snapshot().is_empty());
}

#[tokio::test]
async fn empty_snapshot_starts_from_sentinel() {
    let store = Arc::new(MemoryRecordStore::default());
    let zone = Arc::new(RecordingZone::default());
    let coordinator = ShutdownCoordinator::new();
    let service = SyncService::new(store.clone(), zone.clone(), translator(), settings(None, 1));

    let running = service.start(&coordinator).await.unwrap();
    assert_eq!(running.backlog().total, 0);
    eventually(|| !store.poll_watermarks().is_empty()).await;
    assert_eq!(store.poll_watermarks().first(), Some(&Watermark::NONE));

    store.insert(record(5, "e.bit", "ipfs", "CIDe"));
    eventually(|| zone.completed().contains(&"e.bit.cc".to_string())).await;

    let summary = running.drain(&coordinator).await.unwrap();
    assert_eq!(summary.final_watermark, Watermark::at(5));
}

#[tokio::test]
async fn snapshot_failure_is_fatal() {
    let store = Arc::new(MemoryRecordStore::default());
    store.fail_snapshot();
    let zone = Arc::new(RecordingZone::default());
    let coordinator = ShutdownCoordinator::new();
    let service = SyncService::new(store, zone, translator(), settings(None, 1));

    let result = service.start(&coordinator).await;

    assert!(matches!(result, Err(Error::Store(_))));
    assert_eq!(coordinator.tracked_tasks(), 0);
}

#[tokio::test]
async fn backlog_only_applies_snapshot_without_live_tasks() {
    let store = Arc::new(MemoryRecordStore::with_rows(vec![
        record(1, "a.bit", "ipfs", "CIDa"),
        record(2, "b.bit", "twitter", "ignored"),
    ]));
    let zone = Arc::new(RecordingZone::default());
    let coordinator = ShutdownCoordinator::new();
    let service = SyncService::new(store, zone.clone(), translator(), settings(None, 1));

    let summary = service.backlog_only(&coordinator).await.unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.applied, 1);
    assert_eq!(coordinator.tracked_tasks(), 0);
    assert_eq!(zone.snapshot(), zone_state(&[("a.bit.cc", "/ipfs/CIDa")]));
}

#[tokio::test]
async fn skipped_backlog_still_watches_from_snapshot_watermark() {
    let store = Arc::new(MemoryRecordStore::with_rows(vec![record(
        3, "a.bit", "ipfs", "CIDa",
    )]));
    let zone = Arc::new(RecordingZone::default());
    let coordinator = ShutdownCoordinator::new();
    let service = SyncService::new(
        store.clone(),
        zone.clone(),
        translator(),
        SyncSettings {
            skip_backlog: true,
            ..settings(None, 1)
        },
    );

    let running = service.start(&coordinator).await.unwrap();
    assert_eq!(running.backlog().skipped, 1);

    store.insert(record(4, "b.bit", "ipns", "keyB"));
    eventually(|| zone.completed().contains(&"b.bit.cc".to_string())).await;
    let summary = running.drain(&coordinator).await.unwrap();

    assert_eq!(summary.final_watermark, Watermark::at(4));
    assert_eq!(zone.snapshot(), zone_state(&[("b.bit.cc", "/ipns/keyB")]));
}
