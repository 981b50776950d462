use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;
use crate::models::BookmarkEntry;
use crate::remote::{InMemoryBlobAdapter, RemoteResult, VersionToken};
use crate::store::MemoryKvStore;

const T0: i64 = 1_700_000_000_000;

type MemoryScheduler<R> = SyncScheduler<Arc<MemoryKvStore>, R>;

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<SyncNotice>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<SyncNotice> {
        self.notices.lock().unwrap().clone()
    }
}

impl SyncNotifier for RecordingNotifier {
    fn notify(&self, notice: &SyncNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

fn key(name: &str) -> ResourceKey {
    name.parse().unwrap()
}

fn entry(timestamp: f64, label: &str, created_at: i64) -> BookmarkEntry {
    BookmarkEntry {
        id: None,
        timestamp,
        label: label.to_string(),
        is_auto_save: false,
        created_at,
        color_tag: None,
    }
}

/// `last_modified` is the newest entry write, so the record is already
/// "settled" under the merge's activity rule.
fn record(name: &str, entries: Vec<BookmarkEntry>) -> ResourceRecord {
    let last_modified = entries
        .iter()
        .map(|entry| entry.created_at)
        .max()
        .unwrap_or(T0);
    let mut record = ResourceRecord::new(
        key(name),
        format!("https://example.com/{name}"),
        name,
        Some(600.0),
        last_modified,
    );
    record.bookmarks = entries;
    record.sort_bookmarks();
    record
}

fn snapshot(records: &[ResourceRecord]) -> Snapshot {
    records
        .iter()
        .map(|record| (record.key.clone(), record.clone()))
        .collect()
}

fn labels(record: &ResourceRecord) -> Vec<(f64, String)> {
    record
        .bookmarks
        .iter()
        .map(|entry| (entry.timestamp, entry.label.clone()))
        .collect()
}

fn key_set(snapshot: &Snapshot) -> BTreeSet<String> {
    snapshot.keys().map(ToString::to_string).collect()
}

fn build_scheduler<R: RemoteBlobAdapter>(
    kv: &Arc<MemoryKvStore>,
    remote: R,
    clock: &Arc<ManualClock>,
    notifier: &Arc<RecordingNotifier>,
    config: &EngineConfig,
) -> MemoryScheduler<R> {
    SyncScheduler::new(
        LocalRecordStore::new(Arc::clone(kv)),
        remote,
        Arc::new(SyncState::new()),
        config,
    )
    .with_clock(clock.clone())
    .with_notifier(notifier.clone())
}

fn seed_local(kv: &Arc<MemoryKvStore>, records: &[ResourceRecord]) {
    let store = LocalRecordStore::new(Arc::clone(kv));
    for record in records {
        store.put(record).unwrap();
    }
}

fn seed_remote(records: &[ResourceRecord]) -> InMemoryBlobAdapter {
    if records.is_empty() {
        InMemoryBlobAdapter::new()
    } else {
        InMemoryBlobAdapter::with_snapshot(&snapshot(records)).unwrap()
    }
}

struct Harness {
    kv: Arc<MemoryKvStore>,
    remote: Arc<InMemoryBlobAdapter>,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
    scheduler: MemoryScheduler<Arc<InMemoryBlobAdapter>>,
}

impl Harness {
    fn new(local: &[ResourceRecord], remote: &[ResourceRecord]) -> Self {
        Self::with_config(local, remote, &EngineConfig::default())
    }

    fn with_config(
        local: &[ResourceRecord],
        remote: &[ResourceRecord],
        config: &EngineConfig,
    ) -> Self {
        let kv = Arc::new(MemoryKvStore::new());
        seed_local(&kv, local);
        let remote = Arc::new(seed_remote(remote));
        let clock = Arc::new(ManualClock::new(T0));
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = build_scheduler(&kv, Arc::clone(&remote), &clock, &notifier, config);
        Self {
            kv,
            remote,
            clock,
            notifier,
            scheduler,
        }
    }

    fn local(&self) -> LocalRecordStore<Arc<MemoryKvStore>> {
        LocalRecordStore::new(Arc::clone(&self.kv))
    }
}

fn completed(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        other => panic!("expected a completed sync, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_remote_bootstrap_pushes_local_unchanged() {
    let local = record("rk-a", vec![entry(12.0, "intro", T0 - 10)]);
    let harness = Harness::new(std::slice::from_ref(&local), &[]);

    let report = completed(harness.scheduler.perform_sync().await);

    assert!(report.pushed);
    assert_eq!(report.attempts, 1);
    assert!(report.backfilled.is_empty());
    assert_eq!(harness.remote.snapshot().unwrap(), snapshot(&[local.clone()]));
    assert_eq!(harness.local().snapshot().unwrap(), snapshot(&[local]));
    assert_eq!(harness.scheduler.state().last_sync(), Some(T0));
}

#[tokio::test]
async fn remote_only_records_are_backfilled_once() {
    let remote = record("rk-b", vec![entry(30.0, "goal", T0 - 50)]);
    let harness = Harness::new(&[], std::slice::from_ref(&remote));

    let first = completed(harness.scheduler.perform_sync().await);
    assert!(!first.pushed);
    assert_eq!(first.backfilled, vec![key("rk-b")]);
    assert_eq!(harness.local().get(&key("rk-b")).unwrap(), Some(remote));

    harness.clock.advance(1_000);
    let second = completed(harness.scheduler.perform_sync().await);
    assert!(!second.pushed);
    assert!(second.backfilled.is_empty());
}

#[tokio::test]
async fn duplicate_bookmarks_collapse_across_devices() {
    let mut local = record("rk-m", vec![entry(10.0, "intro", 900)]);
    local.last_modified = 1_000;
    let mut remote = record(
        "rk-m",
        vec![entry(10.4, "intro", 1_500), entry(50.0, "climax", 1_800)],
    );
    remote.last_modified = 2_000;
    let harness = Harness::new(&[local], std::slice::from_ref(&remote));

    completed(harness.scheduler.perform_sync().await);

    let stored = harness.local().get(&key("rk-m")).unwrap().unwrap();
    assert_eq!(
        labels(&stored),
        vec![(10.4, "intro".to_string()), (50.0, "climax".to_string())]
    );
    assert_eq!(stored.last_modified, 2_000);
    assert_eq!(harness.remote.snapshot().unwrap()[&key("rk-m")], stored);
}

#[tokio::test]
async fn overlapping_cycle_is_skipped() {
    let harness = Harness::new(&[], &[]);
    let held = harness.scheduler.state().try_begin();
    assert!(held.is_some());

    assert!(matches!(
        harness.scheduler.perform_sync().await,
        SyncOutcome::Skipped(SkipReason::AlreadySyncing)
    ));
    assert_eq!(harness.remote.get_calls(), 0);

    drop(held);
    assert!(harness.scheduler.perform_sync().await.is_completed());
}

#[tokio::test]
async fn unconfigured_remote_is_skipped_quietly() {
    let harness = Harness::new(&[], &[]);
    harness.remote.fail_next_get(RemoteError::NotConfigured);

    assert!(matches!(
        harness.scheduler.perform_sync().await,
        SyncOutcome::Skipped(SkipReason::NotConfigured)
    ));
    assert!(harness.notifier.notices().is_empty());
    assert_eq!(harness.scheduler.state().last_sync(), None);
}

#[tokio::test(start_paused = true)]
async fn conflict_retry_matches_clean_run() {
    let local = [
        record("rk-a", vec![entry(5.0, "a", T0 - 300)]),
        record("rk-shared", vec![entry(1.0, "left", T0 - 200)]),
    ];
    let remote = [
        record("rk-b", vec![entry(7.0, "b", T0 - 250)]),
        record("rk-shared", vec![entry(9.0, "right", T0 - 100)]),
    ];

    let clean = Harness::new(&local, &remote);
    let clean_report = completed(clean.scheduler.perform_sync().await);

    let retried = Harness::new(&local, &remote);
    retried.remote.fail_next_save(RemoteError::Conflict);
    let retried_report = completed(retried.scheduler.perform_sync().await);

    assert_eq!(clean_report.attempts, 1);
    assert_eq!(retried_report.attempts, 2);
    assert_eq!(
        retried.remote.snapshot().unwrap(),
        clean.remote.snapshot().unwrap()
    );
    assert_eq!(
        retried.local().snapshot().unwrap(),
        clean.local().snapshot().unwrap()
    );
}

/// Local store whose writes start failing on demand.
#[derive(Default)]
struct FailingWritesKvStore {
    inner: MemoryKvStore,
    fail_writes: AtomicBool,
}

impl FailingWritesKvStore {
    fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for FailingWritesKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Database("disk full".to_string()));
        }
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }

    fn list_keys(&self, prefix: &str) -> Result<BTreeSet<String>> {
        self.inner.list_keys(prefix)
    }
}

#[tokio::test]
async fn local_write_failure_after_push_still_completes() {
    let local = record("rk-a", vec![entry(12.0, "intro", T0 - 10)]);
    let remote_only = record("rk-b", vec![entry(30.0, "goal", T0 - 50)]);
    let kv = Arc::new(FailingWritesKvStore::default());
    LocalRecordStore::new(Arc::clone(&kv)).put(&local).unwrap();
    let remote = Arc::new(seed_remote(std::slice::from_ref(&remote_only)));
    let clock = Arc::new(ManualClock::new(T0));
    let scheduler = SyncScheduler::new(
        LocalRecordStore::new(Arc::clone(&kv)),
        Arc::clone(&remote),
        Arc::new(SyncState::new()),
        &EngineConfig::default(),
    )
    .with_clock(clock.clone());

    kv.fail_writes(true);
    let report = completed(scheduler.perform_sync().await);
    assert!(report.pushed);
    assert_eq!(report.attempts, 1);
    assert!(report.backfilled.is_empty());
    assert_eq!(report.deferred, 1);
    assert_eq!(
        remote.snapshot().unwrap(),
        snapshot(&[local, remote_only.clone()])
    );
    assert_eq!(scheduler.state().last_sync(), Some(T0));

    kv.fail_writes(false);
    clock.advance(1_000);
    let retry = completed(scheduler.perform_sync().await);
    assert!(!retry.pushed);
    assert_eq!(retry.backfilled, vec![key("rk-b")]);
    assert_eq!(retry.deferred, 0);
    assert_eq!(
        LocalRecordStore::new(Arc::clone(&kv))
            .get(&key("rk-b"))
            .unwrap(),
        Some(remote_only)
    );
}

/// Replaces the document with another device's write right before our save.
struct InterleavingRemote {
    inner: InMemoryBlobAdapter,
    external: Mutex<Option<Snapshot>>,
}

impl RemoteBlobAdapter for InterleavingRemote {
    fn backend_name(&self) -> &str {
        "interleaving"
    }

    async fn get_all(&self) -> RemoteResult<RemoteSnapshot> {
        self.inner.get_all().await
    }

    async fn save_all(
        &self,
        snapshot: &Snapshot,
        precondition: &VersionToken,
    ) -> RemoteResult<()> {
        let external = self.external.lock().unwrap().take();
        if let Some(external) = external {
            self.inner.write_external(&external)?;
        }
        self.inner.save_all(snapshot, precondition).await
    }
}

#[tokio::test(start_paused = true)]
async fn stale_retry_rereads_both_replicas() {
    let local = record("rk-a", vec![entry(5.0, "a", T0 - 300)]);
    let remote = record("rk-b", vec![entry(7.0, "b", T0 - 250)]);
    let other_device = record("rk-c", vec![entry(9.0, "c", T0 - 10)]);

    let kv = Arc::new(MemoryKvStore::new());
    seed_local(&kv, std::slice::from_ref(&local));
    let adapter = Arc::new(InterleavingRemote {
        inner: seed_remote(std::slice::from_ref(&remote)),
        external: Mutex::new(Some(snapshot(&[remote.clone(), other_device.clone()]))),
    });
    let scheduler = build_scheduler(
        &kv,
        Arc::clone(&adapter),
        &Arc::new(ManualClock::new(T0)),
        &Arc::new(RecordingNotifier::default()),
        &EngineConfig::default(),
    );

    let report = completed(scheduler.perform_sync().await);

    assert_eq!(report.attempts, 2);
    let expected = snapshot(&[local, remote, other_device]);
    assert_eq!(adapter.inner.snapshot().unwrap(), expected);
    assert_eq!(LocalRecordStore::new(kv).snapshot().unwrap(), expected);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_leave_both_replicas_untouched() {
    let local = record("rk-a", vec![entry(5.0, "a", T0 - 300)]);
    let remote = record("rk-b", vec![entry(7.0, "b", T0 - 250)]);
    let harness = Harness::new(std::slice::from_ref(&local), std::slice::from_ref(&remote));
    for _ in 0..4 {
        harness
            .remote
            .fail_next_save(RemoteError::Network("connection reset".to_string()));
    }

    let outcome = harness.scheduler.perform_sync().await;

    match outcome {
        SyncOutcome::Failed { error, attempts } => {
            assert_eq!(attempts, 4);
            assert!(error.is_recoverable());
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(harness.remote.save_calls(), 4);
    assert_eq!(harness.remote.get_calls(), 4);
    assert_eq!(harness.remote.snapshot().unwrap(), snapshot(&[remote]));
    assert_eq!(harness.local().snapshot().unwrap(), snapshot(&[local]));
    assert_eq!(harness.scheduler.state().last_sync(), None);
    assert!(!harness.scheduler.state().is_syncing());

    let notices = harness.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, ErrorKind::Network);
    assert!(!notices[0].sync_disabled);
}

#[tokio::test]
async fn invalid_remote_document_is_not_retried_or_overwritten() {
    let local = record("rk-a", vec![entry(5.0, "a", T0 - 300)]);
    let harness = Harness::new(&[local], &[]);
    harness.remote.put_raw("[\"not\", \"a\", \"map\"]");

    let outcome = harness.scheduler.perform_sync().await;

    assert!(matches!(outcome, SyncOutcome::Failed { attempts: 1, .. }));
    assert_eq!(
        harness.remote.raw_document(),
        Some(b"[\"not\", \"a\", \"map\"]".to_vec())
    );
}

#[tokio::test]
async fn auth_failure_disables_sync_until_reenabled() {
    let harness = Harness::new(&[], &[]);
    harness
        .remote
        .fail_next_get(RemoteError::Auth("token revoked".to_string()));

    let outcome = harness.scheduler.perform_sync().await;
    assert!(matches!(outcome, SyncOutcome::Failed { attempts: 1, .. }));
    assert!(harness.scheduler.state().is_disabled());

    let notices = harness.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, ErrorKind::Auth);
    assert!(notices[0].sync_disabled);

    assert!(matches!(
        harness.scheduler.perform_sync().await,
        SyncOutcome::Skipped(SkipReason::Disabled)
    ));
    assert_eq!(harness.scheduler.should_sync(T0 + 1_000_000), None);

    harness.scheduler.state().reenable();
    assert!(harness.scheduler.perform_sync().await.is_completed());
}

#[tokio::test]
async fn failure_notifications_are_rate_limited_per_kind() {
    let mut config = EngineConfig::default();
    config.sync.max_attempts = 1;
    let harness = Harness::with_config(&[], &[], &config);
    for _ in 0..3 {
        harness
            .remote
            .fail_next_get(RemoteError::Network("offline".to_string()));
    }

    harness.scheduler.perform_sync().await;
    harness.clock.advance(1_000);
    harness.scheduler.perform_sync().await;
    assert_eq!(harness.notifier.notices().len(), 1);

    harness.clock.advance(60_000);
    harness.scheduler.perform_sync().await;
    assert_eq!(harness.notifier.notices().len(), 2);
}

#[test]
fn triggers_follow_playback_interaction_and_fallback() {
    let harness = Harness::new(&[], &[]);
    let scheduler = &harness.scheduler;
    let state = scheduler.state();

    assert_eq!(scheduler.should_sync(T0), Some(SyncTrigger::Fallback));

    state.record_sync(T0);
    assert_eq!(scheduler.should_sync(T0 + 10_000), None);

    state.set_playing(true);
    assert_eq!(scheduler.should_sync(T0 + 14_000), None);
    assert_eq!(
        scheduler.should_sync(T0 + 16_000),
        Some(SyncTrigger::Playing)
    );
    state.set_playing(false);

    state.touch_interaction(T0 + 5_000);
    assert_eq!(scheduler.should_sync(T0 + 29_000), None);
    assert_eq!(
        scheduler.should_sync(T0 + 31_000),
        Some(SyncTrigger::Interaction)
    );

    assert_eq!(
        scheduler.should_sync(T0 + 126_000),
        Some(SyncTrigger::Fallback)
    );
}

#[test]
fn stale_interaction_does_not_trigger() {
    let harness = Harness::new(&[], &[]);
    let state = harness.scheduler.state();
    state.touch_interaction(T0 - 200_000);
    state.record_sync(T0);

    assert_eq!(harness.scheduler.should_sync(T0 + 31_000), None);
}

#[tokio::test]
async fn tick_only_syncs_when_triggered() {
    let harness = Harness::new(&[], &[]);

    assert!(harness.scheduler.tick().await.is_some());
    assert_eq!(harness.remote.get_calls(), 1);

    harness.clock.advance(10_000);
    assert!(harness.scheduler.tick().await.is_none());
    assert_eq!(harness.remote.get_calls(), 1);
}

#[tokio::test]
async fn pending_clear_drops_stale_remote_records() {
    let stale = record("rk-old", vec![entry(5.0, "old", T0 - 5_000)]);
    let other_device = record("rk-new", vec![entry(6.0, "new", T0 + 2_000)]);
    let fresh_local = record("rk-local", vec![entry(7.0, "mine", T0 + 1_000)]);
    let harness = Harness::new(
        std::slice::from_ref(&fresh_local),
        &[stale, other_device.clone()],
    );
    harness.local().set_cleared_at(T0).unwrap();

    let report = completed(harness.scheduler.perform_sync().await);

    assert_eq!(report.cleared, 1);
    assert!(report.pushed);
    assert_eq!(report.backfilled, vec![key("rk-new")]);
    let expected = snapshot(&[fresh_local, other_device]);
    assert_eq!(harness.remote.snapshot().unwrap(), expected);
    assert_eq!(harness.local().snapshot().unwrap(), expected);
    assert_eq!(harness.local().cleared_at().unwrap(), None);
}

/// Performs a foreground write to the local store while the push is in flight.
struct ForegroundWriteRemote {
    inner: InMemoryBlobAdapter,
    local: LocalRecordStore<Arc<MemoryKvStore>>,
    write: Mutex<Option<ResourceRecord>>,
}

impl RemoteBlobAdapter for ForegroundWriteRemote {
    fn backend_name(&self) -> &str {
        "foreground-write"
    }

    async fn get_all(&self) -> RemoteResult<RemoteSnapshot> {
        self.inner.get_all().await
    }

    async fn save_all(
        &self,
        snapshot: &Snapshot,
        precondition: &VersionToken,
    ) -> RemoteResult<()> {
        let write = self.write.lock().unwrap().take();
        if let Some(record) = write {
            self.local.put(&record).unwrap();
        }
        self.inner.save_all(snapshot, precondition).await
    }
}

#[tokio::test]
async fn foreground_write_during_sync_is_not_clobbered() {
    let local = record("rk-k", vec![entry(10.0, "a", T0 + 1_000)]);
    let remote = record("rk-k", vec![entry(20.0, "b", T0 + 2_000)]);
    let foreground = record(
        "rk-k",
        vec![entry(10.0, "a", T0 + 1_000), entry(30.0, "c", T0 + 3_000)],
    );

    let kv = Arc::new(MemoryKvStore::new());
    seed_local(&kv, &[local]);
    let adapter = Arc::new(ForegroundWriteRemote {
        inner: seed_remote(&[remote]),
        local: LocalRecordStore::new(Arc::clone(&kv)),
        write: Mutex::new(Some(foreground)),
    });
    let scheduler = build_scheduler(
        &kv,
        Arc::clone(&adapter),
        &Arc::new(ManualClock::new(T0 + 5_000)),
        &Arc::new(RecordingNotifier::default()),
        &EngineConfig::default(),
    );
    let store = LocalRecordStore::new(Arc::clone(&kv));
    let expected = vec![
        (10.0, "a".to_string()),
        (20.0, "b".to_string()),
        (30.0, "c".to_string()),
    ];

    completed(scheduler.perform_sync().await);
    let stored = store.get(&key("rk-k")).unwrap().unwrap();
    assert_eq!(labels(&stored), expected);
    assert_eq!(
        labels(&adapter.inner.snapshot().unwrap()[&key("rk-k")]),
        vec![(10.0, "a".to_string()), (20.0, "b".to_string())]
    );

    completed(scheduler.perform_sync().await);
    assert_eq!(
        labels(&adapter.inner.snapshot().unwrap()[&key("rk-k")]),
        expected
    );
    assert_eq!(
        key_set(&adapter.inner.snapshot().unwrap()),
        BTreeSet::from(["rk-k".to_string()])
    );
}

#[tokio::test(start_paused = true)]
async fn run_syncs_on_first_tick_and_stops_on_shutdown() {
    let local = record("rk-a", vec![entry(5.0, "a", T0 - 300)]);
    let harness = Harness::new(std::slice::from_ref(&local), &[]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let stopper = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(harness.scheduler.state().is_running());
        shutdown_tx.send(true).unwrap();
    };
    tokio::join!(harness.scheduler.run(shutdown_rx), stopper);

    assert!(!harness.scheduler.state().is_running());
    assert_eq!(harness.remote.get_calls(), 1);
    assert_eq!(harness.remote.snapshot().unwrap(), snapshot(&[local]));
}
