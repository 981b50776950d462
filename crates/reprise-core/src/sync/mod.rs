//! Background reconciliation of the local store with the remote snapshot.
//!
//! One cycle reads both replicas fresh, merges them, pushes the result with
//! the precondition captured by the read, and backfills local records the
//! remote improved. Only one cycle runs at a time; foreground writes are not
//! blocked and are picked up by the backfill re-read or the next cycle.

mod clock;
mod notify;
mod state;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notify::{SyncNotice, SyncNotifier, TracingNotifier};
pub use state::{SyncGuard, SyncState};

use crate::config::{EngineConfig, SyncSettings};
use crate::error::{Error, ErrorKind, RemoteError, Result};
use crate::merge::MergeEngine;
use crate::models::{ResourceKey, ResourceRecord, Snapshot};
use crate::remote::{RemoteBlobAdapter, RemoteSnapshot};
use crate::store::{KeyValueStore, LocalRecordStore};
use notify::NotificationLimiter;

/// Condition that made a tick start a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// A tracked resource is playing.
    Playing,
    /// The user added or deleted something recently.
    Interaction,
    /// Nothing else fired for a long time.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another cycle holds the latch.
    AlreadySyncing,
    /// Sync was switched off after an authentication failure.
    Disabled,
    /// No remote credentials.
    NotConfigured,
}

/// What a successful cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Whether the merged snapshot was written to the remote store.
    pub pushed: bool,
    pub merged_records: usize,
    /// Local keys rewritten with merged content.
    pub backfilled: Vec<ResourceKey>,
    /// Local writes that failed after the remote accepted the merge; the
    /// next cycle retries them.
    pub deferred: usize,
    /// Remote records removed by a pending "clear all".
    pub cleared: usize,
    /// Recorded completion time.
    pub synced_at: i64,
}

#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
    Failed { error: Error, attempts: u32 },
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Drives sync cycles over a local store and a remote adapter.
pub struct SyncScheduler<S, R> {
    local: LocalRecordStore<S>,
    remote: R,
    engine: MergeEngine,
    settings: SyncSettings,
    state: Arc<SyncState>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn SyncNotifier>,
    limiter: NotificationLimiter,
}

impl<S, R> std::fmt::Debug for SyncScheduler<S, R> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncScheduler")
            .field("engine", &self.engine)
            .field("settings", &self.settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore, R: RemoteBlobAdapter> SyncScheduler<S, R> {
    pub fn new(
        local: LocalRecordStore<S>,
        remote: R,
        state: Arc<SyncState>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            local,
            remote,
            engine: MergeEngine::new(config.merge),
            settings: config.sync.clone(),
            state,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            limiter: NotificationLimiter::new(config.sync.notify_min_interval_ms),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn SyncNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub const fn state(&self) -> &Arc<SyncState> {
        &self.state
    }

    #[must_use]
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Which trigger, if any, fires at `now_ms`.
    #[must_use]
    pub fn should_sync(&self, now_ms: i64) -> Option<SyncTrigger> {
        if self.state.is_disabled() {
            return None;
        }

        let since_sync = self
            .state
            .last_sync()
            .map_or(i64::MAX, |last| now_ms.saturating_sub(last));

        if self.state.is_playing() && since_sync > self.settings.playing_min_gap_ms {
            return Some(SyncTrigger::Playing);
        }

        let recently_active = self.state.last_interaction().is_some_and(|last| {
            now_ms.saturating_sub(last) <= self.settings.interaction_window_ms
        });
        if recently_active && since_sync > self.settings.interaction_min_gap_ms {
            return Some(SyncTrigger::Interaction);
        }

        (since_sync > self.settings.fallback_gap_ms).then_some(SyncTrigger::Fallback)
    }

    /// Evaluate the triggers once and sync if one fires.
    pub async fn tick(&self) -> Option<SyncOutcome> {
        let trigger = self.should_sync(self.clock.now_ms())?;
        tracing::debug!(?trigger, "Sync triggered");
        Some(self.perform_sync().await)
    }

    /// Tick on the configured period until `shutdown` flips to `true` or its
    /// sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.state.init();
        let mut interval = tokio::time::interval(self.settings.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            backend = self.remote.backend_name(),
            period_ms = self.settings.tick_interval_ms,
            "Sync scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.state.shutdown();
        tracing::info!("Sync scheduler stopped");
    }

    /// Run one cycle now, retrying transient failures with backoff.
    ///
    /// Returns immediately when another cycle holds the latch.
    pub async fn perform_sync(&self) -> SyncOutcome {
        if self.state.is_disabled() {
            return SyncOutcome::Skipped(SkipReason::Disabled);
        }
        let Some(_guard) = self.state.try_begin() else {
            tracing::debug!("Sync already in progress; skipping");
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt_cycle().await {
                Ok(mut report) => {
                    report.attempts = attempt;
                    report.synced_at = self.state.record_sync(self.clock.now_ms());
                    tracing::info!(
                        attempts = attempt,
                        pushed = report.pushed,
                        records = report.merged_records,
                        backfilled = report.backfilled.len(),
                        deferred = report.deferred,
                        cleared = report.cleared,
                        "Sync completed"
                    );
                    return SyncOutcome::Completed(report);
                }
                Err(Error::Remote(RemoteError::NotConfigured)) => {
                    tracing::debug!("Remote sync not configured; skipping");
                    return SyncOutcome::Skipped(SkipReason::NotConfigured);
                }
                Err(error) => {
                    let should_retry =
                        attempt < self.settings.max_attempts && error.is_recoverable();
                    if !should_retry {
                        self.report_failure(&error, attempt);
                        return SyncOutcome::Failed {
                            error,
                            attempts: attempt,
                        };
                    }

                    let delay = self.settings.backoff_delay(attempt);
                    tracing::warn!(
                        attempt,
                        "Transient sync failure, retrying in {}ms: {}",
                        delay.as_millis(),
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_cycle(&self) -> Result<SyncReport> {
        let local = self.local.snapshot()?;
        let cleared_at = self.local.cleared_at()?;
        let RemoteSnapshot {
            records: fetched,
            token,
        } = self.remote.get_all().await?;

        let mut remote = fetched.clone();
        let cleared = cleared_at.map_or(0, |marker| drop_cleared(&mut remote, marker));
        let merged = self.engine.merge_snapshots(&local, &remote);

        let pushed = merged != fetched;
        if pushed {
            self.remote.save_all(&merged, &token).await?;
        }

        let mut report = SyncReport {
            pushed,
            merged_records: merged.len(),
            cleared,
            ..SyncReport::default()
        };
        self.backfill_all(&local, &merged, cleared_at, &mut report);
        Ok(report)
    }

    /// Bring the local store up to the merged snapshot. The remote already
    /// holds the merge, so local failures are logged and left for the next
    /// cycle instead of failing this one.
    fn backfill_all(
        &self,
        local: &Snapshot,
        merged: &Snapshot,
        cleared_at: Option<i64>,
        report: &mut SyncReport,
    ) {
        let current_marker = match self.local.cleared_at() {
            Ok(marker) => marker,
            Err(error) => {
                tracing::warn!("Skipping local backfill; clear marker unreadable: {error}");
                report.deferred = merged
                    .iter()
                    .filter(|(key, record)| local.get(*key) != Some(*record))
                    .count();
                return;
            }
        };

        for (key, record) in merged {
            if current_marker.is_some_and(|marker| record.activity() <= marker) {
                continue;
            }
            let seen = local.get(key);
            if seen == Some(record) {
                continue;
            }
            match self.backfill(key, record, seen) {
                Ok(true) => report.backfilled.push(key.clone()),
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(key = %key, "Local backfill deferred to next cycle: {error}");
                    report.deferred += 1;
                }
            }
        }

        if let Some(marker) = cleared_at {
            if current_marker == Some(marker) {
                if let Err(error) = self.local.clear_cleared_at() {
                    tracing::warn!("Failed to drop clear marker: {error}");
                }
            }
        }
    }

    /// Write `merged` into the local store unless a foreground write landed
    /// since the snapshot was taken, in which case the two are merged again.
    fn backfill(
        &self,
        key: &ResourceKey,
        merged: &ResourceRecord,
        seen: Option<&ResourceRecord>,
    ) -> Result<bool> {
        let current = match self.local.get(key) {
            Ok(current) => current,
            Err(Error::Validation(message)) => {
                tracing::warn!(key = %key, "Overwriting invalid local record: {message}");
                None
            }
            Err(error) => return Err(error),
        };

        let record = match &current {
            Some(current) if Some(current) != seen => {
                tracing::debug!(key = %key, "Local record changed during sync; re-merging");
                self.engine.merge_record(current, merged)
            }
            _ => merged.clone(),
        };
        if current.as_ref() == Some(&record) {
            return Ok(false);
        }

        self.local.put(&record)?;
        Ok(true)
    }

    fn report_failure(&self, error: &Error, attempts: u32) {
        tracing::error!(attempts, "Sync failed: {error}");

        let Error::Remote(remote_error) = error else {
            return;
        };
        let kind = remote_error.kind();
        let sync_disabled = kind == ErrorKind::Auth;
        if sync_disabled {
            self.state.disable();
        }
        if self.limiter.allow(kind, self.clock.now_ms()) {
            self.notifier.notify(&SyncNotice {
                kind,
                message: remote_error.to_string(),
                sync_disabled,
            });
        }
    }
}

/// Remove remote records untouched since a local "clear all"; returns how many.
fn drop_cleared(remote: &mut Snapshot, cleared_at: i64) -> usize {
    let before = remote.len();
    remote.retain(|_, record| record.activity() > cleared_at);
    before - remote.len()
}

#[cfg(test)]
mod tests;
