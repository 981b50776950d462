//! Shared mutable state of the sync scheduler.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

const NEVER: i64 = i64::MIN;

/// Flags and timestamps shared between the scheduler and foreground callers.
///
/// Held behind an `Arc`; the scheduler owns one handle and every
/// [`crate::services::BookmarkService`] that should nudge the cadence owns another.
#[derive(Debug)]
pub struct SyncState {
    running: AtomicBool,
    syncing: AtomicBool,
    disabled: AtomicBool,
    playing: AtomicBool,
    last_sync_ms: AtomicI64,
    last_interaction_ms: AtomicI64,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            syncing: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            last_sync_ms: AtomicI64::new(NEVER),
            last_interaction_ms: AtomicI64::new(NEVER),
        }
    }

    /// Mark the background loop as started.
    pub fn init(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Mark the background loop as stopped. An in-flight cycle still finishes.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Stop syncing until [`Self::reenable`] (after credentials were rejected).
    pub fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
    }

    pub fn reenable(&self) {
        self.disabled.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Record a foreground add/delete.
    pub fn touch_interaction(&self, now_ms: i64) {
        self.last_interaction_ms.fetch_max(now_ms, Ordering::SeqCst);
    }

    #[must_use]
    pub fn last_interaction(&self) -> Option<i64> {
        read_timestamp(&self.last_interaction_ms)
    }

    #[must_use]
    pub fn last_sync(&self) -> Option<i64> {
        read_timestamp(&self.last_sync_ms)
    }

    /// Store the completion time of a cycle and return it.
    ///
    /// The stored value strictly increases even if the clock stalls or steps back.
    pub fn record_sync(&self, now_ms: i64) -> i64 {
        let mut current = self.last_sync_ms.load(Ordering::SeqCst);
        loop {
            let next = if current == NEVER {
                now_ms
            } else {
                now_ms.max(current.saturating_add(1))
            };
            match self.last_sync_ms.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// Take the mutual-exclusion latch. `None` when a cycle is already running.
    pub fn try_begin(&self) -> Option<SyncGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SyncGuard { state: self })
    }
}

fn read_timestamp(value: &AtomicI64) -> Option<i64> {
    let value = value.load(Ordering::SeqCst);
    (value != NEVER).then_some(value)
}

/// Releases the latch when dropped, whichever way the cycle ends.
#[derive(Debug)]
pub struct SyncGuard<'a> {
    state: &'a SyncState,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.state.syncing.store(false, Ordering::SeqCst);
    }
}
