//! Bookmark operations used by the gesture/UI layer.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{EngineConfig, ServiceSettings};
use crate::key::{MediaContext, ResourceKeyDeriver};
use crate::merge::MergeEngine;
use crate::models::{
    BookmarkEntry, BookmarkRef, ColorTag, ResourceKey, ResourceRecord, Snapshot,
};
use crate::store::{KeyValueStore, LocalRecordStore};
use crate::sync::{Clock, SyncState, SystemClock};
use crate::util::{format_position, normalize_text_option};
use crate::{Error, Result};

/// Descriptive metadata of a resource the UI is currently showing.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedResource {
    pub key: ResourceKey,
    pub url: String,
    pub title: String,
    pub duration: Option<f64>,
}

/// Adds, deletes and queries bookmarks in the local store.
///
/// Every mutation is a single-record upsert, so it can run while a sync cycle
/// is in flight.
pub struct BookmarkService<S> {
    store: LocalRecordStore<S>,
    deriver: ResourceKeyDeriver,
    engine: MergeEngine,
    settings: ServiceSettings,
    sync_state: Option<Arc<SyncState>>,
    clock: Arc<dyn Clock>,
    tracked: Mutex<BTreeMap<ResourceKey, TrackedResource>>,
    pending_auto_saves: Mutex<BTreeMap<ResourceKey, f64>>,
}

impl<S> std::fmt::Debug for BookmarkService<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BookmarkService")
            .field("deriver", &self.deriver)
            .field("engine", &self.engine)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore> BookmarkService<S> {
    pub fn new(store: LocalRecordStore<S>, config: &EngineConfig) -> Self {
        Self {
            store,
            deriver: ResourceKeyDeriver::new(config.key.clone()),
            engine: MergeEngine::new(config.merge),
            settings: config.service,
            sync_state: None,
            clock: Arc::new(SystemClock),
            tracked: Mutex::new(BTreeMap::new()),
            pending_auto_saves: Mutex::new(BTreeMap::new()),
        }
    }

    /// Report interactions and playback to a sync scheduler.
    #[must_use]
    pub fn with_sync_state(mut self, state: Arc<SyncState>) -> Self {
        self.sync_state = Some(state);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &LocalRecordStore<S> {
        &self.store
    }

    #[must_use]
    pub fn derive_key(&self, context: &MediaContext) -> Option<ResourceKey> {
        self.deriver.derive(context)
    }

    /// Derive the key and remember the resource's metadata for later writes.
    ///
    /// Returns `None` when the resource has no identity (previews, live
    /// streams, unknown duration); nothing should be persisted for it.
    pub fn track(&self, context: &MediaContext, title: &str) -> Option<TrackedResource> {
        let key = self.derive_key(context)?;
        let resource = TrackedResource {
            key: key.clone(),
            url: context.page_url.trim().to_string(),
            title: title.trim().to_string(),
            duration: context.duration.filter(|duration| duration.is_finite()),
        };
        lock(&self.tracked).insert(key, resource.clone());
        Some(resource)
    }

    /// Remember metadata for a key that was derived elsewhere.
    ///
    /// Non-finite or negative durations are ignored.
    pub fn remember(&self, resource: TrackedResource) {
        let resource = TrackedResource {
            duration: resource
                .duration
                .filter(|duration| duration.is_finite() && *duration >= 0.0),
            ..resource
        };
        lock(&self.tracked).insert(resource.key.clone(), resource);
    }

    pub fn set_playing(&self, playing: bool) {
        if let Some(state) = &self.sync_state {
            state.set_playing(playing);
        }
    }

    /// Add a user bookmark; an empty label becomes the formatted position.
    pub fn add_bookmark(
        &self,
        key: &ResourceKey,
        timestamp: f64,
        label: &str,
        color_tag: Option<ColorTag>,
    ) -> Result<BookmarkEntry> {
        let now = self.clock.now_ms();
        let mut record = self.load_or_create(key, now)?;
        check_position(timestamp, record.duration)?;

        let label = normalize_text_option(Some(label.to_string()))
            .unwrap_or_else(|| format_position(timestamp));
        let entry = BookmarkEntry::new(timestamp, label, color_tag, now);
        record.insert_bookmark(entry.clone(), now);
        self.store.put(&record)?;
        self.touch_interaction(now);

        tracing::debug!(key = %key, timestamp, "Added bookmark");
        Ok(entry)
    }

    /// Remove a user bookmark, addressed by its position among the user
    /// bookmarks (auto-save excluded) or by id.
    pub fn delete_bookmark(
        &self,
        key: &ResourceKey,
        target: BookmarkRef,
    ) -> Result<BookmarkEntry> {
        let now = self.clock.now_ms();
        let mut record = self
            .store
            .get(key)?
            .ok_or_else(|| Error::NotFound(format!("no bookmarks for {key}")))?;

        let position = match target {
            BookmarkRef::Index(index) => record
                .bookmarks
                .iter()
                .enumerate()
                .filter(|(_, entry)| !entry.is_auto_save)
                .nth(index)
                .map(|(position, _)| position),
            BookmarkRef::Id(id) => record
                .bookmarks
                .iter()
                .position(|entry| !entry.is_auto_save && entry.id == Some(id)),
        }
        .ok_or_else(|| Error::NotFound(format!("bookmark {target:?} in {key}")))?;

        let removed = record.bookmarks.remove(position);
        record.touch(now);
        self.store.put(&record)?;
        self.touch_interaction(now);

        tracing::debug!(key = %key, timestamp = removed.timestamp, "Deleted bookmark");
        Ok(removed)
    }

    /// Move the resume position. Returns `false` without writing when the
    /// position is too close to the start or the end to be worth resuming.
    pub fn refresh_auto_save(&self, key: &ResourceKey, timestamp: f64) -> Result<bool> {
        let now = self.clock.now_ms();
        let mut record = self.load_or_create(key, now)?;
        check_position(timestamp, record.duration)?;

        if let Some(duration) = record.duration.filter(|duration| *duration > 0.0) {
            let edge = duration * self.settings.auto_save_edge_fraction;
            if timestamp < edge || timestamp > duration - edge {
                tracing::trace!(key = %key, timestamp, "Auto-save skipped near edge");
                return Ok(false);
            }
        }

        record.set_auto_save(timestamp, now);
        self.store.put(&record)?;
        Ok(true)
    }

    /// Buffer a playback position; only the latest per resource is kept.
    pub fn queue_auto_save(&self, key: &ResourceKey, timestamp: f64) {
        lock(&self.pending_auto_saves).insert(key.clone(), timestamp);
    }

    #[must_use]
    pub fn pending_auto_saves(&self) -> usize {
        lock(&self.pending_auto_saves).len()
    }

    /// Write every buffered position. Best effort: failures are logged and
    /// the rest still flush. Returns how many positions were stored.
    pub fn flush_pending_auto_saves(&self) -> usize {
        let pending = std::mem::take(&mut *lock(&self.pending_auto_saves));
        let mut written = 0;
        for (key, timestamp) in pending {
            match self.refresh_auto_save(&key, timestamp) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(key = %key, "Failed to flush auto-save: {error}");
                }
            }
        }
        written
    }

    pub fn get_record(&self, key: &ResourceKey) -> Result<Option<ResourceRecord>> {
        self.store.get(key)
    }

    /// Bookmarks of one resource in display order, auto-save included.
    pub fn list_bookmarks(&self, key: &ResourceKey) -> Result<Vec<BookmarkEntry>> {
        Ok(self
            .store
            .get(key)?
            .map(|record| record.bookmarks)
            .unwrap_or_default())
    }

    pub fn export_all(&self) -> Result<Snapshot> {
        self.store.snapshot()
    }

    /// Merge `snapshot` into the local store record by record.
    ///
    /// Returns the number of local records created or changed. Invalid
    /// records are skipped with a warning.
    pub fn import_all(&self, snapshot: &Snapshot) -> Result<usize> {
        let mut changed = 0;
        for (key, incoming) in snapshot {
            if *key != incoming.key {
                tracing::warn!(key = %key, "Skipping imported record stored under another key");
                continue;
            }
            if let Err(error) = incoming.validate() {
                tracing::warn!(key = %key, "Skipping invalid imported record: {error}");
                continue;
            }

            let existing = match self.store.get(key) {
                Ok(existing) => existing,
                Err(Error::Validation(message)) => {
                    tracing::warn!(key = %key, "Replacing invalid local record: {message}");
                    None
                }
                Err(error) => return Err(error),
            };
            let merged = existing.as_ref().map_or_else(
                || incoming.clone(),
                |existing| self.engine.merge_record(existing, incoming),
            );
            if existing.as_ref() != Some(&merged) {
                self.store.put(&merged)?;
                changed += 1;
            }
        }

        tracing::info!(records = snapshot.len(), changed, "Imported snapshot");
        Ok(changed)
    }

    /// Delete every local record and leave a marker so the next sync also
    /// removes them remotely. Returns how many records were deleted.
    pub fn clear_all(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let keys = self.store.keys()?;
        for key in &keys {
            self.store.delete(key)?;
        }
        self.store.set_cleared_at(now)?;
        lock(&self.pending_auto_saves).clear();
        self.touch_interaction(now);

        tracing::info!(records = keys.len(), "Cleared all bookmarks");
        Ok(keys.len())
    }

    fn load_or_create(&self, key: &ResourceKey, now: i64) -> Result<ResourceRecord> {
        let tracked = lock(&self.tracked).get(key).cloned();
        let mut record = self
            .store
            .get(key)?
            .unwrap_or_else(|| ResourceRecord::new(key.clone(), "", "", None, now));

        if let Some(resource) = tracked {
            if !resource.url.is_empty() {
                record.url = resource.url;
            }
            if !resource.title.is_empty() {
                record.title = resource.title;
            }
            if let Some(duration) = resource.duration {
                let fits = record
                    .furthest_position()
                    .is_none_or(|furthest| furthest <= duration);
                if fits {
                    record.duration = Some(duration);
                } else {
                    tracing::debug!(
                        key = %key,
                        duration,
                        "Keeping stored duration; entries run past it"
                    );
                }
            }
        }
        Ok(record)
    }

    fn touch_interaction(&self, now: i64) {
        if let Some(state) = &self.sync_state {
            state.touch_interaction(now);
        }
    }
}

fn check_position(timestamp: f64, duration: Option<f64>) -> Result<()> {
    if !timestamp.is_finite() || timestamp < 0.0 {
        return Err(Error::InvalidInput(format!(
            "position must be a non-negative number of seconds, got {timestamp}"
        )));
    }
    if let Some(duration) = duration {
        if timestamp > duration {
            return Err(Error::InvalidInput(format!(
                "position {timestamp} is past the end of the resource ({duration}s)"
            )));
        }
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
