//! Two-replica reconciliation of resource records.
//!
//! The merge never drops a user bookmark that is not a duplicate, but it is
//! deliberately directed: one side is chosen as the *base* and donates the
//! auto-save entry and the scalar metadata, so playback resumes where the most
//! recently active device left off. The losing side's auto-save is the only
//! information a merge discards.

use crate::config::MergePolicy;
use crate::models::{BookmarkEntry, ResourceRecord, Snapshot};

/// Which replica a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

/// Why a side was chosen as base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseReason {
    /// Both sides have auto-saves further apart than the tie threshold.
    AutoSaveRecency,
    /// Only this side has an auto-save.
    SoleAutoSave,
    /// Ranked by record activity (ties favour the local side).
    Activity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseChoice {
    pub side: Side,
    pub reason: BaseReason,
}

/// Pure merge functions parameterised by a [`MergePolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MergeEngine {
    policy: MergePolicy,
}

impl MergeEngine {
    #[must_use]
    pub const fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    /// Decide which replica donates the auto-save and metadata.
    #[must_use]
    pub fn select_base(&self, local: &ResourceRecord, remote: &ResourceRecord) -> BaseChoice {
        match (local.auto_save(), remote.auto_save()) {
            (Some(local_save), Some(remote_save)) => {
                let gap = local_save.created_at.abs_diff(remote_save.created_at);
                let threshold = self.policy.auto_save_tie_threshold_ms.unsigned_abs();
                if gap > threshold {
                    let side = if remote_save.created_at > local_save.created_at {
                        Side::Remote
                    } else {
                        Side::Local
                    };
                    BaseChoice {
                        side,
                        reason: BaseReason::AutoSaveRecency,
                    }
                } else {
                    by_activity(local, remote)
                }
            }
            (Some(_), None) => BaseChoice {
                side: Side::Local,
                reason: BaseReason::SoleAutoSave,
            },
            (None, Some(_)) => BaseChoice {
                side: Side::Remote,
                reason: BaseReason::SoleAutoSave,
            },
            (None, None) => by_activity(local, remote),
        }
    }

    /// Reconcile two replicas of the same resource.
    ///
    /// | field            | donor                                        |
    /// |------------------|----------------------------------------------|
    /// | `key`            | local (both sides share it)                  |
    /// | `url`, `title`   | base                                         |
    /// | `duration`       | longer known one, if every bookmark fits it  |
    /// | user bookmarks   | base ∪ non-duplicate bookmarks of newer      |
    /// | auto-save        | base, whole entry                            |
    /// | `last_modified`  | max activity of both sides                   |
    /// | `schema_version` | base                                         |
    /// | `sync_version`   | base, +1 when the result differs from base   |
    #[must_use]
    pub fn merge_record(&self, local: &ResourceRecord, remote: &ResourceRecord) -> ResourceRecord {
        let choice = self.select_base(local, remote);
        let (base, newer) = match choice.side {
            Side::Local => (local, remote),
            Side::Remote => (remote, local),
        };

        let mut bookmarks: Vec<BookmarkEntry> = base.user_bookmarks().cloned().collect();
        for candidate in newer.user_bookmarks() {
            let duplicate = bookmarks.iter().any(|existing| {
                candidate.is_duplicate_of(existing, self.policy.duplicate_window_secs)
            });
            if !duplicate {
                bookmarks.push(candidate.clone());
            }
        }
        if let Some(auto_save) = base.auto_save() {
            bookmarks.push(auto_save.clone());
        }
        bookmarks.sort_by(BookmarkEntry::display_order);
        let furthest = bookmarks
            .iter()
            .map(|entry| entry.timestamp)
            .max_by(f64::total_cmp);
        let duration = longer_duration(base.duration, newer.duration)
            .filter(|duration| furthest.is_none_or(|furthest| furthest <= *duration));

        let mut merged = ResourceRecord {
            key: local.key.clone(),
            url: base.url.clone(),
            title: base.title.clone(),
            duration,
            bookmarks,
            last_modified: local.activity().max(remote.activity()),
            schema_version: base.schema_version,
            sync_version: base.sync_version,
        };
        if !same_content(&merged, base) {
            merged.sync_version = base.sync_version.saturating_add(1);
        }

        tracing::trace!(
            key = %merged.key,
            base = ?choice.side,
            reason = ?choice.reason,
            bookmarks = merged.bookmarks.len(),
            "Merged record"
        );
        merged
    }

    /// Union of keys; keys present on both sides go through [`Self::merge_record`].
    #[must_use]
    pub fn merge_snapshots(&self, local: &Snapshot, remote: &Snapshot) -> Snapshot {
        let mut merged = remote.clone();
        for (key, local_record) in local {
            let record = match remote.get(key) {
                Some(remote_record) => self.merge_record(local_record, remote_record),
                None => local_record.clone(),
            };
            merged.insert(key.clone(), record);
        }
        merged
    }
}

fn by_activity(local: &ResourceRecord, remote: &ResourceRecord) -> BaseChoice {
    let side = if remote.activity() > local.activity() {
        Side::Remote
    } else {
        Side::Local
    };
    BaseChoice {
        side,
        reason: BaseReason::Activity,
    }
}

/// Each side's entries fit its own duration, so the longer one fits the union
/// when both are known.
fn longer_duration(base: Option<f64>, newer: Option<f64>) -> Option<f64> {
    match (base, newer) {
        (Some(base), Some(newer)) => Some(base.max(newer)),
        (base, newer) => base.or(newer),
    }
}

/// Equal in everything but `sync_version`.
fn same_content(left: &ResourceRecord, right: &ResourceRecord) -> bool {
    left.key == right.key
        && left.url == right.url
        && left.title == right.title
        && left.duration == right.duration
        && left.bookmarks == right.bookmarks
        && left.last_modified == right.last_modified
        && left.schema_version == right.schema_version
}
