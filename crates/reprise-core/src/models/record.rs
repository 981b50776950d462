//! Resource record model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::bookmark::BookmarkEntry;
use crate::error::{Error, Result};

/// Schema version written by this build
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Derived identity of a media resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub(crate) const fn from_derived(value: String) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!("invalid resource key '{s}'")));
        }
        Ok(Self(s.to_string()))
    }
}

/// Full key to record mapping; the unit exchanged with the remote store.
pub type Snapshot = BTreeMap<ResourceKey, ResourceRecord>;

/// All bookmarks and the resume position for one media resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub key: ResourceKey,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Resource length in seconds, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Ascending by timestamp
    #[serde(default)]
    pub bookmarks: Vec<BookmarkEntry>,
    /// Last local write (Unix ms)
    pub last_modified: i64,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub sync_version: u64,
}

const fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

impl ResourceRecord {
    /// Create an empty record
    #[must_use]
    pub fn new(
        key: ResourceKey,
        url: impl Into<String>,
        title: impl Into<String>,
        duration: Option<f64>,
        now_ms: i64,
    ) -> Self {
        Self {
            key,
            url: url.into(),
            title: title.into(),
            duration,
            bookmarks: Vec::new(),
            last_modified: now_ms,
            schema_version: CURRENT_SCHEMA_VERSION,
            sync_version: 0,
        }
    }

    /// The "last playback position" entry, if any.
    #[must_use]
    pub fn auto_save(&self) -> Option<&BookmarkEntry> {
        self.bookmarks.iter().find(|entry| entry.is_auto_save)
    }

    /// User-created bookmarks, auto-save excluded.
    pub fn user_bookmarks(&self) -> impl Iterator<Item = &BookmarkEntry> {
        self.bookmarks.iter().filter(|entry| !entry.is_auto_save)
    }

    /// Most recent of the auto-save write, any bookmark creation, and the record's
    /// own modification time. Used to rank replicas by recency.
    #[must_use]
    pub fn activity(&self) -> i64 {
        let auto_save = self.auto_save().map_or(i64::MIN, |entry| entry.created_at);
        let bookmarks = self
            .user_bookmarks()
            .map(|entry| entry.created_at)
            .max()
            .unwrap_or(i64::MIN);
        auto_save.max(bookmarks).max(self.last_modified)
    }

    /// Position of the furthest entry, auto-save included.
    #[must_use]
    pub fn furthest_position(&self) -> Option<f64> {
        self.bookmarks
            .iter()
            .map(|entry| entry.timestamp)
            .max_by(f64::total_cmp)
    }

    /// Restore ascending timestamp order.
    pub fn sort_bookmarks(&mut self) {
        self.bookmarks.sort_by(BookmarkEntry::display_order);
    }

    /// Insert a user bookmark at its sorted position.
    pub fn insert_bookmark(&mut self, entry: BookmarkEntry, now_ms: i64) {
        self.bookmarks.push(entry);
        self.sort_bookmarks();
        self.touch(now_ms);
    }

    /// Replace the auto-save entry with a fresh one at `timestamp`.
    pub fn set_auto_save(&mut self, timestamp: f64, now_ms: i64) {
        self.bookmarks.retain(|entry| !entry.is_auto_save);
        self.bookmarks.push(BookmarkEntry::auto_save(timestamp, now_ms));
        self.sort_bookmarks();
        self.touch(now_ms);
    }

    /// Bump `last_modified`, never moving it backwards.
    pub fn touch(&mut self, now_ms: i64) {
        self.last_modified = self.last_modified.max(now_ms);
    }

    /// Check the structural invariants every persisted record must hold.
    pub fn validate(&self) -> Result<()> {
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(Error::Validation(format!(
                    "record {} has invalid duration {duration}",
                    self.key
                )));
            }
        }

        let mut auto_saves = 0usize;
        for entry in &self.bookmarks {
            if !entry.timestamp.is_finite() || entry.timestamp < 0.0 {
                return Err(Error::Validation(format!(
                    "record {} has bookmark with invalid timestamp {}",
                    self.key, entry.timestamp
                )));
            }
            if let Some(duration) = self.duration.filter(|duration| entry.timestamp > *duration) {
                return Err(Error::Validation(format!(
                    "record {} has bookmark at {} past the end ({duration}s)",
                    self.key, entry.timestamp
                )));
            }
            if entry.is_auto_save {
                auto_saves += 1;
            }
        }

        if auto_saves > 1 {
            return Err(Error::Validation(format!(
                "record {} has {auto_saves} auto-save entries",
                self.key
            )));
        }

        Ok(())
    }
}
