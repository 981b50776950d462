//! Bookmark entry model

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label carried by the single "last playback position" entry of a record.
pub const AUTO_SAVE_LABEL: &str = "Last position";

/// A unique identifier for a bookmark, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookmarkId(Uuid);

impl BookmarkId {
    /// Create a new unique bookmark ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BookmarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BookmarkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Display colour attached to a bookmark. Opaque to the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Generic,
    Important,
    Alert,
}

impl ColorTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Important => "important",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for ColorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(Self::Generic),
            "important" => Ok(Self::Important),
            "alert" => Ok(Self::Alert),
            other => Err(format!("unknown color tag '{other}'")),
        }
    }
}

/// A position within a media resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkEntry {
    /// Stable identifier, absent on entries written by older clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BookmarkId>,
    /// Position in seconds
    pub timestamp: f64,
    /// Display name
    pub label: String,
    /// Marks the "last playback position" entry
    #[serde(default)]
    pub is_auto_save: bool,
    /// Last write of this entry (Unix ms)
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_tag: Option<ColorTag>,
}

impl BookmarkEntry {
    /// Create a user bookmark
    #[must_use]
    pub fn new(
        timestamp: f64,
        label: impl Into<String>,
        color_tag: Option<ColorTag>,
        now_ms: i64,
    ) -> Self {
        Self {
            id: Some(BookmarkId::new()),
            timestamp,
            label: label.into(),
            is_auto_save: false,
            created_at: now_ms,
            color_tag,
        }
    }

    /// Create the auto-save entry for a playback position
    #[must_use]
    pub fn auto_save(timestamp: f64, now_ms: i64) -> Self {
        Self {
            id: None,
            timestamp,
            label: AUTO_SAVE_LABEL.to_string(),
            is_auto_save: true,
            created_at: now_ms,
            color_tag: None,
        }
    }

    /// Two user bookmarks describe the same moment when their labels match and
    /// their positions are closer than `window_secs`.
    #[must_use]
    pub fn is_duplicate_of(&self, other: &Self, window_secs: f64) -> bool {
        self.label == other.label && (self.timestamp - other.timestamp).abs() < window_secs
    }

    /// Total order used for every stored bookmark list.
    #[must_use]
    pub fn display_order(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then_with(|| self.is_auto_save.cmp(&other.is_auto_save))
            .then_with(|| self.label.cmp(&other.label))
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Addresses a bookmark inside a record, either by list position or by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkRef {
    Index(usize),
    Id(BookmarkId),
}

impl FromStr for BookmarkRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Ok(Self::Index(index));
        }
        s.parse::<BookmarkId>()
            .map(Self::Id)
            .map_err(|_| format!("'{s}' is neither a bookmark index nor a bookmark id"))
    }
}
