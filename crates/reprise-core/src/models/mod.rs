//! Data models for Reprise

mod bookmark;
mod record;

pub use bookmark::{BookmarkEntry, BookmarkId, BookmarkRef, ColorTag, AUTO_SAVE_LABEL};
pub use record::{ResourceKey, ResourceRecord, Snapshot, CURRENT_SCHEMA_VERSION};
