//! Consumer-facing services.

mod bookmarks;

pub use bookmarks::{BookmarkService, TrackedResource};
