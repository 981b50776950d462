//! reprise-core - Core library for Reprise
//!
//! Cross-device media bookmarks: resource identity derivation, local record
//! storage, the two-replica merge and the background sync scheduler that
//! reconciles the local store with a remote blob.

pub mod config;
pub mod error;
pub mod export;
pub mod key;
pub mod merge;
pub mod models;
pub mod remote;
pub mod services;
pub mod store;
pub mod sync;
pub mod util;

pub use config::EngineConfig;
pub use error::{Error, ErrorKind, RemoteError, Result};
pub use key::{MediaContext, ResourceKeyDeriver};
pub use merge::MergeEngine;
pub use models::{
    BookmarkEntry, BookmarkId, BookmarkRef, ColorTag, ResourceKey, ResourceRecord, Snapshot,
};
pub use remote::RemoteBlobAdapter;
pub use services::BookmarkService;
pub use store::{KeyValueStore, LocalRecordStore};
pub use sync::{SyncOutcome, SyncScheduler, SyncState};
