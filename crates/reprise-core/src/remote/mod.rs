//! Remote blob store holding the shared snapshot.
//!
//! The remote side is one JSON document whose top-level keys are resource keys
//! and whose values are serialized [`ResourceRecord`]s. Adapters read it whole
//! and replace it whole, guarded by an opaque [`VersionToken`].

mod http;
mod memory;
mod r2;

use std::sync::Arc;

pub use http::{HttpBlobAdapter, HttpBlobConfig};
pub use memory::InMemoryBlobAdapter;
pub use r2::{R2BlobAdapter, R2Config};

use crate::error::RemoteError;
use crate::models::{ResourceKey, ResourceRecord, Snapshot};

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Opaque precondition captured by a read and checked by the following write.
///
/// An absent token means "the document did not exist"; writing with it only
/// succeeds if the document still does not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionToken(Option<String>);

impl VersionToken {
    #[must_use]
    pub const fn absent() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Some(tag.into()))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    #[must_use]
    pub const fn is_absent(&self) -> bool {
        self.0.is_none()
    }
}

/// A decoded remote document plus the token to write it back with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    pub records: Snapshot,
    pub token: VersionToken,
}

impl RemoteSnapshot {
    /// What a never-synced account looks like.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Versioned whole-document storage.
#[allow(async_fn_in_trait)]
pub trait RemoteBlobAdapter {
    /// Human-readable backend name (e.g., "r2", "http").
    fn backend_name(&self) -> &str;

    /// Fetch the whole snapshot. A missing document is an empty snapshot, not an error.
    async fn get_all(&self) -> RemoteResult<RemoteSnapshot>;

    /// Atomically replace the document if it still matches `precondition`.
    async fn save_all(&self, snapshot: &Snapshot, precondition: &VersionToken)
        -> RemoteResult<()>;
}

impl<T: RemoteBlobAdapter> RemoteBlobAdapter for Arc<T> {
    fn backend_name(&self) -> &str {
        (**self).backend_name()
    }

    async fn get_all(&self) -> RemoteResult<RemoteSnapshot> {
        (**self).get_all().await
    }

    async fn save_all(
        &self,
        snapshot: &Snapshot,
        precondition: &VersionToken,
    ) -> RemoteResult<()> {
        (**self).save_all(snapshot, precondition).await
    }
}

/// Serialize a snapshot into the persisted document layout.
pub fn encode_document(snapshot: &Snapshot) -> RemoteResult<Vec<u8>> {
    serde_json::to_vec(snapshot)
        .map_err(|error| RemoteError::Validation(format!("failed to encode snapshot: {error}")))
}

/// Token for a blob that was read successfully. Without one the next write
/// would be sent as create-only and could never succeed.
pub(crate) fn read_token(tag: Option<&str>) -> RemoteResult<VersionToken> {
    tag.map(VersionToken::new)
        .ok_or_else(|| RemoteError::Validation("remote did not return a version token".into()))
}

/// Parse a remote document. Individual malformed records are dropped with a
/// warning; a document that is not a JSON object is rejected as a whole.
pub fn decode_document(bytes: &[u8]) -> RemoteResult<Snapshot> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Snapshot::new());
    }

    let document: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)
        .map_err(|error| {
            RemoteError::Validation(format!("remote document is not a JSON object: {error}"))
        })?;

    let mut snapshot = Snapshot::new();
    for (raw_key, value) in document {
        match decode_entry(&raw_key, value) {
            Ok(record) => {
                snapshot.insert(record.key.clone(), record);
            }
            Err(message) => {
                tracing::warn!(key = %raw_key, "Dropping invalid remote record: {message}");
            }
        }
    }
    Ok(snapshot)
}

fn decode_entry(raw_key: &str, value: serde_json::Value) -> Result<ResourceRecord, String> {
    let key: ResourceKey = raw_key.parse().map_err(|error| format!("{error}"))?;
    let record: ResourceRecord =
        serde_json::from_value(value).map_err(|error| error.to_string())?;
    if record.key != key {
        return Err(format!("record claims key {}", record.key));
    }
    record.validate().map_err(|error| error.to_string())?;
    Ok(record)
}
