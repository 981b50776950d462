//! Process-local remote store used by tests and offline runs.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{
    decode_document, encode_document, RemoteBlobAdapter, RemoteResult, RemoteSnapshot,
    VersionToken,
};
use crate::error::RemoteError;
use crate::models::Snapshot;

#[derive(Debug, Default)]
struct BlobState {
    document: Option<Vec<u8>>,
    version: u64,
    get_failures: VecDeque<RemoteError>,
    save_failures: VecDeque<RemoteError>,
    get_calls: usize,
    save_calls: usize,
}

impl BlobState {
    fn token(&self) -> VersionToken {
        if self.document.is_some() {
            VersionToken::new(self.version.to_string())
        } else {
            VersionToken::absent()
        }
    }
}

/// Versioned in-memory document with scripted failures.
#[derive(Debug, Default)]
pub struct InMemoryBlobAdapter {
    state: Mutex<BlobState>,
}

impl InMemoryBlobAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document.
    pub fn with_snapshot(snapshot: &Snapshot) -> RemoteResult<Self> {
        let adapter = Self::new();
        adapter.write_external(snapshot)?;
        Ok(adapter)
    }

    fn lock(&self) -> MutexGuard<'_, BlobState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make the next `get_all` fail with `error`. Calls queue up.
    pub fn fail_next_get(&self, error: RemoteError) {
        self.lock().get_failures.push_back(error);
    }

    /// Make the next `save_all` fail with `error`. Calls queue up.
    pub fn fail_next_save(&self, error: RemoteError) {
        self.lock().save_failures.push_back(error);
    }

    /// Replace the document as another device would, bumping the version.
    pub fn write_external(&self, snapshot: &Snapshot) -> RemoteResult<()> {
        let bytes = encode_document(snapshot)?;
        self.put_raw(bytes);
        Ok(())
    }

    /// Store arbitrary bytes as the document.
    pub fn put_raw(&self, bytes: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        state.document = Some(bytes.into());
        state.version += 1;
    }

    /// Decoded view of the current document.
    pub fn snapshot(&self) -> RemoteResult<Snapshot> {
        let state = self.lock();
        state
            .document
            .as_deref()
            .map_or_else(|| Ok(Snapshot::new()), decode_document)
    }

    #[must_use]
    pub fn raw_document(&self) -> Option<Vec<u8>> {
        self.lock().document.clone()
    }

    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.lock().get_calls
    }

    #[must_use]
    pub fn save_calls(&self) -> usize {
        self.lock().save_calls
    }
}

impl RemoteBlobAdapter for InMemoryBlobAdapter {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn get_all(&self) -> RemoteResult<RemoteSnapshot> {
        let mut state = self.lock();
        state.get_calls += 1;
        if let Some(error) = state.get_failures.pop_front() {
            return Err(error);
        }
        let records = match state.document.as_deref() {
            Some(bytes) => decode_document(bytes)?,
            None => Snapshot::new(),
        };
        Ok(RemoteSnapshot {
            records,
            token: state.token(),
        })
    }

    async fn save_all(
        &self,
        snapshot: &Snapshot,
        precondition: &VersionToken,
    ) -> RemoteResult<()> {
        let mut state = self.lock();
        state.save_calls += 1;
        if let Some(error) = state.save_failures.pop_front() {
            return Err(error);
        }
        if state.token() != *precondition {
            return Err(RemoteError::Conflict);
        }
        state.document = Some(encode_document(snapshot)?);
        state.version += 1;
        Ok(())
    }
}
