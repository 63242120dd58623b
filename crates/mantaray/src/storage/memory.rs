//! In-memory chunk storage implementation

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use crate::error::{MantarayError, Result};
use crate::reference::Reference;
use crate::storage::Storage;
use crate::util;

/// In-memory chunk storage using BTreeMap
///
/// Chunks are addressed by the keccak-256 digest of their payload, so the
/// same bytes always land under the same reference. Useful for tests,
/// temporary manifests, and small trees that fit in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    chunks: Arc<RwLock<BTreeMap<Reference, Bytes>>>,
    writes: Arc<AtomicU64>,
}

impl MemoryStorage {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct chunks stored
    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    /// Whether the store holds no chunks
    pub fn is_empty(&self) -> bool {
        self.chunks.read().unwrap().is_empty()
    }

    /// Number of `save` calls accepted so far
    ///
    /// Unlike [`len`](Self::len), re-submitting identical bytes still counts,
    /// which makes incremental-save behavior observable.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Storage for MemoryStorage {
    async fn load(&self, reference: &Reference) -> Result<Bytes> {
        self.chunks
            .read()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| MantarayError::storage_msg(format!("chunk not found: {reference:?}")))
    }

    async fn save(&self, data: &[u8]) -> Result<Reference> {
        let reference = Reference::try_from(util::keccak256(data).to_vec())?;
        self.chunks
            .write()
            .unwrap()
            .insert(reference.clone(), Bytes::copy_from_slice(data));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(reference)
    }
}
