//! Chunk storage abstraction for manifest nodes

use bytes::Bytes;

use crate::error::Result;
use crate::reference::Reference;

/// Async chunk storage trait
///
/// Provides reference-keyed storage for serialized manifest nodes.
/// Implementations might use:
/// - An in-memory map ([`MemoryStorage`])
/// - A local chunk store or database (user-provided)
/// - A remote storage node behind an HTTP client (user-provided)
///
/// The trie treats returned references as opaque: the storage layer alone
/// decides how a payload maps to its 32- or 64-byte address. `Clone` is
/// required so recursive operations can hand the same handle to independent
/// subtree tasks.
///
/// # Example
///
/// ```rust,ignore
/// use mantaray::storage::{MemoryStorage, Storage};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = MemoryStorage::new();
///
/// let reference = storage.save(b"node payload").await?;
/// let payload = storage.load(&reference).await?;
/// assert_eq!(&payload[..], b"node payload");
/// # Ok(())
/// # }
/// ```
#[trait_variant::make(Send)]
pub trait Storage: Clone {
    /// Fetch a previously saved node payload by reference
    async fn load(&self, reference: &Reference) -> Result<Bytes>;

    /// Persist a node payload, returning the reference it is addressable under
    async fn save(&self, data: &[u8]) -> Result<Reference>;
}

pub mod memory;

pub use memory::MemoryStorage;
