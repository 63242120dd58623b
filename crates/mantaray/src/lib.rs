//! Mantaray: a content-addressed, compressed radix trie
//!
//! Binds arbitrary byte paths to content references inside a chunk-addressed
//! storage system. A node of the trie is itself a storage chunk: serialized,
//! optionally XOR-obfuscated, and stored under a 32- or 64-byte reference, so
//! saving a tree yields one reference that transitively fixes every
//! descendant.
//!
//! - **Two wire formats**: v0.2 (legacy) and v1.0 (current), each a concrete
//!   node type behind the [`ManifestNode`] tagged union
//! - **Radix mutation algebra**: `add_fork` with prefix-ceiling splitting and
//!   continuous-node overflow, `fork_at_path`, `remove_path`
//! - **Incremental persistence**: dirty subtrees are rewritten depth-first,
//!   independent siblings concurrently; clean subtrees are skipped
//! - **Pluggable storage**: the [`Storage`] trait is the only I/O seam, with
//!   [`MemoryStorage`] as the in-process implementation
//!
//! # Example
//!
//! ```rust,ignore
//! use mantaray::{init_manifest_node, ForkAttributes, MemoryStorage, NodeOptions, Reference};
//!
//! # async fn example() -> mantaray::Result<()> {
//! let storage = MemoryStorage::new();
//! let mut root = init_manifest_node(NodeOptions::default());
//!
//! let entry = Reference::try_from(vec![0x7d; 32])?;
//! root.add_fork(b"docs/readme", ForkAttributes::with_entry(entry), None)?;
//!
//! let reference = root.save(&storage).await?;
//! root.load(&storage, &reference).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
pub mod node;
pub mod reference;
pub mod storage;
pub mod util;

pub use error::{BoxError, MantarayError, Result};
pub use node::{ForkAttributes, KeyGenerator, ManifestNode, NodeOptions, init_manifest_node};
pub use reference::{Metadata, ObfuscationKey, Reference, Version};
pub use storage::{MemoryStorage, Storage};
