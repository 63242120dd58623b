//! Version 1.0 manifest nodes
//!
//! Wire layout of a serialized node:
//!
//! | offset | size          | field                                   |
//! |--------|---------------|-----------------------------------------|
//! | 0      | 32            | obfuscation key                         |
//! | 32     | 31            | version tag (`keccak("mantaray:1.0")`)  |
//! | 63     | 1             | feature byte                            |
//! | 64     | 0, 32, or 64  | entry (present iff `has_entry`)         |
//! | +0     | 32            | fork index bitmap (present iff edge)    |
//! | +32    | N × record    | fork records, ascending first byte      |
//! | end    | varlen        | node metadata JSON                      |
//!
//! A fork record is `prefixLength (1) | prefix (31) | reference | slot`,
//! where the reference width follows the parent's entry encoding and the
//! slot is `fork_metadata_segment_size × 32` bytes. Everything from offset
//! 32 onward is XORed with the obfuscation key.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use futures::future::try_join_all;

use crate::error::{MantarayError, Result};
use crate::node::{ForkAttributes, KeyGenerator};
use crate::reference::{
    ENCRYPTED_REFERENCE_SIZE, Metadata, ObfuscationKey, Reference, REFERENCE_SIZE, Version,
};
use crate::storage::Storage;
use crate::util::{self, IndexBytes, SEGMENT_SIZE};

/// Maximum prefix bytes a v1.0 edge record carries
pub const PREFIX_CEILING: usize = 31;

/// Wire marker: the prefix continues in a continuous child node
const PREFIX_CONTINUES: u8 = PREFIX_CEILING as u8 + 1;

/// Obfuscation key, version tag, and feature byte
const HEADER_SIZE: usize = 64;

/// Widest slot expressible in the five feature bits
const MAX_SLOT_SEGMENTS: usize = 31;

const FEATURE_HAS_ENTRY: u8 = 0b0000_0001;
const FEATURE_ENC_ENTRY: u8 = 0b0000_0010;
const FEATURE_IS_EDGE: u8 = 0b0000_0100;
const FEATURE_SEGMENTS_SHIFT: u32 = 3;

/// An edge record: branch prefix plus the child it leads to
#[derive(Debug, Clone)]
pub struct Fork {
    /// Branch prefix, 1..=31 bytes, keyed in the parent by its first byte
    pub prefix: Vec<u8>,
    /// Child node
    pub node: Node,
}

impl Fork {
    fn serialize_into(&self, out: &mut Vec<u8>, segments: u8, ref_size: usize) -> Result<()> {
        let address = self
            .node
            .content_address
            .as_ref()
            .ok_or(MantarayError::UnsavedFork {
                first_byte: self.prefix[0],
            })?;
        if address.as_bytes().len() != ref_size {
            return Err(MantarayError::malformed(format!(
                "fork 0x{:02x} reference is {} bytes, parent records {}",
                self.prefix[0],
                address.as_bytes().len(),
                ref_size
            )));
        }
        if self.node.continuous {
            if self.prefix.len() != PREFIX_CEILING {
                return Err(MantarayError::malformed(format!(
                    "continuous fork 0x{:02x} carries {} prefix bytes, not {PREFIX_CEILING}",
                    self.prefix[0],
                    self.prefix.len()
                )));
            }
            out.push(PREFIX_CONTINUES);
        } else {
            out.push(self.prefix.len() as u8);
        }
        let mut prefix = [0u8; PREFIX_CEILING];
        prefix[..self.prefix.len()].copy_from_slice(&self.prefix);
        out.extend_from_slice(&prefix);
        out.extend_from_slice(address.as_bytes());
        if segments > 0 {
            out.extend_from_slice(&util::pad_metadata_in_segments(
                self.node.fork_metadata.as_ref(),
                segments,
            )?);
        }
        Ok(())
    }

    fn deserialize(record: &[u8], key: u8, ref_size: usize, segments: u8) -> Result<Self> {
        let (prefix_len, continuous) = match record[0] {
            0 => {
                return Err(MantarayError::malformed(format!(
                    "fork 0x{key:02x} has a zero-length prefix"
                )));
            }
            len if len as usize > PREFIX_CEILING => (PREFIX_CEILING, true),
            len => (len as usize, false),
        };
        let prefix = record[1..1 + prefix_len].to_vec();
        if prefix[0] != key {
            return Err(MantarayError::malformed(format!(
                "fork prefix starts with 0x{:02x}, indexed under 0x{key:02x}",
                prefix[0]
            )));
        }
        let address = Reference::try_from(&record[PREFIX_CEILING + 1..PREFIX_CEILING + 1 + ref_size])?;
        let fork_metadata = if segments > 0 {
            util::parse_metadata(&record[PREFIX_CEILING + 1 + ref_size..])?
        } else {
            None
        };
        let node = Node {
            content_address: Some(address),
            continuous,
            fork_metadata,
            ..Default::default()
        };
        Ok(Fork { prefix, node })
    }
}

/// v1.0 manifest trie node
///
/// Children are owned exclusively through the fork map; a node loaded from
/// storage holds its children as reference-only shells until they are loaded
/// themselves. The cached content address doubles as the clean flag: a node
/// without one is dirty and will be rewritten on the next save.
#[derive(Debug, Clone, Default)]
pub struct Node {
    obfuscation_key: ObfuscationKey,
    entry: Option<Reference>,
    metadata: Option<Metadata>,
    /// Serialized in the parent's edge record slot; carried here in memory so
    /// it survives splits and other rearrangements
    fork_metadata: Option<Metadata>,
    fork_metadata_segment_size: u8,
    forks: BTreeMap<u8, Fork>,
    content_address: Option<Reference>,
    continuous: bool,
}

impl Node {
    /// Fresh dirty node with the given obfuscation key
    pub fn new(obfuscation_key: ObfuscationKey) -> Self {
        Self {
            obfuscation_key,
            ..Default::default()
        }
    }

    /// The node's obfuscation key
    pub fn obfuscation_key(&self) -> &ObfuscationKey {
        &self.obfuscation_key
    }

    /// Replace the obfuscation key
    pub fn set_obfuscation_key(&mut self, key: ObfuscationKey) {
        self.obfuscation_key = key;
        self.make_dirty();
    }

    /// The entry reference, if any
    pub fn entry(&self) -> Option<&Reference> {
        self.entry.as_ref()
    }

    /// Replace the entry reference
    pub fn set_entry(&mut self, entry: Option<Reference>) {
        self.entry = entry;
        self.make_dirty();
    }

    /// Whether the node carries an entry
    pub fn has_entry(&self) -> bool {
        self.entry.is_some()
    }

    /// Whether the entry is a 64-byte encrypted reference
    pub fn enc_entry(&self) -> bool {
        self.entry.as_ref().is_some_and(Reference::is_encrypted)
    }

    /// Whether the node has children
    pub fn is_edge(&self) -> bool {
        !self.forks.is_empty()
    }

    /// Whether this node chains an over-long parent prefix
    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Node-level metadata, serialized on this node's own chunk
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Replace the node-level metadata
    pub fn set_metadata(&mut self, metadata: Option<Metadata>) {
        self.metadata = metadata;
        self.make_dirty();
    }

    /// Fork-level metadata, serialized in the parent's edge record slot
    pub fn fork_metadata(&self) -> Option<&Metadata> {
        self.fork_metadata.as_ref()
    }

    /// Replace the fork-level metadata
    ///
    /// Prefer installing fork metadata through [`add_fork`](Self::add_fork),
    /// which also sizes the parent's slot.
    pub fn set_fork_metadata(&mut self, metadata: Option<Metadata>) {
        self.fork_metadata = metadata;
        self.make_dirty();
    }

    /// Slot width for this node's fork records, in 32-byte segments
    pub fn fork_metadata_segment_size(&self) -> u8 {
        self.fork_metadata_segment_size
    }

    /// Set the slot width for this node's fork records
    pub fn set_fork_metadata_segment_size(&mut self, segments: u8) -> Result<()> {
        if segments as usize > MAX_SLOT_SEGMENTS {
            return Err(MantarayError::MetadataOverflow {
                size: segments as usize * SEGMENT_SIZE,
                capacity: MAX_SLOT_SEGMENTS * SEGMENT_SIZE,
            });
        }
        self.fork_metadata_segment_size = segments;
        self.make_dirty();
        Ok(())
    }

    /// The fork map, keyed by each prefix's first byte
    pub fn forks(&self) -> &BTreeMap<u8, Fork> {
        &self.forks
    }

    /// Reference this node was last saved under, if clean
    pub fn content_address(&self) -> Option<&Reference> {
        self.content_address.as_ref()
    }

    /// Whether the node must be rewritten on the next save
    pub fn is_dirty(&self) -> bool {
        self.content_address.is_none()
    }

    /// Drop the cached content address, forcing a rewrite on the next save
    pub fn make_dirty(&mut self) {
        self.content_address = None;
    }

    /// Bind `path` to the given attributes, splitting edges as needed
    ///
    /// An empty path applies the attributes to this node itself. Paths longer
    /// than the 31-byte prefix ceiling chain continuous nodes. Under a parent
    /// with a non-zero obfuscation key, every newly allocated node takes a
    /// fresh key from `keys`; the call fails without a generator.
    pub fn add_fork(
        &mut self,
        path: &[u8],
        attributes: ForkAttributes,
        mut keys: Option<&mut dyn KeyGenerator>,
    ) -> Result<()> {
        self.add_fork_inner(path, attributes, &mut keys)
    }

    fn add_fork_inner(
        &mut self,
        path: &[u8],
        attributes: ForkAttributes,
        keys: &mut Option<&mut dyn KeyGenerator>,
    ) -> Result<()> {
        if path.is_empty() {
            self.apply_attributes(attributes);
            return Ok(());
        }
        let first = path[0];
        match self.forks.remove(&first) {
            None => {
                let mut child = Node::new(self.child_key(keys)?);
                if path.len() > PREFIX_CEILING {
                    child.continuous = true;
                    child.add_fork_inner(&path[PREFIX_CEILING..], attributes, keys)?;
                    self.forks.insert(
                        first,
                        Fork {
                            prefix: path[..PREFIX_CEILING].to_vec(),
                            node: child,
                        },
                    );
                } else {
                    child.apply_attributes(attributes);
                    self.ensure_fork_slot(child.fork_metadata.as_ref())?;
                    self.forks.insert(
                        first,
                        Fork {
                            prefix: path.to_vec(),
                            node: child,
                        },
                    );
                }
            }
            Some(mut fork) => {
                let common = util::common_prefix_len(&fork.prefix, path);
                // attributes landing on a direct child occupy this node's slot
                if path.len() == common {
                    if let Err(e) = self.ensure_fork_slot(attributes.fork_metadata.as_ref()) {
                        self.forks.insert(first, fork);
                        return Err(e);
                    }
                }
                if common == fork.prefix.len() {
                    let result = fork.node.add_fork_inner(&path[common..], attributes, keys);
                    self.forks.insert(first, fork);
                    result?;
                } else {
                    // the match ends inside this edge: split it
                    if !chain_is_loaded(&fork) {
                        self.forks.insert(first, fork);
                        return Err(MantarayError::malformed(
                            "edge splits inside an unloaded continuous chain; load the subtree first",
                        ));
                    }
                    let head = fork.prefix[..common].to_vec();
                    let mut mid = match self.child_key(keys) {
                        Ok(key) => Node::new(key),
                        Err(e) => {
                            self.forks.insert(first, fork);
                            return Err(e);
                        }
                    };
                    mid.adopt_split_fork(fork, common, keys)?;
                    mid.add_fork_inner(&path[common..], attributes, keys)?;
                    self.forks.insert(
                        first,
                        Fork {
                            prefix: head,
                            node: mid,
                        },
                    );
                }
            }
        }
        self.make_dirty();
        Ok(())
    }

    /// Walk stored prefixes toward `path`, returning the edge terminating it
    pub fn fork_at_path(&self, path: &[u8]) -> Result<&Fork> {
        if path.is_empty() {
            return Err(MantarayError::EmptyPath);
        }
        self.fork_at_path_inner(path, path)
    }

    fn fork_at_path_inner(&self, path: &[u8], full: &[u8]) -> Result<&Fork> {
        let fork = self
            .forks
            .get(&path[0])
            .ok_or_else(|| MantarayError::not_found(full))?;
        let rest = path
            .strip_prefix(fork.prefix.as_slice())
            .ok_or_else(|| MantarayError::not_found(full))?;
        if rest.is_empty() {
            Ok(fork)
        } else {
            fork.node.fork_at_path_inner(rest, full)
        }
    }

    /// Remove the fork terminating `path`, with its whole subtree
    ///
    /// No up-merge happens when a parent is left with a single child; the
    /// trie accepts temporarily non-minimal shapes. Continuous links with
    /// nothing left to chain are pruned with their edge.
    pub fn remove_path(&mut self, path: &[u8]) -> Result<()> {
        if path.is_empty() {
            return Err(MantarayError::EmptyPath);
        }
        self.remove_path_inner(path, path)
    }

    fn remove_path_inner(&mut self, path: &[u8], full: &[u8]) -> Result<()> {
        let first = path[0];
        let Some(fork) = self.forks.get_mut(&first) else {
            return Err(MantarayError::not_found(full));
        };
        let Some(rest) = path.strip_prefix(fork.prefix.as_slice()) else {
            return Err(MantarayError::not_found(full));
        };
        if rest.is_empty() {
            self.forks.remove(&first);
        } else {
            fork.node.remove_path_inner(rest, full)?;
            let prune = fork.node.continuous && fork.node.forks.is_empty();
            if prune {
                self.forks.remove(&first);
            }
        }
        self.make_dirty();
        Ok(())
    }

    /// Marshal this node to its wire representation
    ///
    /// Fork records embed child content addresses, so every child must have
    /// been saved; [`save`](Self::save) takes care of the ordering.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let ref_size = if self.enc_entry() {
            ENCRYPTED_REFERENCE_SIZE
        } else {
            REFERENCE_SIZE
        };
        let mut data = Vec::with_capacity(HEADER_SIZE + ref_size);
        data.extend_from_slice(self.obfuscation_key.as_bytes());
        data.extend_from_slice(&Version::V1_0.tag());
        data.push(self.features());
        if let Some(entry) = &self.entry {
            data.extend_from_slice(entry.as_bytes());
        }
        if !self.forks.is_empty() {
            let mut index = IndexBytes::default();
            for key in self.forks.keys() {
                index.set(*key);
            }
            data.extend_from_slice(index.as_bytes());
            for fork in self.forks.values() {
                fork.serialize_into(&mut data, self.fork_metadata_segment_size, ref_size)?;
            }
        }
        if let Some(metadata) = &self.metadata {
            data.extend_from_slice(&util::encode_metadata(metadata)?);
        }
        util::xor_in_place(&self.obfuscation_key, &mut data[32..]);
        Ok(data)
    }

    /// Unmarshal a v1.0 node
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(MantarayError::malformed(format!(
                "node is {} bytes, header needs {HEADER_SIZE}",
                data.len()
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&data[..32]);
        let obfuscation_key = ObfuscationKey::from(key);
        let mut data = data.to_vec();
        util::xor_in_place(&obfuscation_key, &mut data[32..]);
        if data[32..63] != Version::V1_0.tag() {
            return Err(MantarayError::malformed("version tag mismatch"));
        }
        let features = data[63];
        let has_entry = features & FEATURE_HAS_ENTRY != 0;
        let enc_entry = features & FEATURE_ENC_ENTRY != 0;
        let is_edge = features & FEATURE_IS_EDGE != 0;
        let segments = features >> FEATURE_SEGMENTS_SHIFT;
        if enc_entry && !has_entry {
            return Err(MantarayError::malformed(
                "encrypted-entry flag without an entry",
            ));
        }
        let ref_size = if enc_entry {
            ENCRYPTED_REFERENCE_SIZE
        } else {
            REFERENCE_SIZE
        };
        let mut offset = HEADER_SIZE;
        let entry = if has_entry {
            let bytes = data
                .get(offset..offset + ref_size)
                .ok_or_else(|| MantarayError::malformed("entry past end of buffer"))?;
            offset += ref_size;
            Some(Reference::try_from(bytes)?)
        } else {
            None
        };
        let mut forks = BTreeMap::new();
        if is_edge {
            let index_bytes = data
                .get(offset..offset + SEGMENT_SIZE)
                .ok_or_else(|| MantarayError::malformed("fork index past end of buffer"))?;
            let mut index = [0u8; SEGMENT_SIZE];
            index.copy_from_slice(index_bytes);
            let index = IndexBytes::from_bytes(index);
            offset += SEGMENT_SIZE;
            if index.is_empty() {
                return Err(MantarayError::malformed("edge flag with empty fork index"));
            }
            let record_size = PREFIX_CEILING + 1 + ref_size + segments as usize * SEGMENT_SIZE;
            for key in index.iter() {
                let record = data.get(offset..offset + record_size).ok_or_else(|| {
                    MantarayError::malformed(format!("fork record 0x{key:02x} past end of buffer"))
                })?;
                offset += record_size;
                forks.insert(key, Fork::deserialize(record, key, ref_size, segments)?);
            }
        }
        let metadata = util::parse_metadata(&data[offset..])?;
        Ok(Self {
            obfuscation_key,
            entry,
            metadata,
            fork_metadata: None,
            fork_metadata_segment_size: segments,
            forks,
            content_address: None,
            continuous: false,
        })
    }

    /// Persist dirty subtrees depth-first and return this node's reference
    ///
    /// Children of one node are submitted concurrently and awaited as a group
    /// before the parent serializes. A clean subtree is returned from cache
    /// without touching storage.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, storage))
    )]
    pub async fn save<S: Storage + Sync>(&mut self, storage: &S) -> Result<Reference> {
        let (reference, _) = self.save_recursive(storage).await?;
        Ok(reference)
    }

    fn save_recursive<'a, S: Storage + Sync>(
        &'a mut self,
        storage: &'a S,
    ) -> Pin<Box<dyn Future<Output = Result<(Reference, bool)>> + Send + 'a>> {
        Box::pin(async move {
            let results = try_join_all(
                self.forks
                    .values_mut()
                    .map(|fork| fork.node.save_recursive(storage)),
            )
            .await?;
            let children_changed = results.iter().any(|(_, changed)| *changed);
            if let Some(address) = &self.content_address {
                if !children_changed {
                    return Ok((address.clone(), false));
                }
            }
            if self.entry.is_none() && self.forks.is_empty() {
                return Err(MantarayError::DirtyWithoutPayload);
            }
            let data = self.serialize()?;
            let reference = storage.save(&data).await?;
            self.content_address = Some(reference.clone());
            Ok((reference, true))
        })
    }

    /// Fetch and unmarshal `reference`, replacing this node's state
    ///
    /// Shallow: children stay reference-only shells until loaded themselves.
    /// State owned by the parent's edge record (the continuous marker and
    /// fork metadata) is not in the chunk and survives the replacement.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, storage), fields(reference = ?reference))
    )]
    pub async fn load<S: Storage + Sync>(
        &mut self,
        storage: &S,
        reference: &Reference,
    ) -> Result<()> {
        let data = storage.load(reference).await?;
        let mut node = Self::deserialize(&data)?;
        node.content_address = Some(reference.clone());
        node.continuous = self.continuous;
        node.fork_metadata = self.fork_metadata.take();
        *self = node;
        Ok(())
    }

    /// Depth-first load of every descendant
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, storage))
    )]
    pub async fn load_all<S: Storage + Sync>(&mut self, storage: &S) -> Result<()> {
        self.load_all_recursive(storage).await
    }

    fn load_all_recursive<'a, S: Storage + Sync>(
        &'a mut self,
        storage: &'a S,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            try_join_all(self.forks.values_mut().map(|fork| async move {
                if let Some(address) = fork.node.content_address.clone() {
                    fork.node.load(storage, &address).await?;
                    fork.node.load_all_recursive(storage).await?;
                }
                Ok::<(), MantarayError>(())
            }))
            .await?;
            Ok(())
        })
    }

    fn features(&self) -> u8 {
        let mut features = self.fork_metadata_segment_size << FEATURE_SEGMENTS_SHIFT;
        if self.has_entry() {
            features |= FEATURE_HAS_ENTRY;
        }
        if self.enc_entry() {
            features |= FEATURE_ENC_ENTRY;
        }
        if self.is_edge() {
            features |= FEATURE_IS_EDGE;
        }
        features
    }

    fn apply_attributes(&mut self, attributes: ForkAttributes) {
        let ForkAttributes {
            entry,
            node_metadata,
            fork_metadata,
        } = attributes;
        if let Some(entry) = entry {
            self.entry = Some(entry);
        }
        if let Some(metadata) = node_metadata {
            self.metadata = Some(metadata);
        }
        if let Some(metadata) = fork_metadata {
            self.fork_metadata = Some(metadata);
        }
        // a chain link that now carries a value is no longer synthetic, and
        // its edge record must advertise the real prefix length again
        if self.continuous && (self.entry.is_some() || self.metadata.is_some()) {
            self.continuous = false;
        }
        self.make_dirty();
    }

    fn child_key(&self, keys: &mut Option<&mut dyn KeyGenerator>) -> Result<ObfuscationKey> {
        if self.obfuscation_key.is_zero() {
            return Ok(ObfuscationKey::ZERO);
        }
        match keys {
            Some(generator) => Ok(generator.generate_key()),
            None => Err(MantarayError::MissingKeyGenerator),
        }
    }

    /// Grow the fork-metadata slot when unset; reject metadata that cannot fit
    fn ensure_fork_slot(&mut self, metadata: Option<&Metadata>) -> Result<()> {
        let Some(metadata) = metadata else {
            return Ok(());
        };
        let size = util::encode_metadata(metadata)?.len();
        let needed = util::segments_for(size);
        if self.fork_metadata_segment_size == 0 {
            if needed > MAX_SLOT_SEGMENTS {
                return Err(MantarayError::MetadataOverflow {
                    size,
                    capacity: MAX_SLOT_SEGMENTS * SEGMENT_SIZE,
                });
            }
            self.fork_metadata_segment_size = needed as u8;
        } else {
            let capacity = self.fork_metadata_segment_size as usize * SEGMENT_SIZE;
            if size > capacity {
                return Err(MantarayError::MetadataOverflow { size, capacity });
            }
        }
        Ok(())
    }

    /// Re-home an existing edge below a new intermediate node after a split
    ///
    /// `consumed` bytes of the edge prefix moved onto the intermediate's own
    /// edge. A continuous chain is flattened back to its logical prefix and
    /// re-chunked, so the concatenation of prefixes along the chain is
    /// preserved byte for byte.
    fn adopt_split_fork(
        &mut self,
        fork: Fork,
        consumed: usize,
        keys: &mut Option<&mut dyn KeyGenerator>,
    ) -> Result<()> {
        let (logical, terminal) = flatten_chain(fork);
        self.install_edge(logical[consumed..].to_vec(), terminal, keys)
    }

    /// Install an edge carrying `prefix` down to `terminal`, chaining
    /// continuous nodes while the prefix exceeds the ceiling
    fn install_edge(
        &mut self,
        prefix: Vec<u8>,
        terminal: Node,
        keys: &mut Option<&mut dyn KeyGenerator>,
    ) -> Result<()> {
        if prefix.len() <= PREFIX_CEILING {
            self.ensure_fork_slot(terminal.fork_metadata.as_ref())?;
            self.forks.insert(
                prefix[0],
                Fork {
                    prefix,
                    node: terminal,
                },
            );
            return Ok(());
        }
        let mut link = Node::new(self.child_key(keys)?);
        link.continuous = true;
        let head = prefix[..PREFIX_CEILING].to_vec();
        link.install_edge(prefix[PREFIX_CEILING..].to_vec(), terminal, keys)?;
        self.forks.insert(
            head[0],
            Fork {
                prefix: head,
                node: link,
            },
        );
        Ok(())
    }
}

/// Whether every continuous link under this edge is materialized in memory
///
/// A continuous shell that was never loaded keeps its overflow bytes in an
/// unfetched chunk, so a split through it cannot re-home them.
fn chain_is_loaded(fork: &Fork) -> bool {
    let mut node = &fork.node;
    while node.continuous {
        match node.forks.values().next() {
            Some(next) if node.forks.len() == 1 => node = &next.node,
            _ => return false,
        }
    }
    true
}

/// Collapse a continuous chain into its full logical prefix and the first
/// non-synthetic descendant
fn flatten_chain(fork: Fork) -> (Vec<u8>, Node) {
    let Fork { mut prefix, mut node } = fork;
    while node.continuous && node.forks.len() == 1 {
        let Some((_, next)) = node.forks.pop_first() else {
            break;
        };
        prefix.extend_from_slice(&next.prefix);
        node = next.node;
    }
    (prefix, node)
}

/// Structural equality with path-localized diagnostics
///
/// Compares flags, slot sizes, metadata at both levels, entries, and every
/// fork recursively. The first difference fails with the accumulated path
/// prefix where it was found.
pub fn equal_nodes(a: &Node, b: &Node) -> Result<()> {
    equal_nodes_at(a, b, &mut Vec::new())
}

fn equal_nodes_at(a: &Node, b: &Node, path: &mut Vec<u8>) -> Result<()> {
    if a.has_entry() != b.has_entry() || a.entry != b.entry {
        return Err(MantarayError::mismatch(path, "entry"));
    }
    if a.is_edge() != b.is_edge() {
        return Err(MantarayError::mismatch(path, "edge flag"));
    }
    if a.continuous != b.continuous {
        return Err(MantarayError::mismatch(path, "continuous flag"));
    }
    if a.fork_metadata_segment_size != b.fork_metadata_segment_size {
        return Err(MantarayError::mismatch(path, "fork metadata segment size"));
    }
    if a.metadata != b.metadata {
        return Err(MantarayError::mismatch(path, "node metadata"));
    }
    if a.fork_metadata != b.fork_metadata {
        return Err(MantarayError::mismatch(path, "fork metadata"));
    }
    if !a.forks.keys().eq(b.forks.keys()) {
        return Err(MantarayError::mismatch(path, "fork keys"));
    }
    for (key, fork) in &a.forks {
        let other = &b.forks[key];
        if fork.prefix != other.prefix {
            return Err(MantarayError::mismatch(path, "fork prefix"));
        }
        path.extend_from_slice(&fork.prefix);
        equal_nodes_at(&fork.node, &other.node, path)?;
        path.truncate(path.len() - fork.prefix.len());
    }
    Ok(())
}
