//! Version 0.2 (legacy) manifest nodes
//!
//! Wire layout of a serialized node:
//!
//! | offset | size       | field                                  |
//! |--------|------------|----------------------------------------|
//! | 0      | 32         | obfuscation key                        |
//! | 32     | 31         | version tag (`keccak("mantaray:0.2")`) |
//! | 63     | 1          | reference size (32 or 64)              |
//! | 64     | 32 or 64   | entry, zero-filled when absent         |
//! | +0     | 32         | fork index bitmap (always present)     |
//! | +32    | N × record | fork records, ascending first byte     |
//!
//! A fork record is `nodeType (1) | prefixLength (1) | prefix (30) |
//! reference`, followed by a big-endian u16 length and metadata JSON iff the
//! child's nodeType carries the metadata bit. The record's reference is the
//! child's *entry* (zero sentinel when absent) — sub-manifest children carry
//! their saved address there by the 0.2 builder convention. Everything from
//! offset 32 onward is XORed with the obfuscation key.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use futures::future::try_join_all;

use crate::error::{MantarayError, Result};
use crate::reference::{
    ENCRYPTED_REFERENCE_SIZE, Metadata, ObfuscationKey, Reference, REFERENCE_SIZE, Version,
};
use crate::storage::Storage;
use crate::util::{self, IndexBytes, SEGMENT_SIZE};

/// Maximum prefix bytes a v0.2 edge record carries
pub const PREFIX_CEILING: usize = 30;

/// Node carries an entry
pub const TYPE_VALUE: u8 = 2;
/// Node has children
pub const TYPE_EDGE: u8 = 4;
/// The edge segment leading here contains the path separator
pub const TYPE_WITH_PATH_SEPARATOR: u8 = 8;
/// The fork record carries metadata
pub const TYPE_WITH_METADATA: u8 = 16;

/// Obfuscation key, version tag, and reference-size byte
const HEADER_SIZE: usize = 64;

/// nodeType, prefixLength, and the padded prefix
const FORK_HEADER_SIZE: usize = 32;

const PATH_SEPARATOR: u8 = b'/';

/// An edge record: branch prefix plus the child it leads to
#[derive(Debug, Clone)]
pub struct Fork {
    /// Branch prefix, 1..=30 bytes, keyed in the parent by its first byte
    pub prefix: Vec<u8>,
    /// Child node
    pub node: Node,
}

impl Fork {
    fn serialize_into(&self, out: &mut Vec<u8>, ref_size: usize) -> Result<()> {
        out.push(self.node.node_type);
        out.push(self.prefix.len() as u8);
        let mut prefix = [0u8; PREFIX_CEILING];
        prefix[..self.prefix.len()].copy_from_slice(&self.prefix);
        out.extend_from_slice(&prefix);
        match &self.node.entry {
            Some(entry) => {
                if entry.as_bytes().len() != ref_size {
                    return Err(MantarayError::malformed(format!(
                        "fork 0x{:02x} entry is {} bytes, node records {}",
                        self.prefix[0],
                        entry.as_bytes().len(),
                        ref_size
                    )));
                }
                out.extend_from_slice(entry.as_bytes());
            }
            None => out.extend_from_slice(&vec![0u8; ref_size]),
        }
        if self.node.is_with_metadata_type() {
            let metadata = self
                .node
                .metadata
                .as_ref()
                .ok_or_else(|| MantarayError::malformed("metadata flag set without metadata"))?;
            let json = util::encode_metadata(metadata)?;
            let size = u16::try_from(json.len()).map_err(|_| MantarayError::MetadataOverflow {
                size: json.len(),
                capacity: u16::MAX as usize,
            })?;
            out.extend_from_slice(&size.to_be_bytes());
            out.extend_from_slice(&json);
        }
        Ok(())
    }

    /// Parse one fork record, returning it with the number of bytes consumed
    fn deserialize(
        data: &[u8],
        key: u8,
        ref_size: usize,
        obfuscation_key: ObfuscationKey,
    ) -> Result<(Self, usize)> {
        if data.len() < FORK_HEADER_SIZE + ref_size {
            return Err(MantarayError::malformed(format!(
                "fork record 0x{key:02x} past end of buffer"
            )));
        }
        let node_type = data[0];
        let prefix_len = data[1] as usize;
        if prefix_len == 0 || prefix_len > PREFIX_CEILING {
            return Err(MantarayError::malformed(format!(
                "fork 0x{key:02x} prefix length {prefix_len} outside 1..={PREFIX_CEILING}"
            )));
        }
        let prefix = data[2..2 + prefix_len].to_vec();
        if prefix[0] != key {
            return Err(MantarayError::malformed(format!(
                "fork prefix starts with 0x{:02x}, indexed under 0x{key:02x}",
                prefix[0]
            )));
        }
        let mut node = Node::new(obfuscation_key);
        node.node_type = node_type;
        let reference = &data[FORK_HEADER_SIZE..FORK_HEADER_SIZE + ref_size];
        if reference.iter().any(|b| *b != 0) {
            let reference = Reference::try_from(reference)?;
            // a sub-manifest's entry doubles as its address in this format
            node.content_address = Some(reference.clone());
            node.entry = Some(reference);
        }
        let mut consumed = FORK_HEADER_SIZE + ref_size;
        if node_type & TYPE_WITH_METADATA != 0 {
            let size_bytes = data
                .get(consumed..consumed + 2)
                .ok_or_else(|| MantarayError::malformed("metadata length past end of buffer"))?;
            let size = u16::from_be_bytes([size_bytes[0], size_bytes[1]]) as usize;
            let json = data
                .get(consumed + 2..consumed + 2 + size)
                .ok_or_else(|| MantarayError::malformed("metadata past end of buffer"))?;
            node.metadata = util::parse_metadata(json)?;
            consumed += 2 + size;
        }
        Ok((Fork { prefix, node }, consumed))
    }
}

/// v0.2 manifest trie node
///
/// The `nodeType` bitfield tracks value/edge/path-separator/metadata flags.
/// The cached content address doubles as the clean flag. Children inherit
/// the parent's obfuscation key.
#[derive(Debug, Clone)]
pub struct Node {
    obfuscation_key: ObfuscationKey,
    node_type: u8,
    entry: Option<Reference>,
    metadata: Option<Metadata>,
    forks: BTreeMap<u8, Fork>,
    content_address: Option<Reference>,
}

impl Node {
    /// Fresh dirty node with the given obfuscation key
    pub fn new(obfuscation_key: ObfuscationKey) -> Self {
        Self {
            obfuscation_key,
            node_type: 0,
            entry: None,
            metadata: None,
            forks: BTreeMap::new(),
            content_address: None,
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

    /// The raw nodeType bitfield
    pub fn node_type(&self) -> u8 {
        self.node_type
    }

    /// Whether the value bit is set
    pub fn is_value_type(&self) -> bool {
        self.node_type & TYPE_VALUE != 0
    }

    /// Whether the edge bit is set
    pub fn is_edge_type(&self) -> bool {
        self.node_type & TYPE_EDGE != 0
    }

    /// Whether the path-separator bit is set
    pub fn is_with_path_separator_type(&self) -> bool {
        self.node_type & TYPE_WITH_PATH_SEPARATOR != 0
    }

    /// Whether the metadata bit is set
    pub fn is_with_metadata_type(&self) -> bool {
        self.node_type & TYPE_WITH_METADATA != 0
    }

    /// The entry reference, if any
    pub fn entry(&self) -> Option<&Reference> {
        self.entry.as_ref()
    }

    /// Replace the entry reference, maintaining the value bit
    pub fn set_entry(&mut self, entry: Option<Reference>) {
        self.entry = entry;
        if self.entry.is_some() {
            self.node_type |= TYPE_VALUE;
        } else {
            self.node_type &= !TYPE_VALUE;
        }
        self.make_dirty();
    }

    /// Node metadata, serialized in the parent's fork record
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Replace the metadata, maintaining the metadata bit
    pub fn set_metadata(&mut self, metadata: Option<Metadata>) {
        self.metadata = metadata;
        if self.metadata.is_some() {
            self.node_type |= TYPE_WITH_METADATA;
        } else {
            self.node_type &= !TYPE_WITH_METADATA;
        }
        self.make_dirty();
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

    /// Bind `path` to an entry and optional metadata, splitting edges as
    /// needed
    ///
    /// An empty path applies the attributes to this node itself. Paths longer
    /// than the 30-byte ceiling are carried across plain intermediate nodes.
    /// Newly allocated nodes inherit this node's obfuscation key.
    pub fn add_fork(
        &mut self,
        path: &[u8],
        entry: Option<Reference>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        if path.is_empty() {
            if entry.is_some() {
                self.set_entry(entry);
            }
            if metadata.is_some() {
                self.set_metadata(metadata);
            }
            self.make_dirty();
            return Ok(());
        }
        let first = path[0];
        match self.forks.remove(&first) {
            None => {
                let mut child = Node::new(self.obfuscation_key);
                if path.len() > PREFIX_CEILING {
                    let (head, tail) = path.split_at(PREFIX_CEILING);
                    child.add_fork(tail, entry, metadata)?;
                    child.update_path_separator(head);
                    self.forks.insert(
                        first,
                        Fork {
                            prefix: head.to_vec(),
                            node: child,
                        },
                    );
                } else {
                    if entry.is_some() {
                        child.set_entry(entry);
                    }
                    if metadata.is_some() {
                        child.set_metadata(metadata);
                    }
                    child.update_path_separator(path);
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
                if common == fork.prefix.len() {
                    let result = fork.node.add_fork(&path[common..], entry, metadata);
                    self.forks.insert(first, fork);
                    result?;
                } else {
                    // the match ends inside this edge: split it
                    let head = fork.prefix[..common].to_vec();
                    let rest = fork.prefix[common..].to_vec();
                    let mut mid = Node::new(self.obfuscation_key);
                    fork.node.update_path_separator(&rest);
                    mid.forks.insert(
                        rest[0],
                        Fork {
                            prefix: rest,
                            node: fork.node,
                        },
                    );
                    mid.node_type |= TYPE_EDGE;
                    mid.update_path_separator(&head);
                    mid.add_fork(&path[common..], entry, metadata)?;
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
        self.node_type |= TYPE_EDGE;
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
    /// trie accepts temporarily non-minimal shapes.
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
        }
        if self.forks.is_empty() {
            self.node_type &= !TYPE_EDGE;
        }
        self.make_dirty();
        Ok(())
    }

    /// Marshal this node to its wire representation
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let ref_size = self
            .entry
            .as_ref()
            .map_or(REFERENCE_SIZE, |entry| entry.as_bytes().len());
        let mut data = Vec::with_capacity(HEADER_SIZE + ref_size + SEGMENT_SIZE);
        data.extend_from_slice(self.obfuscation_key.as_bytes());
        data.extend_from_slice(&Version::V0_2.tag());
        data.push(ref_size as u8);
        match &self.entry {
            Some(entry) => data.extend_from_slice(entry.as_bytes()),
            None => data.extend_from_slice(&[0u8; REFERENCE_SIZE]),
        }
        let mut index = IndexBytes::default();
        for key in self.forks.keys() {
            index.set(*key);
        }
        data.extend_from_slice(index.as_bytes());
        for fork in self.forks.values() {
            fork.serialize_into(&mut data, ref_size)?;
        }
        util::xor_in_place(&self.obfuscation_key, &mut data[32..]);
        Ok(data)
    }

    /// Unmarshal a v0.2 node
    ///
    /// The root's own nodeType is not persisted: the edge bit is inferred
    /// from a non-zero fork index, the value bit from a non-zero entry.
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
        if data[32..63] != Version::V0_2.tag() {
            return Err(MantarayError::malformed("version tag mismatch"));
        }
        let ref_size = data[63] as usize;
        if ref_size != REFERENCE_SIZE && ref_size != ENCRYPTED_REFERENCE_SIZE {
            return Err(MantarayError::malformed(format!(
                "reference size {ref_size} is neither 32 nor 64"
            )));
        }
        let entry_bytes = data
            .get(HEADER_SIZE..HEADER_SIZE + ref_size)
            .ok_or_else(|| MantarayError::malformed("entry past end of buffer"))?;
        let entry = if entry_bytes.iter().any(|b| *b != 0) {
            Some(Reference::try_from(entry_bytes)?)
        } else {
            None
        };
        let mut offset = HEADER_SIZE + ref_size;
        let index_bytes = data
            .get(offset..offset + SEGMENT_SIZE)
            .ok_or_else(|| MantarayError::malformed("fork index past end of buffer"))?;
        let mut index = [0u8; SEGMENT_SIZE];
        index.copy_from_slice(index_bytes);
        let index = IndexBytes::from_bytes(index);
        offset += SEGMENT_SIZE;
        let mut forks = BTreeMap::new();
        for key in index.iter() {
            let (fork, consumed) =
                Fork::deserialize(&data[offset..], key, ref_size, obfuscation_key)?;
            offset += consumed;
            forks.insert(key, fork);
        }
        let mut node_type = 0;
        if !index.is_empty() {
            node_type |= TYPE_EDGE;
        }
        if entry.is_some() {
            node_type |= TYPE_VALUE;
        }
        Ok(Self {
            obfuscation_key,
            node_type,
            entry,
            metadata: None,
            forks,
            content_address: None,
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
    /// Entry and metadata that only existed in the parent's fork record
    /// survive the replacement when the chunk itself carries none.
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
        if node.entry.is_none() {
            node.entry = self.entry.take();
            if node.entry.is_some() {
                node.node_type |= TYPE_VALUE;
            }
        }
        if node.metadata.is_none() {
            node.metadata = self.metadata.take();
            if node.metadata.is_some() {
                node.node_type |= TYPE_WITH_METADATA;
            }
        }
        node.node_type |= self.node_type & TYPE_WITH_PATH_SEPARATOR;
        *self = node;
        Ok(())
    }

    /// Depth-first load of every descendant sub-manifest
    ///
    /// Only children whose recorded node type carries the edge bit are
    /// fetched: their embedded reference is a manifest address by the 0.2
    /// builder convention, while value-only children reference content.
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
                if fork.node.is_edge_type() {
                    if let Some(address) = fork.node.entry.clone() {
                        fork.node.load(storage, &address).await?;
                        fork.node.load_all_recursive(storage).await?;
                    }
                }
                Ok::<(), MantarayError>(())
            }))
            .await?;
            Ok(())
        })
    }

    /// Advisory flag: set iff the stored segment contains a `/`
    fn update_path_separator(&mut self, segment: &[u8]) {
        if segment.contains(&PATH_SEPARATOR) {
            self.node_type |= TYPE_WITH_PATH_SEPARATOR;
        } else {
            self.node_type &= !TYPE_WITH_PATH_SEPARATOR;
        }
    }
}

/// Structural equality with path-localized diagnostics
///
/// Compares the nodeType byte, metadata, entry, and every fork recursively.
/// The first difference fails with the accumulated path prefix where it was
/// found.
pub fn equal_nodes(a: &Node, b: &Node) -> Result<()> {
    equal_nodes_at(a, b, &mut Vec::new())
}

fn equal_nodes_at(a: &Node, b: &Node, path: &mut Vec<u8>) -> Result<()> {
    if a.node_type != b.node_type {
        return Err(MantarayError::mismatch(path, "node type"));
    }
    if a.metadata != b.metadata {
        return Err(MantarayError::mismatch(path, "metadata"));
    }
    if a.entry != b.entry {
        return Err(MantarayError::mismatch(path, "entry"));
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference(byte: u8) -> Reference {
        Reference::try_from(vec![byte; 32]).unwrap()
    }

    #[test]
    fn serialized_layout_of_leaf_node() {
        let mut node = Node::new(ObfuscationKey::ZERO);
        node.set_entry(Some(reference(0x7d)));
        let data = node.serialize().unwrap();
        assert_eq!(data.len(), 128);
        assert_eq!(&data[..32], &[0u8; 32]);
        assert_eq!(&data[32..63], &Version::V0_2.tag());
        assert_eq!(data[63], 32);
        assert_eq!(&data[64..96], reference(0x7d).as_bytes());
        assert!(data[96..128].iter().all(|b| *b == 0));
    }

    #[test]
    fn fork_record_frames_metadata_with_be_length() {
        let mut node = Node::new(ObfuscationKey::ZERO);
        let mut metadata = Metadata::new();
        metadata.insert("mime".into(), json!("text/plain"));
        node.add_fork(b"doc", Some(reference(1)), Some(metadata.clone()))
            .unwrap();
        let data = node.serialize().unwrap();

        // header + zero entry + bitmap, then the fork record
        let record = &data[128..];
        assert_eq!(record[0] & TYPE_WITH_METADATA, TYPE_WITH_METADATA);
        assert_eq!(record[1], 3);
        assert_eq!(&record[2..5], b"doc");
        assert_eq!(&record[32..64], reference(1).as_bytes());
        let json_len = u16::from_be_bytes([record[64], record[65]]) as usize;
        assert_eq!(&record[66..66 + json_len], &util::encode_metadata(&metadata).unwrap()[..]);

        let parsed = Node::deserialize(&data).unwrap();
        let child = &parsed.forks()[&b'd'].node;
        assert_eq!(child.metadata(), Some(&metadata));
        assert!(child.is_with_metadata_type());
    }

    #[test]
    fn zero_sentinel_reads_back_as_no_entry() {
        let mut node = Node::new(ObfuscationKey::ZERO);
        node.add_fork(b"dir/", None, None).unwrap();
        node.set_entry(Some(reference(5)));
        let data = node.serialize().unwrap();
        let parsed = Node::deserialize(&data).unwrap();
        let child = &parsed.forks()[&b'd'].node;
        assert_eq!(child.entry(), None);
        assert!(child.is_dirty());
    }

    #[test]
    fn root_type_is_inferred_on_load() {
        let mut node = Node::new(ObfuscationKey::ZERO);
        node.add_fork(b"x", Some(reference(1)), None).unwrap();
        let parsed = Node::deserialize(&node.serialize().unwrap()).unwrap();
        assert!(parsed.is_edge_type());
        assert!(!parsed.is_value_type());

        let mut leaf = Node::new(ObfuscationKey::ZERO);
        leaf.set_entry(Some(reference(2)));
        let parsed = Node::deserialize(&leaf.serialize().unwrap()).unwrap();
        assert!(parsed.is_value_type());
        assert!(!parsed.is_edge_type());
    }

    #[test]
    fn invalid_reference_size_is_malformed() {
        let mut node = Node::new(ObfuscationKey::ZERO);
        node.set_entry(Some(reference(1)));
        let mut data = node.serialize().unwrap();
        data[63] = 33;
        assert!(matches!(
            Node::deserialize(&data),
            Err(MantarayError::MalformedFormat { .. })
        ));
    }

    #[test]
    fn separator_flag_follows_stored_segment() {
        let mut node = Node::new(ObfuscationKey::ZERO);
        node.add_fork(b"dir/file", Some(reference(1)), None).unwrap();
        node.add_fork(b"plain", Some(reference(2)), None).unwrap();
        assert!(node.forks()[&b'd'].node.is_with_path_separator_type());
        assert!(!node.forks()[&b'p'].node.is_with_path_separator_type());
    }

    #[test]
    fn long_paths_split_at_the_ceiling() {
        let mut node = Node::new(ObfuscationKey::ZERO);
        let path = vec![b'a'; 31];
        node.add_fork(&path, Some(reference(1)), None).unwrap();
        let fork = &node.forks()[&b'a'];
        assert_eq!(fork.prefix.len(), PREFIX_CEILING);
        let child_fork = &fork.node.forks()[&b'a'];
        assert_eq!(child_fork.prefix.len(), 1);
        assert_eq!(child_fork.node.entry(), Some(&reference(1)));
        assert_eq!(
            node.fork_at_path(&path).unwrap().node.entry(),
            Some(&reference(1))
        );
    }

    #[test]
    fn removing_last_fork_clears_edge_bit() {
        let mut node = Node::new(ObfuscationKey::ZERO);
        node.add_fork(b"only", Some(reference(1)), None).unwrap();
        assert!(node.is_edge_type());
        node.remove_path(b"only").unwrap();
        assert!(!node.is_edge_type());
        assert!(node.forks().is_empty());
    }
}
