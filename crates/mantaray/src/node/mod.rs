//! Manifest trie nodes: the two wire-format variants and the factory

pub mod v0_2;
pub mod v1_0;

use crate::error::{MantarayError, Result};
use crate::reference::{Metadata, ObfuscationKey, Reference, Version};
use crate::storage::Storage;

/// Source of obfuscation keys for nodes allocated during fork insertion
///
/// Random byte generation stays outside this library; callers that keep
/// their manifests obfuscated supply one of these. Any
/// `FnMut() -> ObfuscationKey` closure works.
pub trait KeyGenerator {
    /// Produce a fresh 32-byte obfuscation key
    fn generate_key(&mut self) -> ObfuscationKey;
}

impl<F: FnMut() -> ObfuscationKey> KeyGenerator for F {
    fn generate_key(&mut self) -> ObfuscationKey {
        self()
    }
}

/// Attributes applied at the end of an `add_fork` path
#[derive(Debug, Clone, Default)]
pub struct ForkAttributes {
    /// Entry reference for the target node
    pub entry: Option<Reference>,
    /// Metadata serialized on the target node's own chunk (v1.0) or in its
    /// parent's fork record (v0.2)
    pub node_metadata: Option<Metadata>,
    /// Metadata serialized in the parent edge record's fixed slot (v1.0 only)
    pub fork_metadata: Option<Metadata>,
}

impl ForkAttributes {
    /// Attributes carrying only an entry reference
    pub fn with_entry(entry: Reference) -> Self {
        Self {
            entry: Some(entry),
            ..Default::default()
        }
    }
}

/// Options for [`init_manifest_node`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeOptions {
    /// Obfuscation key for the root node; defaults to all-zero (disabled)
    pub obfuscation_key: Option<ObfuscationKey>,
    /// Wire format version; defaults to v1.0
    pub version: Option<Version>,
}

/// Construct a fresh manifest root
pub fn init_manifest_node(options: NodeOptions) -> ManifestNode {
    let key = options.obfuscation_key.unwrap_or(ObfuscationKey::ZERO);
    match options.version.unwrap_or(Version::V1_0) {
        Version::V0_2 => ManifestNode::V0_2(v0_2::Node::new(key)),
        Version::V1_0 => ManifestNode::V1_0(v1_0::Node::new(key)),
    }
}

/// Cross-version manifest node
///
/// The tagged union carries the operations shared by both formats; the
/// version-specific surface (fork maps, flags, slot sizing) is reached
/// through [`as_v0_2`](Self::as_v0_2) / [`as_v1_0`](Self::as_v1_0).
#[derive(Debug, Clone)]
pub enum ManifestNode {
    /// Legacy v0.2 node
    V0_2(v0_2::Node),
    /// Current v1.0 node
    V1_0(v1_0::Node),
}

impl ManifestNode {
    /// Wire format version of this node
    pub fn version(&self) -> Version {
        match self {
            ManifestNode::V0_2(_) => Version::V0_2,
            ManifestNode::V1_0(_) => Version::V1_0,
        }
    }

    /// Whether the node must be rewritten on the next save
    pub fn is_dirty(&self) -> bool {
        match self {
            ManifestNode::V0_2(node) => node.is_dirty(),
            ManifestNode::V1_0(node) => node.is_dirty(),
        }
    }

    /// Drop the cached content address, forcing a rewrite on the next save
    pub fn make_dirty(&mut self) {
        match self {
            ManifestNode::V0_2(node) => node.make_dirty(),
            ManifestNode::V1_0(node) => node.make_dirty(),
        }
    }

    /// Reference this node was last saved under, if clean
    pub fn content_address(&self) -> Option<&Reference> {
        match self {
            ManifestNode::V0_2(node) => node.content_address(),
            ManifestNode::V1_0(node) => node.content_address(),
        }
    }

    /// Bind `path` to the given attributes
    ///
    /// v0.2 nodes take the node metadata as their single metadata level and
    /// reject fork metadata; they never consult `keys` (children inherit the
    /// parent's obfuscation key).
    pub fn add_fork(
        &mut self,
        path: &[u8],
        attributes: ForkAttributes,
        keys: Option<&mut dyn KeyGenerator>,
    ) -> Result<()> {
        match self {
            ManifestNode::V0_2(node) => {
                if attributes.fork_metadata.is_some() {
                    return Err(MantarayError::InvalidMetadata {
                        reason: "fork metadata requires a v1.0 node".into(),
                    });
                }
                node.add_fork(path, attributes.entry, attributes.node_metadata)
            }
            ManifestNode::V1_0(node) => node.add_fork(path, attributes, keys),
        }
    }

    /// Remove the fork terminating `path`, with its whole subtree
    pub fn remove_path(&mut self, path: &[u8]) -> Result<()> {
        match self {
            ManifestNode::V0_2(node) => node.remove_path(path),
            ManifestNode::V1_0(node) => node.remove_path(path),
        }
    }

    /// Marshal this node to its wire representation
    pub fn serialize(&self) -> Result<Vec<u8>> {
        match self {
            ManifestNode::V0_2(node) => node.serialize(),
            ManifestNode::V1_0(node) => node.serialize(),
        }
    }

    /// Detect the version tag and materialize the matching variant
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < 63 {
            return Err(MantarayError::malformed(format!(
                "node is {} bytes, version tag needs 63",
                data.len()
            )));
        }
        // the tag sits at offset 32, obfuscated with the key at offset 0
        let mut tag = [0u8; 31];
        for (i, byte) in tag.iter_mut().enumerate() {
            *byte = data[32 + i] ^ data[i];
        }
        if tag == Version::V1_0.tag() {
            Ok(ManifestNode::V1_0(v1_0::Node::deserialize(data)?))
        } else if tag == Version::V0_2.tag() {
            Ok(ManifestNode::V0_2(v0_2::Node::deserialize(data)?))
        } else {
            Err(MantarayError::malformed("unknown version tag"))
        }
    }

    /// Persist dirty subtrees and return the root reference
    pub async fn save<S: Storage + Sync>(&mut self, storage: &S) -> Result<Reference> {
        match self {
            ManifestNode::V0_2(node) => node.save(storage).await,
            ManifestNode::V1_0(node) => node.save(storage).await,
        }
    }

    /// Fetch and unmarshal `reference`, replacing this node's state
    pub async fn load<S: Storage + Sync>(
        &mut self,
        storage: &S,
        reference: &Reference,
    ) -> Result<()> {
        match self {
            ManifestNode::V0_2(node) => node.load(storage, reference).await,
            ManifestNode::V1_0(node) => node.load(storage, reference).await,
        }
    }

    /// Depth-first load of every descendant
    pub async fn load_all<S: Storage + Sync>(&mut self, storage: &S) -> Result<()> {
        match self {
            ManifestNode::V0_2(node) => node.load_all(storage).await,
            ManifestNode::V1_0(node) => node.load_all(storage).await,
        }
    }

    /// Structural equality across the shared surface
    ///
    /// Nodes of different versions never compare equal.
    pub fn equal(a: &ManifestNode, b: &ManifestNode) -> Result<()> {
        match (a, b) {
            (ManifestNode::V0_2(a), ManifestNode::V0_2(b)) => v0_2::equal_nodes(a, b),
            (ManifestNode::V1_0(a), ManifestNode::V1_0(b)) => v1_0::equal_nodes(a, b),
            _ => Err(MantarayError::mismatch(&[], "version")),
        }
    }

    /// The v0.2 node, if this is one
    pub fn as_v0_2(&self) -> Option<&v0_2::Node> {
        match self {
            ManifestNode::V0_2(node) => Some(node),
            ManifestNode::V1_0(_) => None,
        }
    }

    /// The v0.2 node mutably, if this is one
    pub fn as_v0_2_mut(&mut self) -> Option<&mut v0_2::Node> {
        match self {
            ManifestNode::V0_2(node) => Some(node),
            ManifestNode::V1_0(_) => None,
        }
    }

    /// The v1.0 node, if this is one
    pub fn as_v1_0(&self) -> Option<&v1_0::Node> {
        match self {
            ManifestNode::V0_2(_) => None,
            ManifestNode::V1_0(node) => Some(node),
        }
    }

    /// The v1.0 node mutably, if this is one
    pub fn as_v1_0_mut(&mut self) -> Option<&mut v1_0::Node> {
        match self {
            ManifestNode::V0_2(_) => None,
            ManifestNode::V1_0(node) => Some(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(byte: u8) -> Reference {
        Reference::try_from(vec![byte; 32]).unwrap()
    }

    #[test]
    fn factory_defaults_to_v1_with_zero_key() {
        let node = init_manifest_node(NodeOptions::default());
        assert_eq!(node.version(), Version::V1_0);
        assert!(node.as_v1_0().unwrap().obfuscation_key().is_zero());
    }

    #[test]
    fn factory_honors_version_and_key() {
        let node = init_manifest_node(NodeOptions {
            obfuscation_key: Some(ObfuscationKey::from([3u8; 32])),
            version: Some(Version::V0_2),
        });
        assert_eq!(node.version(), Version::V0_2);
        assert!(!node.as_v0_2().unwrap().obfuscation_key().is_zero());
    }

    #[test]
    fn deserialize_detects_the_version() {
        for version in [Version::V0_2, Version::V1_0] {
            let mut node = init_manifest_node(NodeOptions {
                obfuscation_key: Some(ObfuscationKey::from([9u8; 32])),
                version: Some(version),
            });
            node.add_fork(b"", ForkAttributes::with_entry(reference(1)), None)
                .unwrap();
            let parsed = ManifestNode::deserialize(&node.serialize().unwrap()).unwrap();
            assert_eq!(parsed.version(), version);
        }
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let data = vec![0u8; 200];
        assert!(matches!(
            ManifestNode::deserialize(&data),
            Err(MantarayError::MalformedFormat { .. })
        ));
    }

    #[test]
    fn fork_metadata_is_rejected_on_v0_2() {
        let mut node = init_manifest_node(NodeOptions {
            obfuscation_key: None,
            version: Some(Version::V0_2),
        });
        let mut metadata = Metadata::new();
        metadata.insert("k".into(), serde_json::json!("v"));
        let result = node.add_fork(
            b"path",
            ForkAttributes {
                entry: Some(reference(1)),
                node_metadata: None,
                fork_metadata: Some(metadata),
            },
            None,
        );
        assert!(matches!(result, Err(MantarayError::InvalidMetadata { .. })));
    }
}
