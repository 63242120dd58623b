//! Typed references, obfuscation keys, format versions, and metadata mappings

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::error::{MantarayError, Result};
use crate::util;

/// Byte length of a plain (unencrypted) reference
pub const REFERENCE_SIZE: usize = 32;

/// Byte length of an encrypted reference
pub const ENCRYPTED_REFERENCE_SIZE: usize = 64;

/// String-keyed JSON metadata mapping
///
/// Kept as parsed values in memory; equality compares the mappings, not the
/// encoded bytes. `BTreeMap` keeps the JSON encoding deterministic.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Opaque 32- or 64-byte identifier produced by the storage layer
///
/// The trie never interprets the bytes; it only distinguishes plain from
/// encrypted references by length.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference(Bytes);

impl Reference {
    /// Wrap raw bytes, validating the length
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        match bytes.len() {
            REFERENCE_SIZE | ENCRYPTED_REFERENCE_SIZE => Ok(Self(bytes)),
            len => Err(MantarayError::InvalidReference { len }),
        }
    }

    /// Whether this is a 64-byte encrypted reference
    pub fn is_encrypted(&self) -> bool {
        self.0.len() == ENCRYPTED_REFERENCE_SIZE
    }

    /// The underlying bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Reference {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Reference {
    type Error = MantarayError;

    fn try_from(value: &[u8]) -> Result<Self> {
        Self::new(Bytes::copy_from_slice(value))
    }
}

impl TryFrom<Vec<u8>> for Reference {
    type Error = MantarayError;

    fn try_from(value: Vec<u8>) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// 32-byte keystream XORed with the node payload from offset 32 onward
///
/// The all-zero key disables obfuscation entirely.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ObfuscationKey([u8; 32]);

impl ObfuscationKey {
    /// The all-zero key
    pub const ZERO: Self = Self([0u8; 32]);

    /// Whether obfuscation is disabled
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for ObfuscationKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ObfuscationKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ObfuscationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObfuscationKey(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Wire format version of a serialized node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// Legacy format: 30-byte prefix ceiling, nodeType bitfield, fork-record
    /// metadata framed by a big-endian u16 length
    V0_2,
    /// Current format: 31-byte prefix ceiling, explicit feature flags,
    /// continuous-node overflow, fixed fork-metadata slots
    V1_0,
}

impl Version {
    /// First 31 bytes of keccak-256 of `"mantaray:<version>"`
    ///
    /// The truncation to 31 bytes (not 32) is part of the wire format.
    pub fn tag(&self) -> [u8; 31] {
        let hash = util::keccak256(self.tag_input().as_bytes());
        let mut tag = [0u8; 31];
        tag.copy_from_slice(&hash[..31]);
        tag
    }

    /// Maximum prefix bytes one edge record can carry
    pub const fn prefix_ceiling(&self) -> usize {
        match self {
            Version::V0_2 => 30,
            Version::V1_0 => 31,
        }
    }

    fn tag_input(&self) -> &'static str {
        match self {
            Version::V0_2 => "mantaray:0.2",
            Version::V1_0 => "mantaray:1.0",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::V0_2 => write!(f, "0.2"),
            Version::V1_0 => write!(f, "1.0"),
        }
    }
}
