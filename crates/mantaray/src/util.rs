//! Byte-level helpers shared by both wire formats

use tiny_keccak::{Hasher, Keccak};

use crate::error::{MantarayError, Result};
use crate::reference::{Metadata, ObfuscationKey};

/// Bytes per storage segment; fork metadata slots are sized in segments
pub const SEGMENT_SIZE: usize = 32;

/// Fixed-slot padding byte (ASCII space, ignored by the JSON parser)
const PAD_BYTE: u8 = 0x20;

/// keccak-256 digest
pub fn keccak256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(input);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// XOR `data` with `key` repeated as a keystream
///
/// The all-zero key leaves the buffer untouched. Applying twice restores the
/// input. Callers pass the payload slice starting at the region to obfuscate;
/// the keystream restarts at the slice head.
pub fn xor_in_place(key: &ObfuscationKey, data: &mut [u8]) {
    if key.is_zero() {
        return;
    }
    let key = key.as_bytes();
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % key.len()];
    }
}

/// Length of the longest shared leading byte run
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// 256-bit bitmap over possible fork keys, one bit per first byte
///
/// Stored as 32 bytes with `bit = byte % 8` inside `data[byte / 8]`.
/// Iteration is in strictly ascending byte order, which fixes the on-wire
/// fork sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexBytes([u8; SEGMENT_SIZE]);

impl IndexBytes {
    /// Wrap a raw 32-byte bitmap
    pub fn from_bytes(bytes: [u8; SEGMENT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Mark `byte` as present
    pub fn set(&mut self, byte: u8) {
        self.0[(byte / 8) as usize] |= 1 << (byte % 8);
    }

    /// Whether `byte` is marked present
    pub fn is_set(&self, byte: u8) -> bool {
        self.0[(byte / 8) as usize] & (1 << (byte % 8)) != 0
    }

    /// Whether no byte is marked
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Present bytes in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u16..=255).map(|b| b as u8).filter(|b| self.is_set(*b))
    }

    /// The raw bitmap bytes
    pub fn as_bytes(&self) -> &[u8; SEGMENT_SIZE] {
        &self.0
    }
}

/// Encode a metadata mapping as JSON (UTF-8)
pub fn encode_metadata(metadata: &Metadata) -> Result<Vec<u8>> {
    serde_json::to_vec(metadata).map_err(|e| MantarayError::InvalidMetadata {
        reason: e.to_string(),
    })
}

/// Pad metadata JSON into a fixed slot of `segments × 32` bytes
///
/// `None` fills the whole slot with 0x20. Fails when the encoding does not
/// fit the slot.
pub fn pad_metadata_in_segments(metadata: Option<&Metadata>, segments: u8) -> Result<Vec<u8>> {
    let capacity = segments as usize * SEGMENT_SIZE;
    let mut slot = match metadata {
        Some(metadata) => encode_metadata(metadata)?,
        None => Vec::with_capacity(capacity),
    };
    if slot.len() > capacity {
        return Err(MantarayError::MetadataOverflow {
            size: slot.len(),
            capacity,
        });
    }
    slot.resize(capacity, PAD_BYTE);
    Ok(slot)
}

/// Parse a metadata region
///
/// Trailing slot padding is trimmed first. A blank region is `None`; a
/// non-blank region that is not a JSON object is *invalid-metadata*.
pub fn parse_metadata(bytes: &[u8]) -> Result<Option<Metadata>> {
    let mut end = bytes.len();
    while end > 0 && bytes[end - 1] == PAD_BYTE {
        end -= 1;
    }
    let trimmed = &bytes[..end];
    if trimmed.is_empty() {
        return Ok(None);
    }
    let metadata = serde_json::from_slice(trimmed).map_err(|e| MantarayError::InvalidMetadata {
        reason: e.to_string(),
    })?;
    Ok(Some(metadata))
}

/// Segments required to hold `len` encoded bytes (at least one)
pub fn segments_for(len: usize) -> usize {
    len.div_ceil(SEGMENT_SIZE).max(1)
}
