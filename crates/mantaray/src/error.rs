//! Error types for manifest operations

use std::error::Error;

/// Boxed error type for error sources
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Result type alias for manifest operations
pub type Result<T> = std::result::Result<T, MantarayError>;

/// Manifest operation error with rich diagnostics
///
/// Every failure surfaces to the caller of the outermost public operation and
/// carries enough context (path, field, or buffer region) to localize the
/// fault. Nothing is swallowed along the way.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum MantarayError {
    /// Path argument required but empty
    #[error("path must not be empty")]
    #[diagnostic(code(mantaray::empty_path))]
    EmptyPath,

    /// Navigation missed a fork key or a prefix
    #[error("path not found: {path}")]
    #[diagnostic(code(mantaray::not_found))]
    NotFound {
        /// Lossy rendering of the requested path
        path: String,
    },

    /// Reference length is not 32 or 64 bytes
    #[error("invalid reference length: {len} bytes")]
    #[diagnostic(
        code(mantaray::invalid_reference),
        help("references are 32 bytes plain or 64 bytes encrypted")
    )]
    InvalidReference {
        /// Offending byte length
        len: usize,
    },

    /// Metadata is not a string-keyed JSON object, or failed to parse at load
    #[error("invalid metadata: {reason}")]
    #[diagnostic(code(mantaray::invalid_metadata))]
    InvalidMetadata {
        /// What the JSON layer rejected
        reason: String,
    },

    /// Fork metadata exceeds the parent's fixed slot
    #[error("metadata is {size} bytes, slot holds {capacity}")]
    #[diagnostic(
        code(mantaray::metadata_overflow),
        help("fork metadata slots are sized in 32-byte segments by the parent node")
    )]
    MetadataOverflow {
        /// Encoded metadata size
        size: usize,
        /// Slot capacity in bytes
        capacity: usize,
    },

    /// Truncated buffer, bad version tag, or inconsistent flag/length relation
    #[error("malformed node data: {context}")]
    #[diagnostic(code(mantaray::malformed_format))]
    MalformedFormat {
        /// Which region or field failed to parse
        context: String,
    },

    /// Fork insertion under a non-zero-key parent without a key generator
    #[error("obfuscation key generator required but not supplied")]
    #[diagnostic(
        code(mantaray::missing_key_generator),
        help("nodes allocated under an obfuscated parent need fresh keys from the caller")
    )]
    MissingKeyGenerator,

    /// Save attempted on a dirty node with no entry and no forks
    #[error("dirty node has neither an entry nor forks")]
    #[diagnostic(code(mantaray::dirty_without_payload))]
    DirtyWithoutPayload,

    /// Serialize attempted while a child fork has no content address
    #[error("fork 0x{first_byte:02x} references an unsaved node")]
    #[diagnostic(
        code(mantaray::unsaved_fork),
        help("save the tree, or the child subtree, before serializing the parent")
    )]
    UnsavedFork {
        /// First byte of the offending fork's prefix
        first_byte: u8,
    },

    /// Structural comparison found a difference
    #[error("nodes differ in {field} at path \"{path}\"")]
    #[diagnostic(code(mantaray::node_mismatch))]
    NodeMismatch {
        /// Accumulated path prefix where the difference was found
        path: String,
        /// Which attribute differed
        field: &'static str,
    },

    /// Propagated from the storage backend unchanged
    #[error("storage operation failed")]
    #[diagnostic(code(mantaray::storage))]
    Storage {
        /// Underlying backend error
        #[source]
        source: BoxError,
    },
}

impl MantarayError {
    /// Create a storage error from a backend failure
    pub fn storage(source: impl Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Create a storage error from a plain message
    pub fn storage_msg(msg: impl Into<String>) -> Self {
        Self::Storage {
            source: msg.into().into(),
        }
    }

    /// Create a malformed-format error
    pub fn malformed(context: impl Into<String>) -> Self {
        Self::MalformedFormat {
            context: context.into(),
        }
    }

    /// Create a not-found error for the given path bytes
    pub fn not_found(path: &[u8]) -> Self {
        Self::NotFound {
            path: String::from_utf8_lossy(path).into_owned(),
        }
    }

    /// Create a structural-mismatch error at the given path prefix
    pub fn mismatch(path: &[u8], field: &'static str) -> Self {
        Self::NodeMismatch {
            path: String::from_utf8_lossy(path).into_owned(),
            field,
        }
    }
}
