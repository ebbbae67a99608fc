//! Error types for storage engine operations.

use std::io;
use tessera_codec::CodecError;
use thiserror::Error;

/// Result type for storage engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by a storage engine or one of its backends.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Attempted to read beyond the end of a backend.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// The journal is structurally invalid.
    #[error("journal corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// A journal frame failed its checksum.
    #[error("checksum mismatch in frame at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Offset of the frame.
        offset: u64,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },

    /// The connection is closed or its database was deleted.
    #[error("connection is closed")]
    Closed,

    /// Another engine holds the lock on this location.
    #[error("storage locked: another engine has exclusive access")]
    Locked,

    /// Other connections stayed open through a version change.
    #[error("database '{name}' is blocked by {open} open connection(s)")]
    Blocked {
        /// Database name.
        name: String,
        /// Connections that did not close.
        open: usize,
    },

    /// Requested version is lower than the stored one.
    #[error("requested version {requested} is lower than stored version {current}")]
    VersionError {
        /// Version passed to open.
        requested: u64,
        /// Version currently stored.
        current: u64,
    },

    /// Version is not a positive integer.
    #[error("invalid version {version}: versions start at 1")]
    InvalidVersion {
        /// The rejected version.
        version: u64,
    },

    /// A key or unique-index constraint was violated.
    #[error("constraint violated: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// A record cannot be stored as given (for example it has no usable key).
    #[error("data error: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// A named collection or index does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// A named collection or index already exists.
    #[error("already exists: {what}")]
    AlreadyExists {
        /// What was created.
        what: String,
    },

    /// The upgrade was aborted and nothing was committed.
    #[error("upgrade aborted: {reason}")]
    Aborted {
        /// Reason given to abort.
        reason: String,
    },

    /// The operation is not valid in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the state problem.
        message: String,
    },
}

impl EngineError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates an already-exists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Creates an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}
