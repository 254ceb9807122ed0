//! Error types for disassembly and reassembly

use crate::checksum::Checksum;
use std::io;
use thiserror::Error;

/// Errors that can occur while splitting or rebuilding an archive stream
#[derive(Debug, Error)]
pub enum TarSplitError {
    /// Input ended before a file's declared content length was read
    #[error("truncated input in {name}: expected {expected} content bytes, got {actual}")]
    TruncatedInput {
        /// Printable form of the file name
        name: String,
        /// Declared content length
        expected: u64,
        /// Bytes read before end of input
        actual: u64,
    },

    /// The content store could not accept data
    #[error("store write failed for {key}: {source}")]
    StoreWrite {
        /// Printable form of the store key
        key: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The content store has nothing under this key
    #[error("key not found in store: {0}")]
    StoreKeyNotFound(String),

    /// Reassembly could not obtain a file's full content
    #[error("missing content for {name}: expected {expected} bytes, got {actual}")]
    MissingContent {
        /// Printable form of the file name
        name: String,
        /// Size recorded in the metadata
        expected: u64,
        /// Bytes the store delivered
        actual: u64,
    },

    /// Re-hashed content does not match the recorded checksum
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Printable form of the file name
        name: String,
        /// Checksum recorded at disassembly
        expected: Checksum,
        /// Checksum of the bytes emitted during reassembly
        actual: Checksum,
    },

    /// A metadata record could not be decoded
    #[error("malformed metadata at record {record}: {reason}")]
    MalformedMetadata {
        /// 1-based record number
        record: u64,
        /// What was wrong with it
        reason: String,
    },

    /// A file name appeared twice
    #[error("duplicate path: {0}")]
    DuplicatePath(String),

    /// Invalid stream or codec configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error on the upstream reader or metadata medium
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for tarsplit operations
pub type TarSplitResult<T> = Result<T, TarSplitError>;

impl TarSplitError {
    /// Recover the typed error carried inside an `io::Error` returned by one
    /// of the streams.
    pub fn from_io(err: &io::Error) -> Option<&Self> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<Self>())
    }

    /// Unwrap an `io::Error` produced by a stream back into a `TarSplitError`.
    ///
    /// Plain I/O errors become [`TarSplitError::Io`].
    pub fn from_io_owned(err: io::Error) -> Self {
        if Self::from_io(&err).is_none() {
            return Self::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Self>()) {
            Some(Ok(typed)) => *typed,
            Some(Err(other)) => Self::Io(io::Error::other(other)),
            None => Self::Io(io::Error::other("empty I/O error payload")),
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::TruncatedInput { .. } | Self::MissingContent { .. } => {
                io::ErrorKind::UnexpectedEof
            }
            Self::StoreKeyNotFound(_) => io::ErrorKind::NotFound,
            Self::MalformedMetadata { .. } | Self::ChecksumMismatch { .. } => {
                io::ErrorKind::InvalidData
            }
            Self::DuplicatePath(_) => io::ErrorKind::AlreadyExists,
            Self::InvalidConfiguration(_) => io::ErrorKind::InvalidInput,
            Self::StoreWrite { source, .. } => source.kind(),
            Self::Io(err) => err.kind(),
        }
    }
}

impl From<TarSplitError> for io::Error {
    fn from(err: TarSplitError) -> Self {
        match err {
            TarSplitError::Io(inner) => inner,
            other => Self::new(other.io_kind(), other),
        }
    }
}

impl From<crate::store::StoreError> for TarSplitError {
    fn from(err: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match err {
            StoreError::KeyNotFound(key) => Self::StoreKeyNotFound(key),
            StoreError::Write { key, source } => Self::StoreWrite { key, source },
            StoreError::ReadOnly(key) => Self::StoreWrite {
                key,
                source: io::Error::new(io::ErrorKind::PermissionDenied, "store is read-only"),
            },
            StoreError::Io(source) => Self::Io(source),
        }
    }
}
