//! Content store contract and backends
//!
//! A content store persists file bodies under byte-string keys. It is the
//! only place file content lives once an archive has been disassembled; the
//! metadata stream refers to it by key.
//!
//! # Contract
//!
//! - [`ContentStore::put`] consumes a reader to completion and returns the
//!   number of bytes stored and their CRC-64 checksum.
//! - [`ContentStore::create`] opens a push-style [`ContentSink`]. The
//!   disassembly stream forwards content to its caller while it reads, so it
//!   writes into a sink instead of handing the store a reader. `put` is built
//!   on `create`, so both paths share one checksum implementation
//!   ([`ContentWriter`]).
//! - [`ContentStore::get`] returns an owned, independent reader. Dropping it
//!   releases whatever it holds, on every exit path.
//!
//! Stores never verify checksums. A second `put` under the same key replaces
//! the first (last write wins). Stores are `Send + Sync` and must tolerate
//! concurrent `get` calls from several reassembly passes.
//!
//! # Backends
//!
//! - [`MemoryStore`]: everything resident in a concurrent map
//! - [`DirStore`]: one file per key under a directory
//! - [`TreeStore`]: read-only view of an extracted archive tree
//! - [`DiscardStore`]: checksums content and throws it away

mod dir;
mod discard;
mod memory;
mod tree;

pub use dir::DirStore;
pub use discard::DiscardStore;
pub use memory::MemoryStore;
pub use tree::TreeStore;

use crate::checksum::{Checksum, ContentHasher};
use crate::entry::display_key;
use std::io::{self, Read, Write};
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by content store backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing has been stored under this key
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The backing medium did not accept the data
    #[error("write failed for {key}: {source}")]
    Write {
        /// Printable form of the key
        key: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The backend does not accept writes
    #[error("store is read-only, cannot write {0}")]
    ReadOnly(String),

    /// Other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub(crate) fn write(key: &[u8], source: io::Error) -> Self {
        Self::Write {
            key: display_key(key),
            source,
        }
    }

    pub(crate) fn not_found(key: &[u8]) -> Self {
        Self::KeyNotFound(display_key(key))
    }
}

const PUT_BUFFER_SIZE: usize = 8 * 1024;

/// Result type for content store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Owned read handle returned by [`ContentStore::get`].
pub type ContentReader = Box<dyn Read + Send>;

/// Destination for one key's content.
///
/// Bytes written are not visible to `get` until [`commit`](Self::commit)
/// succeeds. Dropping a sink without committing abandons the write.
pub trait ContentSink: Write + Send {
    fn commit(self: Box<Self>) -> io::Result<()>;
}

/// Pluggable persistence for file content
pub trait ContentStore: Send + Sync {
    /// Open a sink that stores content under `key` once committed.
    fn create(&self, key: &[u8]) -> StoreResult<Box<dyn ContentSink>>;

    /// Open the content stored under `key`.
    fn get(&self, key: &[u8]) -> StoreResult<ContentReader>;

    /// Store everything `content` yields under `key`.
    ///
    /// Returns the byte count and checksum of exactly the bytes stored. On
    /// error the state of `key` is unspecified. Failures of `content` are
    /// reported as [`StoreError::Io`], failures of the medium as
    /// [`StoreError::Write`].
    fn put(&self, key: &[u8], content: &mut dyn Read) -> StoreResult<(u64, Checksum)> {
        let mut writer = ContentWriter::new(key, self.create(key)?);
        let mut buf = [0u8; PUT_BUFFER_SIZE];
        loop {
            let n = match content.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(StoreError::Io(err)),
            };
            writer
                .write_all(&buf[..n])
                .map_err(|source| StoreError::write(key, source))?;
        }
        writer.finish()
    }
}

impl<T: ContentStore + ?Sized> ContentStore for &T {
    fn create(&self, key: &[u8]) -> StoreResult<Box<dyn ContentSink>> {
        (**self).create(key)
    }

    fn get(&self, key: &[u8]) -> StoreResult<ContentReader> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], content: &mut dyn Read) -> StoreResult<(u64, Checksum)> {
        (**self).put(key, content)
    }
}

impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    fn create(&self, key: &[u8]) -> StoreResult<Box<dyn ContentSink>> {
        (**self).create(key)
    }

    fn get(&self, key: &[u8]) -> StoreResult<ContentReader> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], content: &mut dyn Read) -> StoreResult<(u64, Checksum)> {
        (**self).put(key, content)
    }
}

impl<T: ContentStore + ?Sized> ContentStore for Box<T> {
    fn create(&self, key: &[u8]) -> StoreResult<Box<dyn ContentSink>> {
        (**self).create(key)
    }

    fn get(&self, key: &[u8]) -> StoreResult<ContentReader> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], content: &mut dyn Read) -> StoreResult<(u64, Checksum)> {
        (**self).put(key, content)
    }
}

/// Checksumming wrapper around a [`ContentSink`].
///
/// Counts and hashes exactly the bytes the sink accepted.
pub struct ContentWriter {
    key: Vec<u8>,
    sink: Box<dyn ContentSink>,
    hasher: ContentHasher,
}

impl ContentWriter {
    pub fn new(key: &[u8], sink: Box<dyn ContentSink>) -> Self {
        Self {
            key: key.to_vec(),
            sink,
            hasher: ContentHasher::new(),
        }
    }

    pub const fn bytes_written(&self) -> u64 {
        self.hasher.len()
    }

    /// Commit the content, returning its size and checksum.
    pub fn finish(mut self) -> StoreResult<(u64, Checksum)> {
        if let Err(source) = self.sink.flush() {
            return Err(StoreError::write(&self.key, source));
        }
        let Self { key, sink, hasher } = self;
        sink.commit()
            .map_err(|source| StoreError::write(&key, source))?;
        Ok(hasher.finalize())
    }
}

impl Write for ContentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.sink.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
