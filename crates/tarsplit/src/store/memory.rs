//! In-memory content store
//!
//! Keeps every file body resident in a `DashMap`, so concurrent `get` calls
//! from several reassembly passes never contend on a single lock. Suitable
//! for tests and small archives.

use super::{ContentReader, ContentSink, ContentStore, StoreError, StoreResult};
use bytes::Bytes;
use dashmap::DashMap;
use std::io::{self, Cursor, Write};
use std::sync::Arc;
use tracing::trace;

/// Content store backed by a concurrent in-memory map.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<Vec<u8>, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Total content bytes held.
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.value().len() as u64)
            .sum()
    }

    /// Stored keys in no particular order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl ContentStore for MemoryStore {
    fn create(&self, key: &[u8]) -> StoreResult<Box<dyn ContentSink>> {
        Ok(Box::new(MemorySink {
            key: key.to_vec(),
            buffer: Vec::new(),
            entries: Arc::clone(&self.entries),
        }))
    }

    fn get(&self, key: &[u8]) -> StoreResult<ContentReader> {
        // Bytes clones share the buffer; each handle gets its own cursor
        let content = self
            .entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found(key))?;
        Ok(Box::new(Cursor::new(content)))
    }
}

struct MemorySink {
    key: Vec<u8>,
    buffer: Vec<u8>,
    entries: Arc<DashMap<Vec<u8>, Bytes>>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContentSink for MemorySink {
    fn commit(self: Box<Self>) -> io::Result<()> {
        let Self {
            key,
            buffer,
            entries,
        } = *self;
        trace!("Memory store commit: {} bytes", buffer.len());
        entries.insert(key, Bytes::from(buffer));
        Ok(())
    }
}
