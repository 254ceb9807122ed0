use super::{ContentReader, ContentSink, ContentStore, StoreError, StoreResult};
use std::io::{self, Write};

/// Store that keeps nothing.
///
/// Size and checksum are still computed by [`ContentWriter`](super::ContentWriter),
/// so disassembling into a `DiscardStore` records complete metadata without
/// holding on to any content.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardStore;

impl DiscardStore {
    pub const fn new() -> Self {
        Self
    }
}

impl ContentStore for DiscardStore {
    fn create(&self, _key: &[u8]) -> StoreResult<Box<dyn ContentSink>> {
        Ok(Box::new(DiscardSink))
    }

    fn get(&self, key: &[u8]) -> StoreResult<ContentReader> {
        Err(StoreError::not_found(key))
    }
}

struct DiscardSink;

impl Write for DiscardSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContentSink for DiscardSink {
    fn commit(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn put_checksums_and_forgets() {
        let store = DiscardStore::new();
        let (len, sum) = store
            .put(b"./hurr.txt", &mut &b"imma hurr til I derp"[..])
            .unwrap();
        assert_eq!(len, 20);
        assert_eq!(sum.as_bytes(), &[2, 116, 164, 177, 171, 236, 107, 78]);
        assert!(matches!(
            store.get(b"./hurr.txt"),
            Err(StoreError::KeyNotFound(_))
        ));
    }
}
