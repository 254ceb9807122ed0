//! CRC-64 content checksums
//!
//! File content is hashed with CRC-64 over the ISO polynomial
//! (`CRC-64/GO-ISO`: reflected, all-ones init and xorout). The digest is an
//! integrity aid for detecting altered content, not a security control, so a
//! fast CRC is used instead of a cryptographic hash.
//!
//! Digests are stored big-endian, which is the byte order the metadata wire
//! format has always used.

use crc::{CRC_64_GO_ISO, Crc, Digest};
use std::fmt;
use std::io::{self, Read, Write};

/// The CRC-64 engine used for all content checksums.
pub static CRC_64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Width of a checksum in bytes.
pub const CHECKSUM_LEN: usize = 8;

/// Fixed-width digest of one file's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    /// Checksum of zero bytes of content.
    pub const EMPTY: Self = Self([0u8; CHECKSUM_LEN]);

    /// Wrap raw digest bytes.
    pub const fn from_bytes(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a checksum from a slice, which must be exactly 8 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; CHECKSUM_LEN]>::try_from(bytes).ok().map(Self)
    }

    /// Checksum of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self(CRC_64.checksum(data).to_be_bytes())
    }

    /// Raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }
}

impl From<u64> for Checksum {
    fn from(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}

/// Incremental checksum that also counts the bytes it has seen.
pub struct ContentHasher {
    digest: Digest<'static, u64>,
    len: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            digest: CRC_64.digest(),
            len: 0,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
        self.len += bytes.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub const fn len(&self) -> u64 {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finish hashing, returning the byte count and checksum.
    pub fn finalize(self) -> (u64, Checksum) {
        (self.len, Checksum::from(self.digest.finalize()))
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Checksum everything a reader yields until end of input.
pub fn checksum_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<(u64, Checksum)> {
    let mut hasher = ContentHasher::new();
    io::copy(reader, &mut hasher)?;
    Ok(hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(
            Checksum::compute(b"imma hurr til I derp").as_bytes(),
            &[2, 116, 164, 177, 171, 236, 107, 78]
        );
        assert_eq!(
            Checksum::compute("café con leche, por favor".as_bytes()).as_bytes(),
            &[126, 72, 89, 239, 230, 252, 160, 187]
        );
        assert_eq!(Checksum::compute(b""), Checksum::EMPTY);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"imma hurr");
        hasher.update(b" til I derp");
        let (len, sum) = hasher.finalize();
        assert_eq!(len, 20);
        assert_eq!(sum, Checksum::compute(b"imma hurr til I derp"));
    }

    #[test]
    fn reader_checksum_detects_swapped_words() {
        let recorded = Checksum::from_bytes([2, 116, 164, 177, 171, 236, 107, 78]);
        let (len, sum) = checksum_reader(&mut &b"imma derp til I hurr"[..]).unwrap();
        assert_eq!(len, 20);
        assert_ne!(sum, recorded);
    }

    #[test]
    fn from_slice_requires_exact_width() {
        assert!(Checksum::from_slice(&[1, 2, 3]).is_none());
        assert!(Checksum::from_slice(&[0u8; 9]).is_none());
        assert_eq!(
            Checksum::from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]).unwrap(),
            Checksum::from(1u64)
        );
    }

    #[test]
    fn displays_as_hex() {
        let sum = Checksum::from_bytes([2, 116, 164, 177, 171, 236, 107, 78]);
        assert_eq!(sum.to_string(), "0274a4b1abec6b4e");
    }
}
