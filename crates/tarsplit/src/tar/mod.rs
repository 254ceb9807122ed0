//! Tar header scanning
//!
//! Only what the disassembly stream needs is interpreted: where each member's
//! content starts and ends, and the name it should be stored under. Header
//! checksums, modes, owners and timestamps are left alone; they travel
//! untouched inside segment bytes.

mod header;
mod pax;

pub use header::{HEADER_ONLY_TYPES, Header, nul_terminated, parse_numeric};
pub use pax::{PaxOverrides, gnu_long_name};

/// Size of a tar block; headers occupy one block and content is padded to
/// a multiple of it.
pub const BLOCK_SIZE: usize = 512;

/// Zero bytes that follow `size` bytes of content.
pub const fn padding(size: u64) -> u64 {
    let rem = size % BLOCK_SIZE as u64;
    if rem == 0 { 0 } else { BLOCK_SIZE as u64 - rem }
}

/// Extension members that describe the member after them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// GNU `L`: long name of the next member
    LongName,
    /// GNU `K`: long link target of the next member
    LongLinkName,
    /// PAX `x` (or the old Solaris `X`): records for the next member
    Pax,
    /// PAX `g`: records for every following member
    PaxGlobal,
}

impl Extension {
    pub const fn from_typeflag(typeflag: u8) -> Option<Self> {
        match typeflag {
            b'L' => Some(Self::LongName),
            b'K' => Some(Self::LongLinkName),
            b'x' | b'X' => Some(Self::Pax),
            b'g' => Some(Self::PaxGlobal),
            _ => None,
        }
    }
}

/// What a header block announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// All-zero block: start of the end-of-archive area.
    EndOfArchive,
    /// Extension member with `size` bytes of content.
    Extension { kind: Extension, size: u64 },
    /// A member proper. `size` is the number of content bytes that follow.
    Member { name: Vec<u8>, size: u64 },
    /// The header cannot be interpreted.
    Malformed(String),
}

/// Classifies header blocks, carrying extension data over to the member
/// it applies to.
#[derive(Debug)]
pub struct HeaderScanner {
    max_extension_size: u64,
    long_name: Option<Vec<u8>>,
    pax: PaxOverrides,
}

impl HeaderScanner {
    pub fn new(max_extension_size: u64) -> Self {
        Self {
            max_extension_size,
            long_name: None,
            pax: PaxOverrides::default(),
        }
    }

    pub fn classify(&mut self, block: &[u8; BLOCK_SIZE]) -> Block {
        let header = Header::new(block);
        if header.is_zero() {
            return Block::EndOfArchive;
        }

        let typeflag = header.typeflag();
        if let Some(kind) = Extension::from_typeflag(typeflag) {
            let Some(size) = header.size() else {
                return Block::Malformed("unparseable extension size".to_string());
            };
            if size > self.max_extension_size {
                return Block::Malformed(format!(
                    "extension of {size} bytes exceeds limit of {}",
                    self.max_extension_size
                ));
            }
            return Block::Extension { kind, size };
        }

        let long_name = self.long_name.take();
        let pax = std::mem::take(&mut self.pax);

        let size = if HEADER_ONLY_TYPES.contains(&typeflag) {
            0
        } else {
            match pax.size.or_else(|| header.size()) {
                Some(size) => size,
                None => return Block::Malformed("unparseable size field".to_string()),
            }
        };

        let name = pax.path.or(long_name).unwrap_or_else(|| header.name());
        Block::Member { name, size }
    }

    /// Record the content of an extension member for the next member.
    pub fn apply_extension(&mut self, kind: Extension, content: &[u8]) {
        match kind {
            Extension::LongName => self.long_name = Some(gnu_long_name(content)),
            Extension::Pax => self.pax.merge(PaxOverrides::parse(content)),
            Extension::LongLinkName | Extension::PaxGlobal => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &[u8], size: u64, typeflag: u8) -> [u8; BLOCK_SIZE] {
        let mut block = [0u8; BLOCK_SIZE];
        block[..name.len()].copy_from_slice(name);
        let size = format!("{size:011o}\0");
        block[124..136].copy_from_slice(size.as_bytes());
        block[156] = typeflag;
        block
    }

    #[test]
    fn padding_to_block_boundary() {
        assert_eq!(padding(0), 0);
        assert_eq!(padding(1), 511);
        assert_eq!(padding(20), 492);
        assert_eq!(padding(512), 0);
        assert_eq!(padding(513), 511);
    }

    #[test]
    fn regular_member() {
        let mut scanner = HeaderScanner::new(1024);
        assert_eq!(
            scanner.classify(&header(b"./hurr.txt", 20, b'0')),
            Block::Member {
                name: b"./hurr.txt".to_vec(),
                size: 20
            }
        );
        assert_eq!(scanner.classify(&[0u8; BLOCK_SIZE]), Block::EndOfArchive);
    }

    #[test]
    fn header_only_types_have_no_content() {
        let mut scanner = HeaderScanner::new(1024);
        for typeflag in HEADER_ONLY_TYPES {
            assert_eq!(
                scanner.classify(&header(b"node", 4096, *typeflag)),
                Block::Member {
                    name: b"node".to_vec(),
                    size: 0
                }
            );
        }
    }

    #[test]
    fn gnu_long_name_applies_once() {
        let mut scanner = HeaderScanner::new(1024);
        assert_eq!(
            scanner.classify(&header(b"././@LongLink", 14, b'L')),
            Block::Extension {
                kind: Extension::LongName,
                size: 14
            }
        );
        scanner.apply_extension(Extension::LongName, b"long/name.txt\0");

        assert_eq!(
            scanner.classify(&header(b"long/name.t", 3, b'0')),
            Block::Member {
                name: b"long/name.txt".to_vec(),
                size: 3
            }
        );
        assert_eq!(
            scanner.classify(&header(b"short", 3, b'0')),
            Block::Member {
                name: b"short".to_vec(),
                size: 3
            }
        );
    }

    #[test]
    fn pax_overrides_name_and_size() {
        let mut scanner = HeaderScanner::new(1024);
        scanner.apply_extension(Extension::LongName, b"gnu\0");
        scanner.apply_extension(Extension::Pax, b"12 path=pax\n11 size=99\n");

        assert_eq!(
            scanner.classify(&header(b"plain", 3, b'0')),
            Block::Member {
                name: b"pax".to_vec(),
                size: 99
            }
        );
    }

    #[test]
    fn global_pax_does_not_rename() {
        let mut scanner = HeaderScanner::new(1024);
        scanner.apply_extension(Extension::PaxGlobal, b"12 path=pax\n");
        assert_eq!(
            scanner.classify(&header(b"plain", 3, b'0')),
            Block::Member {
                name: b"plain".to_vec(),
                size: 3
            }
        );
    }

    #[test]
    fn malformed_headers() {
        let mut scanner = HeaderScanner::new(1024);

        let mut block = header(b"bad", 0, b'0');
        block[124..136].copy_from_slice(b"not a size!\0");
        assert!(matches!(scanner.classify(&block), Block::Malformed(_)));

        assert!(matches!(
            scanner.classify(&header(b"././@LongLink", 4096, b'L')),
            Block::Malformed(_)
        ));
    }
}
