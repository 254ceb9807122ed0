//! Field access for one 512-byte tar header block

use super::BLOCK_SIZE;

const NAME: std::ops::Range<usize> = 0..100;
const SIZE: std::ops::Range<usize> = 124..136;
const TYPEFLAG: usize = 156;
const MAGIC: std::ops::Range<usize> = 257..263;
const PREFIX: std::ops::Range<usize> = 345..500;

/// POSIX ustar magic plus the NUL terminator. GNU archives use `"ustar "`
/// and keep other fields where the prefix would be.
const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// Typeflags whose entries never carry content, whatever the size field says.
pub const HEADER_ONLY_TYPES: &[u8] = b"123456";

/// Borrowed view of a header block
#[derive(Debug, Clone, Copy)]
pub struct Header<'a> {
    block: &'a [u8; BLOCK_SIZE],
}

impl<'a> Header<'a> {
    pub const fn new(block: &'a [u8; BLOCK_SIZE]) -> Self {
        Self { block }
    }

    pub fn is_zero(&self) -> bool {
        self.block.iter().all(|&b| b == 0)
    }

    pub const fn typeflag(&self) -> u8 {
        self.block[TYPEFLAG]
    }

    pub fn is_ustar(&self) -> bool {
        &self.block[MAGIC] == USTAR_MAGIC
    }

    /// Name from the header alone: `prefix/name` for ustar headers with a
    /// prefix, otherwise the name field.
    pub fn name(&self) -> Vec<u8> {
        let name = nul_terminated(&self.block[NAME]);
        let prefix = nul_terminated(&self.block[PREFIX]);

        if self.is_ustar() && !prefix.is_empty() {
            let mut full = Vec::with_capacity(prefix.len() + 1 + name.len());
            full.extend_from_slice(prefix);
            full.push(b'/');
            full.extend_from_slice(name);
            full
        } else {
            name.to_vec()
        }
    }

    /// Value of the size field, `None` if it cannot be parsed.
    pub fn size(&self) -> Option<u64> {
        parse_numeric(&self.block[SIZE])
    }
}

/// Bytes up to the first NUL.
pub fn nul_terminated(field: &[u8]) -> &[u8] {
    match field.iter().position(|&b| b == 0) {
        Some(end) => &field[..end],
        None => field,
    }
}

/// Parse a numeric header field: base-256 when the high bit of the first
/// byte is set, otherwise space/NUL padded octal.
pub fn parse_numeric(field: &[u8]) -> Option<u64> {
    match field.first() {
        Some(&first) if first & 0x80 != 0 => parse_base256(first, &field[1..]),
        _ => parse_octal(field),
    }
}

fn parse_base256(first: u8, rest: &[u8]) -> Option<u64> {
    // bit 6 is the sign; negative values are never valid sizes
    if first & 0x40 != 0 {
        return None;
    }

    let mut value = u64::from(first & 0x3f);
    for &byte in rest {
        if value >> 56 != 0 {
            return None;
        }
        value = (value << 8) | u64::from(byte);
    }
    Some(value)
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let is_padding = |b: &u8| *b == b' ' || *b == 0;
    let start = field.iter().position(|b| !is_padding(b)).unwrap_or(field.len());
    let end = field.iter().rposition(|b| !is_padding(b)).map_or(start, |i| i + 1);

    field[start..end].iter().try_fold(0u64, |value, &digit| {
        if !(b'0'..=b'7').contains(&digit) {
            return None;
        }
        value.checked_mul(8)?.checked_add(u64::from(digit - b'0'))
    })
}
