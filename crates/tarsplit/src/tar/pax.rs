//! PAX extended header records
//!
//! Records have the form `"<len> <key>=<value>\n"` where `len` counts the
//! whole record including itself. Parsing is best effort: it stops at the
//! first record that does not fit that shape, keeping what came before.

use super::header::nul_terminated;

/// Overrides a PAX header applies to the following member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaxOverrides {
    pub path: Option<Vec<u8>>,
    pub size: Option<u64>,
}

impl PaxOverrides {
    pub fn parse(data: &[u8]) -> Self {
        let mut overrides = Self::default();
        for (key, value) in records(data) {
            match key {
                b"path" => overrides.path = Some(value.to_vec()),
                b"size" => overrides.size = parse_decimal(value),
                _ => {}
            }
        }
        overrides
    }

    pub fn merge(&mut self, later: Self) {
        if later.path.is_some() {
            self.path = later.path;
        }
        if later.size.is_some() {
            self.size = later.size;
        }
    }
}

/// Iterate well-formed `(key, value)` records.
pub fn records(data: &[u8]) -> impl Iterator<Item = (&[u8], &[u8])> {
    let mut rest = data;
    std::iter::from_fn(move || {
        let (record, tail) = split_record(rest)?;
        rest = tail;
        let eq = record.iter().position(|&b| b == b'=')?;
        Some((&record[..eq], &record[eq + 1..]))
    })
}

/// Split off one record, returning its `key=value` body and the remainder.
fn split_record(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let space = data.iter().position(|&b| b == b' ')?;
    let len = usize::try_from(parse_decimal(&data[..space])?).ok()?;
    if len <= space + 1 || len > data.len() || data[len - 1] != b'\n' {
        return None;
    }
    Some((&data[space + 1..len - 1], &data[len..]))
}

fn parse_decimal(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0u64, |value, &digit| {
        if !digit.is_ascii_digit() {
            return None;
        }
        value.checked_mul(10)?.checked_add(u64::from(digit - b'0'))
    })
}

/// Long name carried by a GNU `L` member: its content up to the first NUL.
pub fn gnu_long_name(content: &[u8]) -> Vec<u8> {
    nul_terminated(content).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, value: &[u8]) -> Vec<u8> {
        let body_len = key.len() + 1 + value.len() + 1;
        let mut len = body_len + 2;
        while len.to_string().len() + 1 + body_len != len {
            len = len.to_string().len() + 1 + body_len;
        }
        let mut out = format!("{len} {key}=").into_bytes();
        out.extend_from_slice(value);
        out.push(b'\n');
        out
    }

    #[test]
    fn path_and_size() {
        let mut data = record("mtime", b"1350244992.023960108");
        data.extend(record("path", b"a/very/long/name.txt"));
        data.extend(record("size", b"20"));

        let overrides = PaxOverrides::parse(&data);
        assert_eq!(overrides.path.as_deref(), Some(&b"a/very/long/name.txt"[..]));
        assert_eq!(overrides.size, Some(20));
    }

    #[test]
    fn path_bytes_are_kept_raw() {
        let data = record("path", &[0x66, 0x69, 0x6c, 0x65, 0x2d, 0xe4]);
        assert_eq!(
            PaxOverrides::parse(&data).path,
            Some(vec![0x66, 0x69, 0x6c, 0x65, 0x2d, 0xe4])
        );
    }

    #[test]
    fn malformed_records_stop_parsing() {
        let mut data = record("path", b"kept");
        data.extend_from_slice(b"999 path=lost\n");
        data.extend(record("size", b"7"));
        let overrides = PaxOverrides::parse(&data);
        assert_eq!(overrides.path.as_deref(), Some(&b"kept"[..]));
        assert_eq!(overrides.size, None);

        assert_eq!(PaxOverrides::parse(b"x path=y\n"), PaxOverrides::default());
        assert_eq!(PaxOverrides::parse(b""), PaxOverrides::default());
    }

    #[test]
    fn later_headers_win() {
        let mut first = PaxOverrides::parse(&record("path", b"one"));
        first.merge(PaxOverrides::parse(&record("size", b"3")));
        first.merge(PaxOverrides::parse(&record("path", b"two")));
        assert_eq!(first.path.as_deref(), Some(&b"two"[..]));
        assert_eq!(first.size, Some(3));
    }

    #[test]
    fn gnu_long_name_trims_nul() {
        assert_eq!(gnu_long_name(b"long/name\0\0\0"), b"long/name");
    }
}
