//! Entry model for the metadata stream
//!
//! The metadata stream is an ordered list of [`Entry`] values. A segment
//! carries raw bytes that are replayed verbatim (headers, padding, trailing
//! data); a file entry stands in for content that lives in a content store.
//! Concatenating segment bytes and file contents in order reproduces the
//! original archive exactly, so entries are never reordered, merged or split
//! after they have been recorded.

use crate::checksum::Checksum;
use serde::{Deserialize, Serialize};

/// Discriminant of an [`Entry`], as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Segment,
    File,
}

/// One record of the metadata stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Raw bytes replayed verbatim during reassembly.
    Segment(Vec<u8>),
    /// Reference to content held in a content store.
    File(FileEntry),
}

impl Entry {
    pub fn segment(raw_bytes: impl Into<Vec<u8>>) -> Self {
        Self::Segment(raw_bytes.into())
    }

    pub fn file(entry: FileEntry) -> Self {
        Self::File(entry)
    }

    pub const fn kind(&self) -> EntryKind {
        match self {
            Self::Segment(_) => EntryKind::Segment,
            Self::File(_) => EntryKind::File,
        }
    }

    /// Raw bytes of a segment entry.
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Segment(bytes) => Some(bytes),
            Self::File(_) => None,
        }
    }

    pub const fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Self::File(file) => Some(file),
            Self::Segment(_) => None,
        }
    }

    /// Store key of a file entry, see [`FileEntry::effective_name`].
    pub fn effective_name(&self) -> Option<&[u8]> {
        self.as_file().map(FileEntry::effective_name)
    }

    /// Number of archive bytes this entry accounts for.
    pub fn stream_len(&self) -> u64 {
        match self {
            Self::Segment(bytes) => bytes.len() as u64,
            Self::File(file) => file.size,
        }
    }
}

/// A file whose content lives in a content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Decoded name. Lossy when `name_raw` is set.
    pub name: Option<String>,
    /// Exact name bytes, only present when they are not valid UTF-8.
    pub name_raw: Option<Vec<u8>>,
    /// Content length in bytes.
    pub size: u64,
    /// CRC-64 of the content.
    pub checksum: Checksum,
}

impl FileEntry {
    /// Create an entry from the name bytes found in the archive.
    ///
    /// Valid UTF-8 is kept as `name`; anything else is kept verbatim in
    /// `name_raw` with a lossy `name` for display.
    pub fn from_name_bytes(name: &[u8], size: u64, checksum: Checksum) -> Self {
        let (name, name_raw) = match std::str::from_utf8(name) {
            Ok(text) => (Some(text.to_string()), None),
            Err(_) => (
                Some(String::from_utf8_lossy(name).into_owned()),
                Some(name.to_vec()),
            ),
        };
        Self {
            name,
            name_raw,
            size,
            checksum,
        }
    }

    /// The key used for both `put` and `get`: `name_raw` if present,
    /// otherwise `name`, otherwise empty.
    pub fn effective_name(&self) -> &[u8] {
        match (&self.name_raw, &self.name) {
            (Some(raw), _) => raw,
            (None, Some(name)) => name.as_bytes(),
            (None, None) => &[],
        }
    }

    /// Printable form of the effective name for logs and errors.
    pub fn display_name(&self) -> String {
        display_key(self.effective_name())
    }
}

/// Render key bytes for humans without losing information: valid UTF-8 is
/// shown as is, anything else is ASCII-escaped.
pub fn display_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(text) => text.to_string(),
        Err(_) => key.escape_ascii().to_string(),
    }
}

/// Lexically normalise a slash-separated name.
///
/// Repeated separators and `.` components are dropped and `..` removes the
/// preceding component where there is one. Used for duplicate detection only;
/// names are never rewritten in the metadata or the store.
pub fn clean_name(name: &[u8]) -> Vec<u8> {
    let rooted = name.first() == Some(&b'/');
    let mut parts: Vec<&[u8]> = Vec::new();

    for part in name.split(|&b| b == b'/') {
        match part {
            b"" | b"." => {}
            b".." => {
                if parts.last().is_some_and(|last| *last != b"..") {
                    parts.pop();
                } else if !rooted {
                    parts.push(part);
                }
            }
            _ => parts.push(part),
        }
    }

    let mut cleaned = Vec::with_capacity(name.len());
    if rooted {
        cleaned.push(b'/');
    }
    cleaned.extend_from_slice(&parts.join(&b'/'));
    if cleaned.is_empty() {
        cleaned.push(b'.');
    }
    cleaned
}
