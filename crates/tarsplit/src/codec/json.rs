//! Newline-delimited JSON metadata
//!
//! One object per line:
//!
//! ```text
//! {"kind":"segment","raw_bytes":"Li9odXJyLnR4dAAA...","position":0}
//! {"kind":"file","name":"./hurr.txt","size":20,"checksum":"AnSksavsa04=","position":1}
//! ```
//!
//! Byte fields (`raw_bytes`, `name_raw`, `checksum`) are standard padded
//! base64. `name_raw` only appears when a name is not valid UTF-8. Fields a
//! kind does not use are omitted, unknown fields are ignored and blank lines
//! are skipped, so readers tolerate records written by newer versions.

use super::{DuplicateTracker, Packer, Unpacker};
use crate::checksum::{CHECKSUM_LEN, Checksum};
use crate::config::{CodecConfig, DuplicatePolicy};
use crate::entry::{Entry, EntryKind, FileEntry};
use crate::error::{TarSplitError, TarSplitResult};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use tracing::trace;

/// On-disk shape of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_field")]
    raw_bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_field")]
    name_raw: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_field")]
    checksum: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<u64>,
}

impl Record {
    fn from_entry(entry: Entry, position: u64) -> Self {
        let mut record = Self {
            kind: entry.kind(),
            raw_bytes: None,
            name: None,
            name_raw: None,
            size: None,
            checksum: None,
            position: Some(position),
        };
        match entry {
            Entry::Segment(bytes) => record.raw_bytes = Some(bytes),
            Entry::File(file) => {
                record.name = file.name;
                record.name_raw = file.name_raw;
                record.size = Some(file.size);
                record.checksum = Some(file.checksum.as_bytes().to_vec());
            }
        }
        record
    }

    fn into_entry(self) -> Result<Entry, String> {
        match self.kind {
            EntryKind::Segment => self
                .raw_bytes
                .map(Entry::Segment)
                .ok_or_else(|| "segment record without raw_bytes".to_string()),
            EntryKind::File => {
                let size = self.size.ok_or("file record without size")?;
                let checksum = self.checksum.ok_or("file record without checksum")?;
                let checksum = Checksum::from_slice(&checksum).ok_or_else(|| {
                    format!(
                        "checksum must be {CHECKSUM_LEN} bytes, got {}",
                        checksum.len()
                    )
                })?;
                if self.name.is_none() && self.name_raw.is_none() {
                    return Err("file record without a name".to_string());
                }
                Ok(Entry::File(FileEntry {
                    name: self.name,
                    name_raw: self.name_raw,
                    size,
                    checksum,
                }))
            }
        }
    }
}

mod base64_field {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| {
                STANDARD
                    .decode(text.as_bytes())
                    .map_err(|err| D::Error::custom(format!("invalid base64: {err}")))
            })
            .transpose()
    }
}

/// Writes entries as JSON lines.
pub struct JsonPacker<W: Write> {
    writer: W,
    config: CodecConfig,
    duplicates: DuplicateTracker,
    position: u64,
    line: Vec<u8>,
}

impl<W: Write> JsonPacker<W> {
    pub fn new(writer: W) -> Self {
        let config = CodecConfig::default();
        Self {
            writer,
            config,
            duplicates: DuplicateTracker::new(config.duplicate_policy),
            position: 0,
            line: Vec::new(),
        }
    }

    pub fn with_config(writer: W, config: CodecConfig) -> TarSplitResult<Self> {
        config
            .validate()
            .map_err(TarSplitError::InvalidConfiguration)?;
        Ok(Self {
            duplicates: DuplicateTracker::new(config.duplicate_policy),
            config,
            ..Self::new(writer)
        })
    }

    /// Number of entries written so far.
    pub const fn entries_written(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> TarSplitResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> Packer for JsonPacker<W> {
    fn add_entry(&mut self, entry: Entry) -> TarSplitResult<u64> {
        self.duplicates.check_entry(&entry)?;

        let position = self.position;
        self.line.clear();
        serde_json::to_writer(&mut self.line, &Record::from_entry(entry, position))
            .map_err(io::Error::from)?;
        self.line.push(b'\n');

        self.writer.write_all(&self.line)?;
        if self.config.flush_each_entry {
            self.writer.flush()?;
        }

        trace!("Packed record {position} ({} bytes)", self.line.len());
        self.position += 1;
        Ok(position)
    }

    fn duplicate_policy(&self) -> Option<DuplicatePolicy> {
        Some(self.config.duplicate_policy)
    }
}

/// Reads entries from JSON lines.
///
/// Also an iterator of `TarSplitResult<Entry>`. After the first error the
/// unpacker is exhausted.
pub struct JsonUnpacker<R: BufRead> {
    reader: R,
    duplicates: DuplicateTracker,
    line: Vec<u8>,
    record: u64,
    position: u64,
    finished: bool,
}

impl<R: BufRead> JsonUnpacker<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            duplicates: DuplicateTracker::new(CodecConfig::default().duplicate_policy),
            line: Vec::new(),
            record: 0,
            position: 0,
            finished: false,
        }
    }

    pub fn with_config(reader: R, config: CodecConfig) -> TarSplitResult<Self> {
        config
            .validate()
            .map_err(TarSplitError::InvalidConfiguration)?;
        Ok(Self {
            duplicates: DuplicateTracker::new(config.duplicate_policy),
            ..Self::new(reader)
        })
    }

    /// Number of entries returned so far.
    pub const fn entries_read(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn malformed(&self, reason: impl Into<String>) -> TarSplitError {
        TarSplitError::MalformedMetadata {
            record: self.record,
            reason: reason.into(),
        }
    }

    fn read_entry(&mut self) -> TarSplitResult<Option<Entry>> {
        let text = loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }
            let text = self.line.trim_ascii();
            if !text.is_empty() {
                break text;
            }
        };
        self.record += 1;

        let record: Record = match serde_json::from_slice(text) {
            Ok(record) => record,
            Err(err) => return Err(self.malformed(err.to_string())),
        };

        if let Some(position) = record.position
            && position != self.position
        {
            return Err(self.malformed(format!(
                "record position {position} out of order, expected {}",
                self.position
            )));
        }

        let entry = record.into_entry().map_err(|reason| self.malformed(reason))?;
        self.duplicates.check_entry(&entry)?;

        trace!("Unpacked record {} as {:?}", self.record, entry.kind());
        self.position += 1;
        Ok(Some(entry))
    }
}

impl<R: BufRead> Unpacker for JsonUnpacker<R> {
    fn next_entry(&mut self) -> TarSplitResult<Option<Entry>> {
        if self.finished {
            return Ok(None);
        }
        let result = self.read_entry();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }
}

impl<R: BufRead> Iterator for JsonUnpacker<R> {
    type Item = TarSplitResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
