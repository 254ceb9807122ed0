//! Reassembly stream
//!
//! [`Reassembler`] pulls entries from an [`Unpacker`] one at a time and
//! yields the original archive bytes: segment bytes verbatim, and for each
//! file entry exactly `size` bytes read from the [`ContentStore`] under the
//! entry's effective name. Each store handle is dropped as soon as its file
//! has been emitted.

use crate::checksum::ContentHasher;
use crate::codec::Unpacker;
use crate::config::{ChecksumPolicy, ReassemblyConfig};
use crate::entry::{Entry, FileEntry};
use crate::error::{TarSplitError, TarSplitResult};
use crate::store::{ContentReader, ContentStore, StoreError};
use std::io::{self, Read, Write};
use std::mem;
use tracing::{debug, info, trace, warn};

/// Counters describing a reassembly pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Bytes returned to the caller
    pub bytes: u64,
    /// Segment entries replayed
    pub segments: u64,
    /// File entries replayed, including zero-size ones
    pub files: u64,
    /// Files whose content did not match the recorded checksum
    pub mismatches: u64,
}

enum State {
    /// Between entries
    Idle,
    Segment {
        bytes: Vec<u8>,
        pos: usize,
    },
    File {
        reader: ContentReader,
        entry: FileEntry,
        remaining: u64,
        hasher: Option<ContentHasher>,
    },
    Done,
    Failed(String),
}

/// Read adapter that rebuilds an archive from metadata and stored content
pub struct Reassembler<U, S> {
    unpacker: U,
    store: S,
    config: ReassemblyConfig,
    state: State,
    mismatches: Vec<TarSplitError>,
    stats: ReassemblyStats,
}

impl<U: Unpacker, S: ContentStore> Reassembler<U, S> {
    /// Create a stream that does not verify checksums.
    pub fn new(unpacker: U, store: S) -> Self {
        Self {
            unpacker,
            store,
            config: ReassemblyConfig::default(),
            state: State::Idle,
            mismatches: Vec::new(),
            stats: ReassemblyStats::default(),
        }
    }

    pub fn with_config(unpacker: U, store: S, config: ReassemblyConfig) -> TarSplitResult<Self> {
        config
            .validate()
            .map_err(TarSplitError::InvalidConfiguration)?;
        Ok(Self {
            config,
            ..Self::new(unpacker, store)
        })
    }

    /// Checksum mismatches recorded under [`ChecksumPolicy::Report`].
    pub fn mismatches(&self) -> &[TarSplitError] {
        &self.mismatches
    }

    /// True once the metadata stream has been exhausted.
    pub const fn is_complete(&self) -> bool {
        matches!(self.state, State::Done)
    }

    pub const fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    pub fn into_parts(self) -> (U, S) {
        (self.unpacker, self.store)
    }

    /// Move to the next entry that has bytes to emit.
    fn next_entry(&mut self) -> TarSplitResult<()> {
        let Some(entry) = self.unpacker.next_entry()? else {
            debug!(
                "Reassembly complete: {} bytes, {} files, {} segments",
                self.stats.bytes, self.stats.files, self.stats.segments
            );
            self.state = State::Done;
            return Ok(());
        };

        match entry {
            Entry::Segment(bytes) => {
                trace!("Replaying segment of {} bytes", bytes.len());
                self.stats.segments += 1;
                self.state = State::Segment { bytes, pos: 0 };
            }
            Entry::File(entry) => {
                self.stats.files += 1;
                if entry.size == 0 {
                    return Ok(());
                }

                let reader = match self.store.get(entry.effective_name()) {
                    Ok(reader) => reader,
                    Err(StoreError::KeyNotFound(_)) => {
                        return Err(TarSplitError::MissingContent {
                            name: entry.display_name(),
                            expected: entry.size,
                            actual: 0,
                        });
                    }
                    Err(err) => return Err(err.into()),
                };

                debug!("Replaying {} ({} bytes)", entry.display_name(), entry.size);
                let hasher = self.config.checksum_policy.verifies().then(ContentHasher::new);
                self.state = State::File {
                    reader,
                    remaining: entry.size,
                    entry,
                    hasher,
                };
            }
        }
        Ok(())
    }

    /// Release the current file's handle and check its checksum.
    fn complete_file(&mut self) -> TarSplitResult<()> {
        let State::File { entry, hasher, .. } = mem::replace(&mut self.state, State::Idle) else {
            return Ok(());
        };
        let Some(hasher) = hasher else {
            return Ok(());
        };

        let (_, actual) = hasher.finalize();
        if actual == entry.checksum {
            return Ok(());
        }

        self.stats.mismatches += 1;
        let mismatch = TarSplitError::ChecksumMismatch {
            name: entry.display_name(),
            expected: entry.checksum,
            actual,
        };
        match self.config.checksum_policy {
            ChecksumPolicy::Abort => Err(mismatch),
            ChecksumPolicy::Report | ChecksumPolicy::Ignore => {
                warn!("{mismatch}");
                self.mismatches.push(mismatch);
                Ok(())
            }
        }
    }

    fn read_file(&mut self, buf: &mut [u8]) -> TarSplitResult<usize> {
        let State::File {
            reader,
            entry,
            remaining,
            hasher,
        } = &mut self.state
        else {
            return Ok(0);
        };

        let want = buf.len().min(usize::try_from(*remaining).unwrap_or(usize::MAX));
        let n = loop {
            match reader.read(&mut buf[..want]) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        };

        if n == 0 {
            return Err(TarSplitError::MissingContent {
                name: entry.display_name(),
                expected: entry.size,
                actual: entry.size - *remaining,
            });
        }

        if let Some(hasher) = hasher {
            hasher.update(&buf[..n]);
        }
        *remaining -= n as u64;
        if *remaining == 0 {
            self.complete_file()?;
        }
        Ok(n)
    }

    fn fail(&mut self, err: TarSplitError) -> io::Error {
        warn!("Reassembly failed: {err}");
        self.state = State::Failed(err.to_string());
        err.into()
    }
}

impl<U: Unpacker, S: ContentStore> Read for Reassembler<U, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let result = match &mut self.state {
                State::Done => return Ok(0),
                State::Failed(reason) => {
                    return Err(io::Error::other(format!(
                        "reassembly stream already failed: {reason}"
                    )));
                }
                State::Segment { bytes, pos } => {
                    if *pos < bytes.len() {
                        let n = (bytes.len() - *pos).min(buf.len());
                        buf[..n].copy_from_slice(&bytes[*pos..*pos + n]);
                        *pos += n;
                        self.stats.bytes += n as u64;
                        return Ok(n);
                    }
                    self.state = State::Idle;
                    Ok(0)
                }
                State::File { .. } => self.read_file(buf),
                State::Idle => self.next_entry().map(|()| 0),
            };

            match result {
                Ok(0) => {}
                Ok(n) => {
                    self.stats.bytes += n as u64;
                    return Ok(n);
                }
                Err(err) => return Err(self.fail(err)),
            }
        }
    }
}

/// Rebuild an archive into `output` without checksum verification.
pub fn reassemble<U, S, W>(unpacker: U, store: S, output: W) -> TarSplitResult<ReassemblyStats>
where
    U: Unpacker,
    S: ContentStore,
    W: Write,
{
    reassemble_with_config(unpacker, store, output, ReassemblyConfig::default())
}

/// [`reassemble`] with an explicit configuration. Mismatches found under
/// [`ChecksumPolicy::Report`] are logged and counted in the returned stats.
pub fn reassemble_with_config<U, S, W>(
    unpacker: U,
    store: S,
    mut output: W,
    config: ReassemblyConfig,
) -> TarSplitResult<ReassemblyStats>
where
    U: Unpacker,
    S: ContentStore,
    W: Write,
{
    let mut stream = Reassembler::with_config(unpacker, store, config)?;
    io::copy(&mut stream, &mut output).map_err(TarSplitError::from_io_owned)?;
    output.flush()?;

    let stats = stream.stats();
    info!(
        "Reassembled {} bytes from {} files and {} segments",
        stats.bytes, stats.files, stats.segments
    );
    if stats.mismatches > 0 {
        warn!("{} files did not match their recorded checksum", stats.mismatches);
    }
    Ok(stats)
}
