//! Disassembly stream
//!
//! [`Disassembler`] wraps a reader over a tar archive and yields exactly the
//! bytes it reads. While doing so it records header, padding and trailer
//! bytes as segment entries and streams every member's content into a
//! [`ContentStore`], recording a file entry with its size and checksum.
//!
//! Reading the stream to exhaustion is what completes the metadata. A caller
//! that stops early gets correct partial bytes and incomplete metadata;
//! [`Disassembler::is_complete`] reports which case applies.

use crate::checksum::Checksum;
use crate::codec::{DuplicateTracker, Packer};
use crate::config::{DisassemblyConfig, DuplicatePolicy};
use crate::entry::{Entry, FileEntry, display_key};
use crate::error::{TarSplitError, TarSplitResult};
use crate::store::{ContentStore, ContentWriter, StoreError};
use crate::tar::{BLOCK_SIZE, Block, Extension, HeaderScanner, padding};
use std::io::{self, Read, Write};
use std::mem;
use tracing::{debug, info, trace, warn};

/// Upstream read size outside of file content.
const CHUNK_SIZE: usize = 8 * 1024;

/// Counters describing a disassembly pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisassemblyStats {
    /// Bytes returned to the caller
    pub bytes: u64,
    /// Segment entries written
    pub segments: u64,
    /// File entries written, including zero-size ones
    pub files: u64,
    /// Files whose content went to the store
    pub stored_files: u64,
    /// Content bytes written to the store
    pub content_bytes: u64,
}

enum State {
    /// Expecting a header block
    Header,
    /// Zero padding after file or extension content
    Padding { remaining: u64 },
    /// Content of a long name or PAX member, kept in the segment
    Extension {
        kind: Extension,
        remaining: u64,
        content: Vec<u8>,
        padding: u64,
    },
    /// File content being streamed to the store
    Content(ContentState),
    /// Everything left is segment bytes
    PassThrough,
    Done,
    Failed(String),
}

struct ContentState {
    name: Vec<u8>,
    size: u64,
    remaining: u64,
    writer: ContentWriter,
}

/// Why a step could not complete.
enum StepError {
    /// The upstream reader failed; nothing was consumed and the read can be
    /// retried.
    Upstream(io::Error),
    /// The stream cannot continue.
    Fatal(TarSplitError),
}

impl From<TarSplitError> for StepError {
    fn from(err: TarSplitError) -> Self {
        Self::Fatal(err)
    }
}

impl From<StoreError> for StepError {
    fn from(err: StoreError) -> Self {
        Self::Fatal(err.into())
    }
}

type StepResult<T> = Result<T, StepError>;

fn read_upstream<R: Read>(reader: &mut R, buf: &mut [u8]) -> StepResult<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(StepError::Upstream(err)),
        }
    }
}

/// Read adapter that splits a tar stream into metadata and stored content
pub struct Disassembler<R, P, S> {
    reader: R,
    packer: P,
    store: S,
    config: DisassemblyConfig,
    scanner: HeaderScanner,
    duplicates: DuplicateTracker,
    state: State,
    block: Box<[u8; BLOCK_SIZE]>,
    block_len: usize,
    /// Bytes consumed from upstream and recorded, not yet returned
    outbox: Vec<u8>,
    outbox_pos: usize,
    /// Pending segment bytes
    segment: Vec<u8>,
    stats: DisassemblyStats,
}

impl<R: Read, P: Packer, S: ContentStore> Disassembler<R, P, S> {
    /// Create a stream with the default configuration.
    pub fn new(reader: R, packer: P, store: S) -> Self {
        let config = DisassemblyConfig::default();
        Self {
            reader,
            packer,
            store,
            scanner: HeaderScanner::new(config.max_extension_size),
            duplicates: DuplicateTracker::new(config.duplicate_policy),
            config,
            state: State::Header,
            block: Box::new([0u8; BLOCK_SIZE]),
            block_len: 0,
            outbox: Vec::with_capacity(CHUNK_SIZE),
            outbox_pos: 0,
            segment: Vec::new(),
            stats: DisassemblyStats::default(),
        }
    }

    /// Create a stream with an explicit configuration.
    ///
    /// Fails if the configuration is invalid, or if it allows duplicate paths
    /// while `packer` rejects them: the packer would only see the duplicate
    /// after its content had replaced the first file's in the store.
    pub fn with_config(
        reader: R,
        packer: P,
        store: S,
        config: DisassemblyConfig,
    ) -> TarSplitResult<Self> {
        config
            .validate()
            .map_err(TarSplitError::InvalidConfiguration)?;
        if config.duplicate_policy == DuplicatePolicy::Allow
            && packer.duplicate_policy() == Some(DuplicatePolicy::Reject)
        {
            return Err(TarSplitError::InvalidConfiguration(
                "packer rejects duplicate paths that the disassembly allows".to_string(),
            ));
        }
        Ok(Self {
            scanner: HeaderScanner::new(config.max_extension_size),
            duplicates: DuplicateTracker::new(config.duplicate_policy),
            config,
            ..Self::new(reader, packer, store)
        })
    }

    /// True once the input has been read to its end and every entry has
    /// been handed to the packer.
    pub const fn is_complete(&self) -> bool {
        matches!(self.state, State::Done)
    }

    pub const fn stats(&self) -> DisassemblyStats {
        self.stats
    }

    pub fn packer(&self) -> &P {
        &self.packer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (R, P, S) {
        (self.reader, self.packer, self.store)
    }

    /// Record consumed bytes as both caller output and segment data.
    fn keep(&mut self, bytes: &[u8]) {
        self.outbox.extend_from_slice(bytes);
        self.segment.extend_from_slice(bytes);
    }

    /// Consume the next region that is not file content into the outbox.
    fn advance(&mut self) -> StepResult<()> {
        match &mut self.state {
            State::Header => self.scan_header(),
            State::Padding { remaining } => {
                let mut buf = [0u8; BLOCK_SIZE];
                let want = buf.len().min(usize::try_from(*remaining).unwrap_or(BLOCK_SIZE));
                let n = read_upstream(&mut self.reader, &mut buf[..want])?;
                if n == 0 {
                    return self.finish();
                }
                *remaining -= n as u64;
                if *remaining == 0 {
                    self.state = State::Header;
                }
                self.keep(&buf[..n]);
                Ok(())
            }
            State::Extension {
                kind,
                remaining,
                content,
                padding,
            } => {
                let mut buf = [0u8; CHUNK_SIZE];
                let want = buf.len().min(usize::try_from(*remaining).unwrap_or(CHUNK_SIZE));
                let n = read_upstream(&mut self.reader, &mut buf[..want])?;
                if n == 0 {
                    warn!("Input ends inside an extension header");
                    return self.finish();
                }
                content.extend_from_slice(&buf[..n]);
                *remaining -= n as u64;
                if *remaining == 0 {
                    let padding = *padding;
                    self.scanner.apply_extension(*kind, content);
                    self.state = match padding {
                        0 => State::Header,
                        remaining => State::Padding { remaining },
                    };
                }
                self.keep(&buf[..n]);
                Ok(())
            }
            State::PassThrough => {
                let mut buf = [0u8; CHUNK_SIZE];
                let n = read_upstream(&mut self.reader, &mut buf)?;
                if n == 0 {
                    return self.finish();
                }
                self.keep(&buf[..n]);
                if self.segment.len() >= self.config.max_segment_size {
                    self.flush_segment()?;
                }
                Ok(())
            }
            State::Content(_) | State::Done | State::Failed(_) => Ok(()),
        }
    }

    fn scan_header(&mut self) -> StepResult<()> {
        while self.block_len < BLOCK_SIZE {
            let n = read_upstream(&mut self.reader, &mut self.block[self.block_len..])?;
            if n == 0 {
                break;
            }
            self.block_len += n;
        }

        let len = mem::take(&mut self.block_len);
        let block = *self.block;
        self.keep(&block[..len]);

        if len == 0 {
            return self.finish();
        }
        if len < BLOCK_SIZE {
            warn!("Input ends inside a header ({len} of {BLOCK_SIZE} bytes)");
            return self.finish();
        }

        match self.scanner.classify(&block) {
            Block::EndOfArchive => {
                debug!("End-of-archive marker after {} bytes", self.stats.bytes);
                self.state = State::PassThrough;
            }
            Block::Malformed(reason) => {
                warn!("Unreadable header ({reason}), keeping the rest of the input as raw bytes");
                self.state = State::PassThrough;
            }
            Block::Extension { kind, size } => {
                trace!("Extension header {kind:?} with {size} bytes");
                self.state = match size {
                    0 => State::Header,
                    size => State::Extension {
                        kind,
                        remaining: size,
                        content: Vec::with_capacity(usize::try_from(size).unwrap_or(0)),
                        padding: padding(size),
                    },
                };
            }
            Block::Member { name, size } => self.begin_member(name, size)?,
        }
        Ok(())
    }

    fn begin_member(&mut self, name: Vec<u8>, size: u64) -> StepResult<()> {
        self.duplicates.check(&name)?;
        self.flush_segment()?;

        if size == 0 {
            debug!("Empty member {}", display_key(&name));
            self.add_file(FileEntry::from_name_bytes(&name, 0, Checksum::EMPTY))?;
            self.state = State::Header;
            return Ok(());
        }

        debug!("Member {} with {size} content bytes", display_key(&name));
        let writer = ContentWriter::new(&name, self.store.create(&name)?);
        self.state = State::Content(ContentState {
            name,
            size,
            remaining: size,
            writer,
        });
        Ok(())
    }

    fn read_content(&mut self, buf: &mut [u8]) -> StepResult<usize> {
        let State::Content(content) = &mut self.state else {
            return Ok(0);
        };

        let want = buf.len().min(usize::try_from(content.remaining).unwrap_or(usize::MAX));
        let n = read_upstream(&mut self.reader, &mut buf[..want])?;
        if n == 0 {
            return Err(StepError::Fatal(TarSplitError::TruncatedInput {
                name: display_key(&content.name),
                expected: content.size,
                actual: content.size - content.remaining,
            }));
        }

        content
            .writer
            .write_all(&buf[..n])
            .map_err(|source| StoreError::write(&content.name, source))?;
        content.remaining -= n as u64;
        trace!("Forwarded {n} content bytes, {} left", content.remaining);

        if content.remaining == 0 {
            self.complete_member()?;
        }
        Ok(n)
    }

    fn complete_member(&mut self) -> StepResult<()> {
        let State::Content(content) = mem::replace(&mut self.state, State::Header) else {
            return Ok(());
        };

        let (size, checksum) = content.writer.finish()?;
        self.stats.stored_files += 1;
        self.stats.content_bytes += size;
        self.add_file(FileEntry::from_name_bytes(&content.name, size, checksum))?;

        let pad = padding(size);
        if pad > 0 {
            self.state = State::Padding { remaining: pad };
        }
        Ok(())
    }

    fn add_file(&mut self, entry: FileEntry) -> StepResult<()> {
        self.packer.add_entry(Entry::File(entry))?;
        self.stats.files += 1;
        Ok(())
    }

    fn flush_segment(&mut self) -> StepResult<()> {
        if self.segment.is_empty() {
            return Ok(());
        }
        let segment = mem::take(&mut self.segment);
        trace!("Segment of {} bytes", segment.len());
        self.packer.add_entry(Entry::Segment(segment))?;
        self.stats.segments += 1;
        Ok(())
    }

    fn finish(&mut self) -> StepResult<()> {
        self.flush_segment()?;
        self.state = State::Done;
        debug!(
            "Disassembly complete: {} bytes, {} files, {} segments",
            self.stats.bytes, self.stats.files, self.stats.segments
        );
        Ok(())
    }

    fn fail(&mut self, err: TarSplitError) -> io::Error {
        warn!("Disassembly failed: {err}");
        self.state = State::Failed(err.to_string());
        self.outbox.clear();
        self.outbox_pos = 0;
        err.into()
    }
}

impl<R: Read, P: Packer, S: ContentStore> Read for Disassembler<R, P, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.outbox_pos < self.outbox.len() {
                let pending = &self.outbox[self.outbox_pos..];
                let n = pending.len().min(buf.len());
                buf[..n].copy_from_slice(&pending[..n]);
                self.outbox_pos += n;
                self.stats.bytes += n as u64;
                return Ok(n);
            }
            self.outbox.clear();
            self.outbox_pos = 0;

            let step = match &self.state {
                State::Done => return Ok(0),
                State::Failed(reason) => {
                    return Err(io::Error::other(format!(
                        "disassembly stream already failed: {reason}"
                    )));
                }
                State::Content(_) => match self.read_content(buf) {
                    Ok(n) => {
                        self.stats.bytes += n as u64;
                        return Ok(n);
                    }
                    Err(err) => Err(err),
                },
                _ => self.advance(),
            };

            match step {
                Ok(()) => {}
                Err(StepError::Upstream(err)) => return Err(err),
                Err(StepError::Fatal(err)) => return Err(self.fail(err)),
            }
        }
    }
}

/// Run a disassembly to completion, copying the archive bytes to `output`.
pub fn disassemble<R, P, S, W>(
    reader: R,
    packer: P,
    store: S,
    output: W,
) -> TarSplitResult<DisassemblyStats>
where
    R: Read,
    P: Packer,
    S: ContentStore,
    W: Write,
{
    disassemble_with_config(reader, packer, store, output, DisassemblyConfig::default())
}

/// [`disassemble`] with an explicit configuration.
pub fn disassemble_with_config<R, P, S, W>(
    reader: R,
    packer: P,
    store: S,
    mut output: W,
    config: DisassemblyConfig,
) -> TarSplitResult<DisassemblyStats>
where
    R: Read,
    P: Packer,
    S: ContentStore,
    W: Write,
{
    let mut stream = Disassembler::with_config(reader, packer, store, config)?;
    io::copy(&mut stream, &mut output).map_err(TarSplitError::from_io_owned)?;
    output.flush()?;

    let stats = stream.stats();
    info!(
        "Disassembled {} bytes: {} files ({} content bytes stored), {} segments",
        stats.bytes, stats.files, stats.content_bytes, stats.segments
    );
    Ok(stats)
}
