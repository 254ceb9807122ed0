//! Directory-backed content store
//!
//! Each key becomes one file under the store root. Keys are arbitrary bytes,
//! so file names are the hex encoding of the key, split into components of
//! at most [`HEX_COMPONENT_LEN`] characters to stay below file name length
//! limits. Content is written to a temporary sibling and renamed into place
//! on commit, so readers never observe a partial file.

use super::{ContentReader, ContentSink, ContentStore, StoreError, StoreResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Maximum hex characters per path component.
pub const HEX_COMPONENT_LEN: usize = 128;

const CONTENT_EXTENSION: &str = "content";

/// Content store keeping one file per key under a root directory.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("Directory store at {}", root.display());
        Ok(Self {
            root,
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the file holding `key`.
    pub fn path_for(&self, key: &[u8]) -> PathBuf {
        let encoded = hex::encode(key);
        let mut path = self.root.clone();

        let mut rest = encoded.as_str();
        while rest.len() > HEX_COMPONENT_LEN {
            let (component, tail) = rest.split_at(HEX_COMPONENT_LEN);
            path.push(component);
            rest = tail;
        }
        path.push(format!("{rest}.{CONTENT_EXTENSION}"));
        path
    }

    fn temp_path_for(&self, final_path: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        final_path.with_extension(format!("{}.{n}.tmp", std::process::id()))
    }
}

impl ContentStore for DirStore {
    fn create(&self, key: &[u8]) -> StoreResult<Box<dyn ContentSink>> {
        let final_path = self.path_for(key);
        let temp_path = self.temp_path_for(&final_path);

        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::write(key, source))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|source| StoreError::write(key, source))?;

        Ok(Box::new(DirSink {
            writer: Some(BufWriter::new(file)),
            temp_path,
            final_path,
        }))
    }

    fn get(&self, key: &[u8]) -> StoreResult<ContentReader> {
        match File::open(self.path_for(key)) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StoreError::not_found(key)),
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}

struct DirSink {
    writer: Option<BufWriter<File>>,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl Write for DirSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::other("sink already committed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl ContentSink for DirSink {
    fn commit(mut self: Box<Self>) -> io::Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let result = writer
            .into_inner()
            .map_err(io::IntoInnerError::into_error)
            .and_then(|file| file.sync_all())
            .and_then(|()| fs::rename(&self.temp_path, &self.final_path));

        if result.is_err() {
            let _ = fs::remove_file(&self.temp_path);
        }
        result
    }
}

impl Drop for DirSink {
    fn drop(&mut self) {
        // Abandoned before commit
        if self.writer.take().is_some()
            && let Err(err) = fs::remove_file(&self.temp_path)
        {
            warn!(
                "Failed to remove abandoned temp file {}: {err}",
                self.temp_path.display()
            );
        }
    }
}
