//! Read-only store over an extracted archive tree
//!
//! Lets reassembly pull file bodies from a directory the archive was
//! unpacked into, so the content does not need to be stored twice.

use super::{ContentReader, ContentSink, ContentStore, StoreError, StoreResult};
use crate::entry::{clean_name, display_key};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Content store resolving keys as paths relative to a root directory.
#[derive(Debug, Clone)]
pub struct TreeStore {
    root: PathBuf,
}

impl TreeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path `key` resolves to, or `None` if it names the root itself or
    /// would escape it.
    pub fn resolve(&self, key: &[u8]) -> Option<PathBuf> {
        let cleaned = clean_name(key);
        let relative = cleaned.strip_prefix(b"/").unwrap_or(&cleaned);

        if relative.is_empty()
            || relative == b"."
            || relative == b".."
            || relative.starts_with(b"../")
        {
            return None;
        }

        relative_path(relative).map(|path| self.root.join(path))
    }
}

#[cfg(unix)]
fn relative_path(bytes: &[u8]) -> Option<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    Some(PathBuf::from(OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn relative_path(bytes: &[u8]) -> Option<PathBuf> {
    std::str::from_utf8(bytes).ok().map(PathBuf::from)
}

impl ContentStore for TreeStore {
    fn create(&self, key: &[u8]) -> StoreResult<Box<dyn ContentSink>> {
        Err(StoreError::ReadOnly(display_key(key)))
    }

    fn get(&self, key: &[u8]) -> StoreResult<ContentReader> {
        let path = self.resolve(key).ok_or_else(|| StoreError::not_found(key))?;
        trace!("Tree store open {}", path.display());

        match File::open(&path) {
            Ok(file) => {
                if !file.metadata()?.is_file() {
                    return Err(StoreError::not_found(key));
                }
                Ok(Box::new(BufReader::new(file)))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StoreError::not_found(key)),
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}
