//! Metadata stream encoding
//!
//! A [`Packer`] appends entries to a metadata stream in call order and an
//! [`Unpacker`] yields them back lazily in the same order. The JSON lines
//! implementation lives in [`json`]; other encodings only need to implement
//! these two traits.

pub mod json;

pub use json::{JsonPacker, JsonUnpacker};

use crate::config::DuplicatePolicy;
use crate::entry::{Entry, clean_name, display_key};
use crate::error::{TarSplitError, TarSplitResult};
use std::collections::HashSet;

/// Sink for metadata entries
pub trait Packer {
    /// Append `entry`, returning its 0-based position in the stream.
    fn add_entry(&mut self, entry: Entry) -> TarSplitResult<u64>;

    /// Duplicate handling this packer enforces by itself, if any.
    fn duplicate_policy(&self) -> Option<DuplicatePolicy> {
        None
    }
}

/// Source of metadata entries
pub trait Unpacker {
    /// Next entry in written order, or `None` once the stream is exhausted.
    fn next_entry(&mut self) -> TarSplitResult<Option<Entry>>;
}

impl<P: Packer + ?Sized> Packer for &mut P {
    fn add_entry(&mut self, entry: Entry) -> TarSplitResult<u64> {
        (**self).add_entry(entry)
    }

    fn duplicate_policy(&self) -> Option<DuplicatePolicy> {
        (**self).duplicate_policy()
    }
}

impl<P: Packer + ?Sized> Packer for Box<P> {
    fn add_entry(&mut self, entry: Entry) -> TarSplitResult<u64> {
        (**self).add_entry(entry)
    }

    fn duplicate_policy(&self) -> Option<DuplicatePolicy> {
        (**self).duplicate_policy()
    }
}

impl<U: Unpacker + ?Sized> Unpacker for &mut U {
    fn next_entry(&mut self) -> TarSplitResult<Option<Entry>> {
        (**self).next_entry()
    }
}

impl<U: Unpacker + ?Sized> Unpacker for Box<U> {
    fn next_entry(&mut self) -> TarSplitResult<Option<Entry>> {
        (**self).next_entry()
    }
}

/// In-memory packer, mostly useful in tests and for inspecting what a
/// disassembly produced.
impl Packer for Vec<Entry> {
    fn add_entry(&mut self, entry: Entry) -> TarSplitResult<u64> {
        self.push(entry);
        Ok(self.len() as u64 - 1)
    }
}

/// Unpacker over entries already in memory.
impl<I: Iterator<Item = Entry>> Unpacker for std::iter::Fuse<I> {
    fn next_entry(&mut self) -> TarSplitResult<Option<Entry>> {
        Ok(self.next())
    }
}

/// Tracks cleaned file names to detect duplicates.
#[derive(Debug, Default)]
pub struct DuplicateTracker {
    policy: DuplicatePolicy,
    seen: HashSet<Vec<u8>>,
}

impl DuplicateTracker {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            seen: HashSet::new(),
        }
    }

    pub const fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Record `name`, failing if its cleaned form was already seen and the
    /// policy rejects duplicates.
    pub fn check(&mut self, name: &[u8]) -> TarSplitResult<()> {
        if self.policy == DuplicatePolicy::Allow {
            return Ok(());
        }
        if self.seen.insert(clean_name(name)) {
            Ok(())
        } else {
            Err(TarSplitError::DuplicatePath(display_key(name)))
        }
    }

    /// Check the entry if it is a file; segments always pass.
    pub fn check_entry(&mut self, entry: &Entry) -> TarSplitResult<()> {
        match entry.effective_name() {
            Some(name) => self.check(name),
            None => Ok(()),
        }
    }
}
