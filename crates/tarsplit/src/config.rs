//! Stream and codec configuration
//!
//! Each component takes a small serialisable configuration struct with
//! sensible defaults. Surrounding tooling may load these from any serde
//! format; constructors call `validate` and reject bad values with
//! [`TarSplitError::InvalidConfiguration`](crate::TarSplitError::InvalidConfiguration).

use serde::{Deserialize, Serialize};

/// Default upper bound for pending segment bytes (1 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 1024 * 1024;

/// Default upper bound for one extension header's content (1 MiB).
pub const DEFAULT_MAX_EXTENSION_SIZE: u64 = 1024 * 1024;

/// What to do when two file entries share a cleaned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with `DuplicatePath`.
    #[default]
    Reject,
    /// Accept the entry; the content store keeps the last write.
    Allow,
}

/// Whether reassembly re-hashes file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Replay bytes without hashing them.
    #[default]
    Ignore,
    /// Record mismatches and keep streaming.
    Report,
    /// Fail the read that completes a mismatching file.
    Abort,
}

impl ChecksumPolicy {
    pub const fn verifies(self) -> bool {
        !matches!(self, Self::Ignore)
    }
}

/// Disassembly stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisassemblyConfig {
    /// Duplicate name handling, applied before content reaches the store
    pub duplicate_policy: DuplicatePolicy,
    /// Pending segment bytes are flushed as their own entry beyond this size
    pub max_segment_size: usize,
    /// Extension headers (long names, PAX) larger than this end header
    /// parsing; the rest of the input is kept as raw segments
    pub max_extension_size: u64,
}

impl Default for DisassemblyConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Reject,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            max_extension_size: DEFAULT_MAX_EXTENSION_SIZE,
        }
    }
}

impl DisassemblyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = size;
        self
    }

    pub fn with_max_extension_size(mut self, size: u64) -> Self {
        self.max_extension_size = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_segment_size < crate::tar::BLOCK_SIZE {
            return Err(format!(
                "max_segment_size must be at least {} bytes",
                crate::tar::BLOCK_SIZE
            ));
        }

        if self.max_extension_size == 0 {
            return Err("max_extension_size must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Reassembly stream configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    pub checksum_policy: ChecksumPolicy,
}

impl ReassemblyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Metadata packer/unpacker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub duplicate_policy: DuplicatePolicy,
    /// Flush the writer after every record so a crash loses at most the tail
    pub flush_each_entry: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Reject,
            flush_each_entry: true,
        }
    }
}

impl CodecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_flush_each_entry(mut self, flush: bool) -> Self {
        self.flush_each_entry = flush;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
