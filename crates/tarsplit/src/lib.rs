//! Bit-exact disassembly and reassembly of tar archive streams
//!
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::needless_pass_by_value)] // Configuration types
//! A tar stream is split into two parts while it is being read:
//!
//! - a **metadata stream** of ordered [`Entry`] records: raw segments
//!   (headers, padding, the end-of-archive area and anything after it) and
//!   file entries naming content by key, size and CRC-64 checksum;
//! - a **content store** holding each file's body under its name.
//!
//! Replaying the metadata against the store reproduces the original archive
//! byte for byte, including headers this crate never interprets.
//!
//! # Flow
//!
//! ```text
//!  tar bytes ──► Disassembler ──► tar bytes (unchanged, to the caller)
//!                  │        │
//!               Packer   ContentStore
//!                  │        │
//!  tar bytes ◄── Reassembler ◄─┘
//!                  ▲
//!               Unpacker
//! ```
//!
//! # Example
//!
//! ```rust
//! use tarsplit::{
//!     JsonPacker, JsonUnpacker, MemoryStore, disassemble, reassemble,
//! };
//!
//! # fn main() -> Result<(), tarsplit::TarSplitError> {
//! # let archive: Vec<u8> = Vec::new();
//! let store = MemoryStore::new();
//!
//! let mut packer = JsonPacker::new(Vec::new());
//! disassemble(&archive[..], &mut packer, &store, std::io::sink())?;
//! let metadata = packer.into_inner()?;
//!
//! let mut rebuilt = Vec::new();
//! reassemble(JsonUnpacker::new(&metadata[..]), &store, &mut rebuilt)?;
//! assert_eq!(rebuilt, archive);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`entry`]: the entry model
//! - [`store`]: the content store contract and its backends
//! - [`codec`]: packer and unpacker traits and the JSON lines encoding
//! - [`disassemble`] / [`reassemble`]: the two streams
//! - [`tar`]: header scanning
//! - [`checksum`], [`config`], [`error`]

pub mod checksum;
pub mod codec;
pub mod config;
pub mod disassemble;
pub mod entry;
pub mod error;
pub mod reassemble;
pub mod store;
pub mod tar;

pub use checksum::{Checksum, ContentHasher};
pub use codec::{JsonPacker, JsonUnpacker, Packer, Unpacker};
pub use config::{
    ChecksumPolicy, CodecConfig, DisassemblyConfig, DuplicatePolicy, ReassemblyConfig,
};
pub use disassemble::{Disassembler, DisassemblyStats, disassemble, disassemble_with_config};
pub use entry::{Entry, EntryKind, FileEntry};
pub use error::{TarSplitError, TarSplitResult};
pub use reassemble::{Reassembler, ReassemblyStats, reassemble, reassemble_with_config};
pub use store::{
    ContentSink, ContentStore, ContentWriter, DirStore, DiscardStore, MemoryStore, StoreError,
    StoreResult, TreeStore,
};
