//! Command-line arguments

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tarsplit::{ChecksumPolicy, DuplicatePolicy};

/// Split tar streams into metadata and content, and put them back together
#[derive(Debug, Parser)]
#[command(name = "tar-split", version, about)]
pub struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Disassemble a tar stream, passing it through to stdout
    #[command(alias = "d")]
    Disasm(DisasmArgs),

    /// Reassemble a tar stream from metadata and content
    #[command(alias = "a")]
    Asm(AsmArgs),

    /// Report the metadata size an archive would produce
    Checksize(ChecksizeArgs),
}

#[derive(Debug, Args)]
pub struct DisasmArgs {
    /// Tar archive to read, `-` for stdin. Gzip input is detected.
    pub input: PathBuf,

    /// Where to write the gzip-compressed metadata
    #[arg(short, long, default_value = "tar-data.json.gz")]
    pub output: PathBuf,

    /// Directory store for file content; content is discarded without one
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Do not copy the archive to stdout
    #[arg(long)]
    pub no_stdout: bool,

    /// Accept archives that contain the same path twice
    #[arg(long)]
    pub allow_duplicates: bool,
}

#[derive(Debug, Args)]
pub struct AsmArgs {
    /// Gzip-compressed metadata written by `disasm`
    #[arg(short, long, default_value = "tar-data.json.gz")]
    pub input: PathBuf,

    /// Directory store written by `disasm --store`
    #[arg(long, conflicts_with = "path", required_unless_present = "path")]
    pub store: Option<PathBuf>,

    /// Directory the archive was extracted into
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Output file, stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Gzip the reassembled archive
    #[arg(long)]
    pub compress: bool,

    /// Re-hash file content and report or abort on mismatches
    #[arg(long, value_enum)]
    pub verify: Option<VerifyMode>,

    /// Accept metadata that contains the same path twice
    #[arg(long)]
    pub allow_duplicates: bool,
}

#[derive(Debug, Args)]
pub struct ChecksizeArgs {
    /// Tar archives to inspect
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerifyMode {
    Report,
    Abort,
}

impl From<VerifyMode> for ChecksumPolicy {
    fn from(mode: VerifyMode) -> Self {
        match mode {
            VerifyMode::Report => Self::Report,
            VerifyMode::Abort => Self::Abort,
        }
    }
}

pub const fn duplicate_policy(allow: bool) -> DuplicatePolicy {
    if allow {
        DuplicatePolicy::Allow
    } else {
        DuplicatePolicy::Reject
    }
}
