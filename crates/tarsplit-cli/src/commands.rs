//! Subcommand implementations

use crate::cli::{AsmArgs, ChecksizeArgs, DisasmArgs, duplicate_policy};
use anyhow::{Context, Result, bail};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tarsplit::{
    ChecksumPolicy, CodecConfig, ContentStore, DirStore, DiscardStore, DisassemblyConfig,
    DuplicatePolicy, JsonPacker, JsonUnpacker, ReassemblyConfig, TreeStore,
    disassemble_with_config, reassemble_with_config,
};
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a file, or stdin for `-`.
fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Transparently gunzip input that starts with the gzip magic.
fn decompressed(mut reader: Box<dyn BufRead>) -> Result<Box<dyn Read>> {
    if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
        debug!("Input is gzip-compressed");
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(reader)
    }
}

pub fn disasm(args: &DisasmArgs) -> Result<()> {
    let policy = duplicate_policy(args.allow_duplicates);
    let input = decompressed(open_input(&args.input)?)?;

    let metadata = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let encoder = GzEncoder::new(BufWriter::new(metadata), Compression::default());
    let codec = CodecConfig::new()
        .with_duplicate_policy(policy)
        .with_flush_each_entry(false);
    let mut packer = JsonPacker::with_config(encoder, codec)?;

    let store: Box<dyn ContentStore> = match &args.store {
        Some(dir) => Box::new(DirStore::new(dir)?),
        None => {
            info!("No --store given, file content will be discarded");
            Box::new(DiscardStore::new())
        }
    };

    let output: Box<dyn Write> = if args.no_stdout {
        Box::new(io::sink())
    } else {
        Box::new(io::stdout().lock())
    };

    let config = DisassemblyConfig::new().with_duplicate_policy(policy);
    let stats = disassemble_with_config(input, &mut packer, &store, output, config)?;

    packer.into_inner()?.finish()?.flush()?;
    info!(
        "Wrote {} metadata entries for {} files to {}",
        stats.files + stats.segments,
        stats.files,
        args.output.display()
    );
    Ok(())
}

pub fn asm(args: &AsmArgs) -> Result<()> {
    let metadata = decompressed(open_input(&args.input)?)?;
    let codec = CodecConfig::new().with_duplicate_policy(duplicate_policy(args.allow_duplicates));
    let unpacker = JsonUnpacker::with_config(BufReader::new(metadata), codec)?;

    let store: Box<dyn ContentStore> = match (&args.store, &args.path) {
        (Some(dir), _) => {
            if !dir.is_dir() {
                bail!("store directory {} does not exist", dir.display());
            }
            Box::new(DirStore::new(dir)?)
        }
        (None, Some(root)) => Box::new(TreeStore::new(root)),
        (None, None) => bail!("either --store or --path is required"),
    };

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let policy = args.verify.map_or(ChecksumPolicy::Ignore, ChecksumPolicy::from);
    let config = ReassemblyConfig::new().with_checksum_policy(policy);

    let stats = if args.compress {
        let mut encoder = GzEncoder::new(output, Compression::default());
        let stats = reassemble_with_config(unpacker, &store, &mut encoder, config)?;
        encoder.finish()?.flush()?;
        stats
    } else {
        reassemble_with_config(unpacker, &store, output, config)?
    };

    if stats.mismatches > 0 {
        bail!(
            "{} files did not match their recorded checksums",
            stats.mismatches
        );
    }
    Ok(())
}

/// Sizes reported by `checksize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeReport {
    pub archive_bytes: u64,
    pub files: u64,
    pub metadata_bytes: u64,
    pub compressed_bytes: u64,
}

pub fn measure(path: &Path) -> Result<SizeReport> {
    let input = decompressed(open_input(path)?)?;
    let codec = CodecConfig::new()
        .with_duplicate_policy(DuplicatePolicy::Allow)
        .with_flush_each_entry(false);
    let mut packer = JsonPacker::with_config(Vec::new(), codec)?;

    let config = DisassemblyConfig::new().with_duplicate_policy(DuplicatePolicy::Allow);
    let stats =
        disassemble_with_config(input, &mut packer, DiscardStore::new(), io::sink(), config)?;
    let metadata = packer.into_inner()?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&metadata)?;
    let compressed = encoder.finish()?;

    Ok(SizeReport {
        archive_bytes: stats.bytes,
        files: stats.files,
        metadata_bytes: metadata.len() as u64,
        compressed_bytes: compressed.len() as u64,
    })
}

pub fn checksize(args: &ChecksizeArgs) -> Result<()> {
    for path in &args.inputs {
        let report = measure(path)?;
        println!(
            "inspecting {} (size {}k)",
            path.display(),
            report.archive_bytes / 1024
        );
        println!(" -- number of files: {}", report.files);
        println!(
            " -- size of metadata uncompressed: {}k",
            report.metadata_bytes / 1024
        );
        println!(
            " -- size of gzip compressed metadata: {}k",
            report.compressed_bytes / 1024
        );
    }
    Ok(())
}
