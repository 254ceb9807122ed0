//! Shared archive builders and round-trip helpers for integration tests

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use tarsplit::{
    ContentStore, DisassemblyConfig, DisassemblyStats, JsonPacker, JsonUnpacker, ReassemblyConfig,
    ReassemblyStats, TarSplitResult, disassemble_with_config, reassemble_with_config,
};

pub const BLOCK: usize = 512;

/// Build a POSIX ustar header with a valid header checksum.
pub fn ustar_header(name: &[u8], size: u64, typeflag: u8) -> [u8; BLOCK] {
    let mut header = [0u8; BLOCK];
    header[..name.len()].copy_from_slice(name);
    header[100..108].copy_from_slice(b"0000644\0");
    header[108..116].copy_from_slice(b"0000000\0");
    header[116..124].copy_from_slice(b"0000000\0");
    header[124..136].copy_from_slice(format!("{size:011o}\0").as_bytes());
    header[136..148].copy_from_slice(b"14712345670\0");
    header[156] = typeflag;
    header[257..263].copy_from_slice(b"ustar\0");
    header[263..265].copy_from_slice(b"00");

    header[148..156].copy_from_slice(b"        ");
    let sum: u32 = header.iter().map(|&b| u32::from(b)).sum();
    header[148..156].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
    header
}

/// One member: header, content and zero padding to the block boundary.
pub fn member(name: &[u8], content: &[u8], typeflag: u8) -> Vec<u8> {
    let mut out = ustar_header(name, content.len() as u64, typeflag).to_vec();
    out.extend_from_slice(content);
    out.resize(out.len().next_multiple_of(BLOCK), 0);
    out
}

/// Regular files followed by the two-block end-of-archive marker.
pub fn archive(files: &[(&[u8], &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, content) in files {
        out.extend(member(name, content, b'0'));
    }
    out.extend_from_slice(&[0u8; 2 * BLOCK]);
    out
}

/// Deterministic filler so large fixtures do not compress to nothing.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 32) as u8
        })
        .collect()
}

/// Disassemble into JSON metadata, checking the pass-through copy.
pub fn split_with_config(
    archive: &[u8],
    store: impl ContentStore,
    config: DisassemblyConfig,
) -> TarSplitResult<(Vec<u8>, DisassemblyStats)> {
    let codec = tarsplit::CodecConfig::new().with_duplicate_policy(config.duplicate_policy);
    let mut packer = JsonPacker::with_config(Vec::new(), codec)?;
    let mut copy = Vec::new();
    let stats = disassemble_with_config(archive, &mut packer, store, &mut copy, config)?;
    assert_eq!(copy, archive, "pass-through bytes differ from input");
    Ok((packer.into_inner()?, stats))
}

pub fn split(archive: &[u8], store: impl ContentStore) -> Vec<u8> {
    split_with_config(archive, store, DisassemblyConfig::default())
        .unwrap()
        .0
}

pub fn join_with_config(
    metadata: &[u8],
    store: impl ContentStore,
    config: ReassemblyConfig,
) -> TarSplitResult<(Vec<u8>, ReassemblyStats)> {
    let mut rebuilt = Vec::new();
    let stats = reassemble_with_config(JsonUnpacker::new(metadata), store, &mut rebuilt, config)?;
    Ok((rebuilt, stats))
}

pub fn join(metadata: &[u8], store: impl ContentStore) -> Vec<u8> {
    join_with_config(metadata, store, ReassemblyConfig::default())
        .unwrap()
        .0
}

pub fn metadata_lines(metadata: &[u8]) -> Vec<serde_json::Value> {
    metadata
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect()
}
