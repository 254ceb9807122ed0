//! End-to-end disassembly and reassembly through the JSON codec

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use common::{
    BLOCK, archive, join, join_with_config, member, metadata_lines, noise, split,
    split_with_config,
};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use tarsplit::{
    Checksum, ChecksumPolicy, CodecConfig, ContentStore, DirStore, DiscardStore, Disassembler,
    DisassemblyConfig, DuplicatePolicy, Entry, JsonPacker, JsonUnpacker, MemoryStore,
    Reassembler, ReassemblyConfig, TarSplitError, TreeStore, disassemble, reassemble,
};
use tempfile::TempDir;

#[test]
fn test_single_file_round_trip() {
    let input = archive(&[(b"./hurr.txt", b"imma hurr til I derp")]);
    let store = MemoryStore::new();

    let metadata = split(&input, &store);
    let records = metadata_lines(&metadata);

    // header segment, file, trailer segment
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["kind"], "segment");
    assert_eq!(records[1]["kind"], "file");
    assert_eq!(records[1]["name"], "./hurr.txt");
    assert_eq!(records[1]["size"], 20);
    assert_eq!(records[1]["checksum"], "AnSksavsa04=");
    assert_eq!(records[2]["kind"], "segment");
    for (position, record) in records.iter().enumerate() {
        assert_eq!(record["position"], position as u64);
    }

    assert_eq!(store.len(), 1);
    let mut stored = Vec::new();
    store
        .get(b"./hurr.txt")
        .unwrap()
        .read_to_end(&mut stored)
        .unwrap();
    assert_eq!(stored, b"imma hurr til I derp");

    assert_eq!(join(&metadata, &store), input);
}

#[test]
fn test_non_utf8_name_is_kept_exactly() {
    let name = [0x66, 0x69, 0x6c, 0x65, 0x2d, 0xe4];
    let input = archive(&[(&name, b"caf\xe9 con leche, por favor")]);
    let store = MemoryStore::new();

    let metadata = split(&input, &store);
    let records = metadata_lines(&metadata);
    assert_eq!(records[1]["name_raw"], "ZmlsZS3k");
    assert!(store.contains(&name));

    assert_eq!(join(&metadata, &store), input);
}

#[test]
fn test_empty_and_trailer_only_archives() {
    let store = MemoryStore::new();

    let metadata = split(b"", &store);
    assert!(metadata.is_empty());
    assert!(join(&metadata, &store).is_empty());

    let trailer = vec![0u8; 2 * BLOCK];
    let metadata = split(&trailer, &store);
    let records = metadata_lines(&metadata);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["kind"], "segment");
    assert_eq!(join(&metadata, &store), trailer);
    assert!(store.is_empty());
}

#[test]
fn test_header_only_members_store_nothing() {
    let mut input = Vec::new();
    input.extend(member(b"dir/", b"", b'5'));
    input.extend(member(b"dir/link", b"", b'2'));
    input.extend(member(b"dir/empty", b"", b'0'));
    input.extend_from_slice(&[0u8; 2 * BLOCK]);

    let store = MemoryStore::new();
    let (metadata, stats) =
        split_with_config(&input, &store, DisassemblyConfig::default()).unwrap();

    assert_eq!(stats.files, 3);
    assert_eq!(stats.stored_files, 0);
    assert!(store.is_empty());

    let files: Vec<_> = metadata_lines(&metadata)
        .into_iter()
        .filter(|record| record["kind"] == "file")
        .collect();
    assert_eq!(files.len(), 3);
    for file in files {
        assert_eq!(file["size"], 0);
        assert_eq!(file["checksum"], "AAAAAAAAAAA=");
    }

    // zero-size entries never touch the store, so an empty one is enough
    assert_eq!(join(&metadata, MemoryStore::new()), input);
}

#[test]
fn test_trailing_garbage_survives() {
    let mut input = archive(&[(b"a.txt", b"alpha"), (b"b.txt", b"beta")]);
    input.extend_from_slice(b"this is not tar data at all");
    input.extend(noise(3 * BLOCK + 17, 9));

    let store = MemoryStore::new();
    let metadata = split(&input, &store);
    assert_eq!(store.len(), 2);
    assert_eq!(join(&metadata, &store), input);
}

#[test]
fn test_truncated_content_is_an_error() {
    let input = archive(&[(b"big.bin", &noise(4000, 3))]);
    let truncated = &input[..BLOCK + 1000];

    let err = split_with_config(truncated, MemoryStore::new(), DisassemblyConfig::default())
        .unwrap_err();
    match err {
        TarSplitError::TruncatedInput {
            name,
            expected,
            actual,
        } => {
            assert_eq!(name, "big.bin");
            assert_eq!(expected, 4000);
            assert_eq!(actual, 1000);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_names() {
    let input = archive(&[(b"same", b"first"), (b"./same", b"secnd")]);
    let err = split_with_config(&input, MemoryStore::new(), DisassemblyConfig::default())
        .unwrap_err();
    assert!(matches!(err, TarSplitError::DuplicatePath(_)));

    // Both entries map to one store key, so the second file's content
    // replaces the first. The rebuilt archive repeats the last body and
    // cannot match the input.
    let input = archive(&[(b"same", b"first"), (b"same", b"secnd")]);
    let store = MemoryStore::new();
    let config = DisassemblyConfig::new().with_duplicate_policy(DuplicatePolicy::Allow);
    let (metadata, stats) = split_with_config(&input, &store, config).unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(store.len(), 1);

    let mut stored = Vec::new();
    store.get(b"same").unwrap().read_to_end(&mut stored).unwrap();
    assert_eq!(stored, b"secnd");

    let codec = CodecConfig::new().with_duplicate_policy(DuplicatePolicy::Allow);
    let unpacker = JsonUnpacker::with_config(&metadata[..], codec).unwrap();
    let mut stream = Reassembler::with_config(
        unpacker,
        &store,
        ReassemblyConfig::new().with_checksum_policy(ChecksumPolicy::Report),
    )
    .unwrap();
    let mut rebuilt = Vec::new();
    stream.read_to_end(&mut rebuilt).unwrap();

    assert_eq!(rebuilt, archive(&[(b"same", b"secnd"), (b"same", b"secnd")]));
    match stream.mismatches() {
        [
            TarSplitError::ChecksumMismatch {
                name,
                expected,
                actual,
            },
        ] => {
            assert_eq!(name, "same");
            assert_eq!(*expected, Checksum::compute(b"first"));
            assert_eq!(*actual, Checksum::compute(b"secnd"));
        }
        other => panic!("unexpected mismatches: {other:?}"),
    }
}

#[test]
fn test_missing_content_fails_reassembly() {
    let input = archive(&[(b"a.txt", b"alpha")]);
    let metadata = split(&input, DiscardStore::new());

    let err = join_with_config(&metadata, MemoryStore::new(), ReassemblyConfig::default())
        .unwrap_err();
    match err {
        TarSplitError::MissingContent {
            name,
            expected,
            actual,
        } => {
            assert_eq!(name, "a.txt");
            assert_eq!(expected, 5);
            assert_eq!(actual, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_checksum_policies_on_tampered_content() {
    let input = archive(&[(b"a.txt", b"alpha"), (b"b.txt", b"bravo")]);
    let store = MemoryStore::new();
    let metadata = split(&input, &store);
    store.put(b"a.txt", &mut &b"ALPHA"[..]).unwrap();

    let (rebuilt, stats) =
        join_with_config(&metadata, &store, ReassemblyConfig::default()).unwrap();
    assert_eq!(stats.mismatches, 0);
    assert_ne!(rebuilt, input);

    let report = ReassemblyConfig::new().with_checksum_policy(ChecksumPolicy::Report);
    let (_, stats) = join_with_config(&metadata, &store, report).unwrap();
    assert_eq!(stats.mismatches, 1);

    let abort = ReassemblyConfig::new().with_checksum_policy(ChecksumPolicy::Abort);
    let err = join_with_config(&metadata, &store, abort).unwrap_err();
    match err {
        TarSplitError::ChecksumMismatch {
            name,
            expected,
            actual,
        } => {
            assert_eq!(name, "a.txt");
            assert_eq!(expected, Checksum::compute(b"alpha"));
            assert_eq!(actual, Checksum::compute(b"ALPHA"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_disassembly_is_deterministic() {
    let input = archive(&[
        (b"one", &noise(700, 1)),
        (b"two", &noise(70_000, 2)),
        (b"three", b""),
    ]);

    let first = split(&input, MemoryStore::new());
    let second = split(&input, MemoryStore::new());
    assert_eq!(first, second);

    let store = MemoryStore::new();
    let metadata = split(&input, &store);
    assert_eq!(join(&metadata, &store), join(&metadata, &store));
}

#[test]
fn test_small_reads_through_the_stream() {
    let input = archive(&[(b"x", &noise(5000, 4)), (b"y", b"why")]);
    let store = MemoryStore::new();
    let mut entries: Vec<Entry> = Vec::new();

    let mut stream = Disassembler::new(&input[..], &mut entries, &store);
    let mut copy = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        copy.extend_from_slice(&buf[..n]);
    }
    assert!(stream.is_complete());
    drop(stream);

    assert_eq!(copy, input);
    let mut rebuilt = Vec::new();
    reassemble(entries.into_iter().fuse(), &store, &mut rebuilt).unwrap();
    assert_eq!(rebuilt, input);
}

#[test]
fn test_gzip_upstream() {
    let input = archive(&[(b"zipped.txt", &noise(20_000, 5))]);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&input).unwrap();
    let compressed = encoder.finish().unwrap();

    let store = MemoryStore::new();
    let mut packer = JsonPacker::new(Vec::new());
    disassemble(GzDecoder::new(&compressed[..]), &mut packer, &store, io::sink())
        .unwrap();
    let metadata = packer.into_inner().unwrap();

    assert_eq!(join(&metadata, &store), input);
}

#[test]
fn test_large_stream_through_directory_store() {
    let temp_dir = TempDir::new().expect("Operation should succeed");
    let store = DirStore::new(temp_dir.path().join("content")).unwrap();

    let files: Vec<(String, Vec<u8>)> = (0..3u64)
        .map(|i| (format!("blobs/part-{i}.bin"), noise(8 * 1024 * 1024 + 123, i + 10)))
        .collect();
    let borrowed: Vec<(&[u8], &[u8])> = files
        .iter()
        .map(|(name, content)| (name.as_bytes(), content.as_slice()))
        .collect();
    let input = archive(&borrowed);

    let (metadata, stats) =
        split_with_config(&input, &store, DisassemblyConfig::default()).unwrap();
    assert_eq!(stats.stored_files, 3);
    assert!(metadata.len() < 64 * 1024);

    let reopened = DirStore::new(temp_dir.path().join("content")).unwrap();
    let rebuilt = join(&metadata, &reopened);
    assert_eq!(rebuilt.len(), input.len());
    assert_eq!(Sha256::digest(&rebuilt), Sha256::digest(&input));
}

#[test]
fn test_reassemble_from_extracted_tree() {
    let temp_dir = TempDir::new().expect("Operation should succeed");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("etc")).unwrap();
    fs::write(root.join("etc/hosts"), b"127.0.0.1 localhost\n").unwrap();
    fs::write(root.join("README"), b"read me").unwrap();

    let mut input = Vec::new();
    input.extend(member(b"./etc/", b"", b'5'));
    input.extend(member(b"./etc/hosts", b"127.0.0.1 localhost\n", b'0'));
    input.extend(member(b"README", b"read me", b'0'));
    input.extend_from_slice(&[0u8; 2 * BLOCK]);

    let metadata = split(&input, DiscardStore::new());
    assert_eq!(join(&metadata, TreeStore::new(root)), input);
}
