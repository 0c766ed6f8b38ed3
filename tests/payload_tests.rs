//! Tests for setforge payload module

use setforge::payload::hash_files;
use setforge::{
    CompressionKind, Manifest, Payload, PayloadReader, PayloadWriter, StagedFile, PAYLOAD_MAGIC,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn manifest() -> Manifest {
    let toml = r#"
[package]
name = "demo"
version = "1.2.3"

[[files]]
source = "bin/*"
"#;
    Manifest::parse(toml).unwrap()
}

fn staged(dest: &str, contents: &[u8]) -> StagedFile {
    StagedFile {
        dest: dest.to_string(),
        contents: contents.to_vec(),
        mode: 0o644,
        keep_existing: false,
    }
}

/// Write a fake stub and append a payload to it
fn packed_exe(dir: &Path, payload: &Payload) -> PathBuf {
    let exe = dir.join("setup.bin");
    fs::write(&exe, b"STUB-EXECUTABLE-BYTES").unwrap();
    PayloadWriter::write(&exe, payload).unwrap();
    exe
}

// ============================================================================
// Roundtrip Tests
// ============================================================================

fn roundtrip(kind: CompressionKind, level: Option<i32>) {
    let tmp = TempDir::new().unwrap();
    let mut manifest = manifest();
    manifest.build.compression = kind;
    manifest.build.level = level;

    let files = vec![
        staged("bin/demo", b"#!/bin/sh\necho demo\n"),
        staged("data/config.toml", b"key = \"value\"\n"),
        staged("empty.dat", b""),
    ];
    let mut payload = Payload::new(manifest).with_files(files.clone());
    let hash = payload.compute_content_hash();

    let exe = packed_exe(tmp.path(), &payload);

    assert!(PayloadReader::is_packed(&exe).unwrap());
    let restored = PayloadReader::read(&exe).unwrap().unwrap();

    assert_eq!(restored.manifest.package.name, "demo");
    assert_eq!(restored.manifest.package.version, "1.2.3");
    assert_eq!(restored.content_hash, hash);
    assert_eq!(restored.files.len(), 3);
    for original in &files {
        let read = restored
            .files
            .iter()
            .find(|f| f.dest == original.dest)
            .unwrap();
        assert_eq!(read.contents, original.contents);
    }
    // The transported set hashes back to the stamped value
    assert_eq!(hash_files(&restored.files), hash);
}

#[test]
fn test_roundtrip_zstd() {
    roundtrip(CompressionKind::Zstd, Some(3));
}

#[test]
fn test_roundtrip_gzip() {
    roundtrip(CompressionKind::Gzip, Some(6));
}

#[test]
fn test_roundtrip_uncompressed() {
    roundtrip(CompressionKind::None, None);
}

#[test]
fn test_icon_travels_in_meta() {
    let tmp = TempDir::new().unwrap();
    let ico = vec![0u8, 1, 2, 3, 255];
    let mut payload = Payload::new(manifest())
        .with_files(vec![staged("bin/demo", b"x")])
        .with_icon(Some(ico.clone()));
    payload.compute_content_hash();

    let exe = packed_exe(tmp.path(), &payload);
    let meta = PayloadReader::read_meta(&exe).unwrap().unwrap();
    assert_eq!(meta.icon, Some(ico));
}

#[test]
fn test_keep_existing_travels() {
    let tmp = TempDir::new().unwrap();
    let mut keep = staged("etc/settings.toml", b"x = 1");
    keep.keep_existing = true;

    let mut payload =
        Payload::new(manifest()).with_files(vec![staged("bin/demo", b"bin"), keep]);
    payload.compute_content_hash();

    let exe = packed_exe(tmp.path(), &payload);

    let meta = PayloadReader::read_meta(&exe).unwrap().unwrap();
    assert_eq!(meta.keep_existing, vec!["etc/settings.toml"]);

    let restored = PayloadReader::read(&exe).unwrap().unwrap();
    let settings = restored
        .files
        .iter()
        .find(|f| f.dest == "etc/settings.toml")
        .unwrap();
    assert!(settings.keep_existing);
    let demo = restored.files.iter().find(|f| f.dest == "bin/demo").unwrap();
    assert!(!demo.keep_existing);
}

#[cfg(unix)]
#[test]
fn test_modes_travel_in_archive() {
    let tmp = TempDir::new().unwrap();
    let mut exec = staged("bin/demo", b"#!/bin/sh\n");
    exec.mode = 0o755;

    let mut payload = Payload::new(manifest()).with_files(vec![exec]);
    payload.compute_content_hash();

    let exe = packed_exe(tmp.path(), &payload);
    let restored = PayloadReader::read(&exe).unwrap().unwrap();
    assert_eq!(restored.files[0].mode, 0o755);
}

#[test]
fn test_long_destination_paths_roundtrip() {
    let tmp = TempDir::new().unwrap();
    // Deeper than the 100-byte name field of a bare tar header
    let deep = format!(
        "{}/{}/{}/app.bin",
        "a".repeat(60),
        "b".repeat(60),
        "c".repeat(60)
    );
    assert!(deep.len() > 100);

    let mut payload = Payload::new(manifest()).with_files(vec![staged(&deep, b"payload")]);
    payload.compute_content_hash();

    let exe = packed_exe(tmp.path(), &payload);
    let restored = PayloadReader::read(&exe).unwrap().unwrap();
    assert_eq!(restored.files.len(), 1);
    assert_eq!(restored.files[0].dest, deep);
    assert_eq!(restored.files[0].contents, b"payload");
}

// ============================================================================
// Detection Tests
// ============================================================================

#[test]
fn test_plain_files_are_not_packed() {
    let tmp = TempDir::new().unwrap();

    let plain = tmp.path().join("plain.bin");
    fs::write(&plain, b"just an ordinary executable image").unwrap();
    assert!(!PayloadReader::is_packed(&plain).unwrap());
    assert!(PayloadReader::read(&plain).unwrap().is_none());
    assert!(PayloadReader::read_meta(&plain).unwrap().is_none());
    assert!(PayloadReader::original_size(&plain).unwrap().is_none());

    // Shorter than the footer itself
    let tiny = tmp.path().join("tiny.bin");
    fs::write(&tiny, b"hi").unwrap();
    assert!(!PayloadReader::is_packed(&tiny).unwrap());
    assert!(PayloadReader::read(&tiny).unwrap().is_none());
}

#[test]
fn test_original_size_is_the_stub_length() {
    let tmp = TempDir::new().unwrap();
    let mut payload = Payload::new(manifest()).with_files(vec![staged("bin/demo", b"x")]);
    payload.compute_content_hash();

    let exe = packed_exe(tmp.path(), &payload);
    let stub_len = b"STUB-EXECUTABLE-BYTES".len() as u64;
    assert_eq!(PayloadReader::original_size(&exe).unwrap(), Some(stub_len));

    let total = fs::metadata(&exe).unwrap().len();
    assert!(total > stub_len);
}

#[test]
fn test_magic_is_stable() {
    assert_eq!(PAYLOAD_MAGIC, b"SFPK");
}

// ============================================================================
// Content Hash Tests
// ============================================================================

#[test]
fn test_hash_ignores_staging_order() {
    let a = staged("a.txt", b"aaa");
    let b = staged("b.txt", b"bbb");
    assert_eq!(
        hash_files(&[a.clone(), b.clone()]),
        hash_files(&[b, a])
    );
}

#[test]
fn test_hash_sees_content_and_path_changes() {
    let base = hash_files(&[staged("a.txt", b"aaa")]);
    assert_eq!(base.len(), 16);
    assert!(base.chars().all(|c| c.is_ascii_hexdigit()));

    assert_ne!(base, hash_files(&[staged("a.txt", b"aab")]));
    assert_ne!(base, hash_files(&[staged("b.txt", b"aaa")]));
}

#[test]
fn test_hash_separates_path_from_content() {
    // "ab" + "c" must not collide with "a" + "bc"
    let one = hash_files(&[staged("ab", b"c")]);
    let two = hash_files(&[staged("a", b"bc")]);
    assert_ne!(one, two);
}
