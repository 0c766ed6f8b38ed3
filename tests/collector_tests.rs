//! Tests for setforge collector module

use setforge::{FileCollector, FileEntry, SetupError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn entry(source: &str, dest: &str) -> FileEntry {
    FileEntry {
        source: source.to_string(),
        dest: dest.to_string(),
        recursive: true,
        overwrite: true,
        exclude: Vec::new(),
    }
}

fn write(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

// ============================================================================
// Glob Staging Tests
// ============================================================================

#[test]
fn test_collect_glob_matches() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", b"aaa");
    write(tmp.path(), "b.txt", b"bb");
    write(tmp.path(), "c.log", b"c");

    let tree = FileCollector::new(tmp.path())
        .collect(&[entry("*.txt", "")])
        .unwrap();

    assert_eq!(tree.len(), 2);
    assert!(tree.contains("a.txt"));
    assert!(tree.contains("b.txt"));
    assert!(!tree.contains("c.log"));
    assert_eq!(tree.total_size(), 5);
    assert_eq!(tree.find("a.txt").unwrap().contents, b"aaa");
}

#[test]
fn test_collect_into_subdirectory() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "readme.md", b"docs");

    let tree = FileCollector::new(tmp.path())
        .collect(&[entry("*.md", "share/doc")])
        .unwrap();

    assert_eq!(tree.files()[0].dest, "share/doc/readme.md");
}

#[test]
fn test_collect_directory_preserves_name() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "assets/logo.png", b"png");
    write(tmp.path(), "assets/img/icon.png", b"ico");

    let tree = FileCollector::new(tmp.path())
        .collect(&[entry("assets", "")])
        .unwrap();

    assert_eq!(tree.len(), 2);
    assert!(tree.contains("assets/logo.png"));
    assert!(tree.contains("assets/img/icon.png"));
}

#[test]
fn test_collect_directory_under_dest() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "assets/logo.png", b"png");

    let tree = FileCollector::new(tmp.path())
        .collect(&[entry("assets", "share")])
        .unwrap();

    assert!(tree.contains("share/assets/logo.png"));
}

#[test]
fn test_non_recursive_skips_directories() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "assets/logo.png", b"png");

    let mut rule = entry("assets", "");
    rule.recursive = false;

    // The glob matched something, so there is no NoFilesMatched; the
    // skipped directory just leaves nothing staged.
    let err = FileCollector::new(tmp.path())
        .collect(&[rule])
        .unwrap_err();
    assert!(err.to_string().contains("No files staged"), "{}", err);
}

// ============================================================================
// Exclusion Tests
// ============================================================================

#[test]
fn test_default_exclusions_apply_in_walks() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "app/main.bin", b"bin");
    write(tmp.path(), "app/.DS_Store", b"junk");
    write(tmp.path(), "app/Thumbs.db", b"junk");

    let tree = FileCollector::new(tmp.path())
        .collect(&[entry("app", "")])
        .unwrap();

    assert_eq!(tree.len(), 1);
    assert!(tree.contains("app/main.bin"));
}

#[test]
fn test_collector_level_exclusions() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "app/main.bin", b"bin");
    write(tmp.path(), "app/debug.log", b"log");

    let tree = FileCollector::new(tmp.path())
        .exclude(&["*.log"])
        .collect(&[entry("app", "")])
        .unwrap();

    assert_eq!(tree.len(), 1);
    assert!(!tree.contains("app/debug.log"));
}

#[test]
fn test_entry_level_exclusions() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "app/main.bin", b"bin");
    write(tmp.path(), "app/scratch.tmp", b"tmp");
    write(tmp.path(), "app/cache/blob", b"blob");

    let mut rule = entry("app", "");
    rule.exclude = vec!["*.tmp".to_string(), "cache".to_string()];

    let tree = FileCollector::new(tmp.path()).collect(&[rule]).unwrap();

    assert_eq!(tree.len(), 1);
    assert!(tree.contains("app/main.bin"));
}

// ============================================================================
// Duplicate and Error Handling Tests
// ============================================================================

#[test]
fn test_later_entry_wins_on_duplicate_dest() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a/config.toml", b"from a");
    write(tmp.path(), "b/config.toml", b"from b");

    let tree = FileCollector::new(tmp.path())
        .collect(&[entry("a/config.toml", ""), entry("b/config.toml", "")])
        .unwrap();

    assert_eq!(tree.len(), 1);
    assert_eq!(tree.find("config.toml").unwrap().contents, b"from b");
    assert_eq!(tree.total_size(), 6);
}

#[test]
fn test_missing_source_root() {
    let err = FileCollector::new("/nonexistent/source/root")
        .collect(&[entry("*", "")])
        .unwrap_err();
    assert!(matches!(err, SetupError::SourceNotFound(_)));
}

#[test]
fn test_unmatched_pattern_is_an_error() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "present.txt", b"x");

    let err = FileCollector::new(tmp.path())
        .collect(&[entry("absent-*.txt", "")])
        .unwrap_err();
    assert!(matches!(err, SetupError::NoFilesMatched(_)));
}

#[test]
fn test_escaping_dest_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", b"x");

    let err = FileCollector::new(tmp.path())
        .collect(&[entry("*.txt", "../outside")])
        .unwrap_err();
    assert!(err.to_string().contains("escapes"), "{}", err);
}

// ============================================================================
// Metadata Tests
// ============================================================================

#[test]
fn test_keep_existing_follows_overwrite() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "settings.toml", b"x = 1");

    let mut rule = entry("settings.toml", "etc");
    rule.overwrite = false;

    let tree = FileCollector::new(tmp.path()).collect(&[rule]).unwrap();
    assert!(tree.find("etc/settings.toml").unwrap().keep_existing);

    let tree = FileCollector::new(tmp.path())
        .collect(&[entry("settings.toml", "etc")])
        .unwrap();
    assert!(!tree.find("etc/settings.toml").unwrap().keep_existing);
}

#[cfg(unix)]
#[test]
fn test_unix_mode_is_captured() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "tool", b"#!/bin/sh\n");
    fs::set_permissions(tmp.path().join("tool"), fs::Permissions::from_mode(0o755)).unwrap();

    let tree = FileCollector::new(tmp.path())
        .collect(&[entry("tool", "bin")])
        .unwrap();

    assert_eq!(tree.find("bin/tool").unwrap().mode, 0o755);
}
